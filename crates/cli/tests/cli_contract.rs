use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

struct Inputs {
    _temp: tempfile::TempDir,
    pdf: PathBuf,
    bbox: PathBuf,
    ocr: PathBuf,
}

impl Inputs {
    fn output(&self) -> PathBuf {
        self.ocr.with_file_name("exam.corrected.json")
    }
}

/// Writes a blank PDF plus one question per entry of `pages_per_question`.
fn inputs(page_count: u32, pages_per_question: &[u32]) -> Inputs {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = temp.path().join("exam.pdf");
    let bbox = temp.path().join("exam_bbox.json");
    let ocr = temp.path().join("exam.json");

    fs::write(&pdf, pdf_engine::fixtures::blank_pdf(page_count).expect("fixture pdf"))
        .expect("write pdf");

    let mut boxes = serde_json::Map::new();
    let mut questions = serde_json::Map::new();
    for (index, page) in pages_per_question.iter().enumerate() {
        let number = index + 1;
        let top = 100.0 + 150.0 * (number % 2) as f64;
        boxes.insert(number.to_string(), json!({ "page": page, "bbox": [50.0, top, 400.0, top + 100.0] }));
        questions.insert(
            format!("qn_{number}"),
            json!({ "questionText": format!("Question {number} text"), "options": ["a", "b"] }),
        );
    }

    fs::write(&bbox, serde_json::to_vec(&Value::Object(boxes)).expect("bbox json")).expect("write bbox");
    fs::write(
        &ocr,
        serde_json::to_vec(&json!({ "examDetails": { "year": 2024 }, "questions": questions }))
            .expect("ocr json"),
    )
    .expect("write ocr");

    Inputs { _temp: temp, pdf, bbox, ocr }
}

fn with_inputs<'a>(cmd: &'a mut assert_cmd::Command, inputs: &Inputs) -> &'a mut assert_cmd::Command {
    cmd.arg("--pdf").arg(&inputs.pdf).arg("--bbox-json").arg(&inputs.bbox).arg("--ocr-json").arg(&inputs.ocr)
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).expect("read json")).expect("valid json")
}

#[test]
fn check_reports_questions_grouped_by_page() {
    let inputs = inputs(3, &[1, 1, 2, 2, 3, 3]);

    let output = with_inputs(cargo_bin_cmd!("ocr-review-cli").arg("check"), &inputs)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value["page_count"], json!(3));
    assert_eq!(value["record_count"], json!(6));
    assert_eq!(value["corrected_count"], json!(0));
    assert!(value["renders_content"].is_boolean());
    assert_eq!(
        value["pages"],
        json!([
            { "page": 1, "questions": 2 },
            { "page": 2, "questions": 2 },
            { "page": 3, "questions": 2 },
        ])
    );
}

#[test]
fn check_rejects_page_beyond_document() {
    let inputs = inputs(10, &[1, 50]);

    with_inputs(cargo_bin_cmd!("ocr-review-cli").arg("check"), &inputs)
        .assert()
        .failure()
        .stderr(predicate::str::contains("references page 50"))
        .stderr(predicate::str::contains("has 10 pages"));
}

#[test]
fn missing_input_flag_is_a_usage_error() {
    let inputs = inputs(1, &[1]);

    cargo_bin_cmd!("ocr-review-cli")
        .arg("check")
        .arg("--pdf")
        .arg(&inputs.pdf)
        .arg("--ocr-json")
        .arg(&inputs.ocr)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--bbox-json"));
}

#[test]
fn missing_file_is_reported_before_loading() {
    let inputs = inputs(1, &[1]);
    fs::remove_file(&inputs.bbox).expect("remove bbox");

    with_inputs(cargo_bin_cmd!("ocr-review-cli").arg("check"), &inputs)
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn unreadable_pdf_fails_to_open() {
    let inputs = inputs(1, &[1]);
    fs::write(&inputs.pdf, b"not a pdf").expect("overwrite pdf");

    with_inputs(cargo_bin_cmd!("ocr-review-cli").arg("check"), &inputs)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn export_writes_every_record_with_effective_text() {
    let inputs = inputs(2, &[1, 2]);

    with_inputs(cargo_bin_cmd!("ocr-review-cli").arg("export"), &inputs)
        .assert()
        .success()
        .stdout(predicate::str::contains("exam.corrected.json"));

    let saved = read_json(&inputs.output());
    let records = saved.as_array().expect("array of records");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["page"], json!(1));
    assert_eq!(records[0]["question_id"], json!(1));
    assert_eq!(records[0]["text"], json!("Question 1 text"));
    assert_eq!(records[0]["corrected_text"], json!("Question 1 text"));
    assert_eq!(records[0]["bbox"], json!([50.0, 250.0, 350.0, 100.0]));
    assert_eq!(records[1]["extra"]["options"], json!(["a", "b"]));
}

#[test]
fn resume_keeps_corrections_from_previous_output() {
    let inputs = inputs(2, &[1, 2]);
    let output = inputs.output();

    with_inputs(cargo_bin_cmd!("ocr-review-cli").arg("export"), &inputs).assert().success();

    let mut saved = read_json(&output);
    saved[1]["corrected_text"] = json!("Question 2 “fixed” é");
    fs::write(&output, serde_json::to_vec_pretty(&saved).expect("json")).expect("rewrite output");

    let summary = with_inputs(cargo_bin_cmd!("ocr-review-cli").arg("check").arg("--resume"), &inputs)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: Value = serde_json::from_slice(&summary).expect("json summary");
    assert_eq!(summary["corrected_count"], json!(1));

    with_inputs(cargo_bin_cmd!("ocr-review-cli").arg("export").arg("--resume"), &inputs)
        .assert()
        .success();

    let resaved = read_json(&output);
    assert_eq!(resaved[1]["corrected_text"], json!("Question 2 “fixed” é"));
    assert_eq!(resaved[0]["corrected_text"], json!("Question 1 text"));
}

#[test]
fn render_page_writes_png_file() {
    let inputs = inputs(2, &[1, 2]);
    let image_path = inputs.pdf.with_file_name("page-2.png");

    with_inputs(cargo_bin_cmd!("ocr-review-cli").arg("render-page"), &inputs)
        .arg("--page")
        .arg("2")
        .arg("--scale")
        .arg("0.5")
        .arg("--image")
        .arg(&image_path)
        .assert()
        .success();

    let image = image::open(&image_path).expect("rendered page should be readable image");
    assert_eq!((image.width(), image.height()), (306, 396));
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("ocr-review-cli")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
