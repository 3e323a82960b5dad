use image::{DynamicImage, ImageFormat};
use ocr_review_cli::Review;
use pdf_engine::{ClipRect, PdfEngineError, RenderRequest};
use review_model::{BoundingBox, Move, Navigator, Position, QuestionFields, Record, RecordKey};
use review_storage::{InvalidRecords, NotFound, RecordStore, WriteError};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Captured question images live here, relative to the output file.
pub const IMAGE_DIR: &str = "images";

/// A failed reviewer action, shown in the error dialog.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("fix these questions before saving:\n{0}")]
    Invalid(#[from] InvalidRecords),
    #[error("no question is selected")]
    NoQuestion,
    #[error("cannot render the selection: {0}")]
    Render(#[from] PdfEngineError),
    #[error("cannot write image {}: {source}", path.display())]
    Capture {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    NextPage,
    PreviousPage,
    NextQuestion,
    PreviousQuestion,
}

impl Step {
    pub fn boundary_notice(self) -> &'static str {
        match self {
            Step::NextPage => "Already on the last page",
            Step::PreviousPage => "Already on the first page",
            Step::NextQuestion => "No more questions after this one",
            Step::PreviousQuestion => "No questions before this one",
        }
    }
}

/// Review state behind the window: the loaded records, the cursor, and the
/// draft text and fields of the record on screen.
///
/// The draft is folded into the store whenever the cursor moves or the
/// reviewer saves, so edits survive navigation without touching disk.
pub struct ReviewSession {
    review: Review,
    navigator: Navigator,
    draft: String,
    fields: QuestionFields,
    draft_key: Option<RecordKey>,
}

impl ReviewSession {
    /// Opens at `start`, or at the first question when nothing sits there.
    pub fn new(review: Review, start: Position) -> Self {
        let mut navigator = Navigator::new(review.store.question_counts());
        if navigator.jump(start.page_index, start.question_index).is_boundary() {
            tracing::info!(?start, "saved position no longer fits, clamped");
        }
        if review.store.record_at(navigator.position()).is_none() {
            navigator.jump(0, 0);
            if review.store.record_at(navigator.position()).is_none() {
                navigator.next_question();
            }
        }

        let mut session = Self {
            review,
            navigator,
            draft: String::new(),
            fields: QuestionFields::default(),
            draft_key: None,
        };
        session.load_draft();
        session
    }

    pub fn review(&self) -> &Review {
        &self.review
    }

    pub fn store(&self) -> &RecordStore {
        &self.review.store
    }

    pub fn output(&self) -> &Path {
        &self.review.output
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn position(&self) -> Position {
        self.navigator.position()
    }

    /// 1-based page on screen.
    pub fn page(&self) -> u32 {
        self.position().page_index as u32 + 1
    }

    pub fn current(&self) -> Option<&Record> {
        self.review.store.record_at(self.position())
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut String {
        &mut self.draft
    }

    pub fn fields(&self) -> &QuestionFields {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut QuestionFields {
        &mut self.fields
    }

    /// Whether the draft differs from what the store holds for its record.
    pub fn draft_is_pending(&self) -> bool {
        self.current().is_some_and(|record| {
            record.corrected_text() != self.draft
                || record.fields().normalized() != self.fields.clone().normalized()
        })
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.review.store.is_dirty() || self.draft_is_pending()
    }

    /// Moves the draft into the store. Returns whether the record changed.
    pub fn commit_draft(&mut self) -> Result<bool, NotFound> {
        let Some(key) = self.draft_key else {
            return Ok(false);
        };

        let text_changed = self.review.store.update(key.page, key.question, &self.draft)?;
        let fields_changed = self.review.store.update_fields(key.page, key.question, self.fields.clone())?;
        Ok(text_changed || fields_changed)
    }

    pub fn go(&mut self, step: Step) -> Result<Move, NotFound> {
        self.commit_draft()?;

        let moved = match step {
            Step::NextPage => self.navigator.next(),
            Step::PreviousPage => self.navigator.previous(),
            Step::NextQuestion => self.navigator.next_question(),
            Step::PreviousQuestion => self.navigator.previous_question(),
        };

        self.load_draft();
        Ok(moved)
    }

    /// Moves to the given record, e.g. after a click on its box.
    pub fn select(&mut self, key: RecordKey) -> Result<Move, NotFound> {
        let position = self.review.store.position_of(key).ok_or(NotFound { key })?;
        self.commit_draft()?;

        let moved = self.navigator.jump(position.page_index, position.question_index);
        self.load_draft();
        Ok(moved)
    }

    /// Drops the correction of the record on screen, draft included.
    pub fn revert_current(&mut self) -> Result<bool, NotFound> {
        let Some(key) = self.draft_key else {
            return Ok(false);
        };

        let changed = self.review.store.revert(key.page, key.question)?;
        self.load_draft();
        Ok(changed)
    }

    pub fn save(&mut self) -> Result<PathBuf, ActionError> {
        let output = self.review.output.clone();
        self.save_to(&output)?;
        Ok(output)
    }

    /// Saves to `path`, which becomes the target of later saves.
    pub fn save_as(&mut self, path: PathBuf) -> Result<(), ActionError> {
        self.save_to(&path)?;
        self.review.output = path;
        Ok(())
    }

    /// Renders `region` (page points) of the current question's page at
    /// `scale` pixels per point, writes it as a JPEG under [`IMAGE_DIR`] next
    /// to the output file, and points the question's image path at it.
    pub fn capture_region(&mut self, region: BoundingBox, scale: f32) -> Result<PathBuf, ActionError> {
        let key = self.draft_key.ok_or(ActionError::NoQuestion)?;
        let clip = ClipRect {
            x: region.x as f32,
            y: region.y as f32,
            width: region.width as f32,
            height: region.height as f32,
        };
        let image = self
            .review
            .engine
            .render_page(self.review.handle, RenderRequest::clipped(key.page - 1, scale, clip))?;

        let relative = format!("{IMAGE_DIR}/{}", self.image_file_name(key));
        let path = self.output_dir().join(&relative);
        write_jpeg(DynamicImage::ImageRgba8(image), &path)?;
        tracing::info!(%key, path = %path.display(), "captured question image");

        self.fields.image_path = Some(relative);
        self.commit_draft()?;
        Ok(path)
    }

    /// `<year>_qn_<question>.jpg`, with the year taken from the exam details.
    pub fn image_file_name(&self, key: RecordKey) -> String {
        let year = match self.review.store.exam_details().and_then(|details| details.get("year")) {
            Some(Value::String(year)) if !year.trim().is_empty() => year.trim().to_owned(),
            Some(Value::Number(year)) => year.to_string(),
            _ => "unknown_year".to_owned(),
        };
        format!("{year}_qn_{}.jpg", key.question)
    }

    fn output_dir(&self) -> &Path {
        self.review.output.parent().filter(|parent| !parent.as_os_str().is_empty()).unwrap_or(Path::new("."))
    }

    fn save_to(&mut self, path: &Path) -> Result<(), ActionError> {
        self.commit_draft()?;
        self.review.store.validate_dirty()?;
        let dirty = self.review.store.dirty_keys().count();
        self.review.store.save(path)?;

        tracing::info!(path = %path.display(), dirty, "saved corrections");
        Ok(())
    }

    fn load_draft(&mut self) {
        match self.current() {
            Some(record) => {
                let (key, draft, fields) = (record.key(), record.corrected_text().to_owned(), record.fields());
                self.draft_key = Some(key);
                self.draft = draft;
                self.fields = fields;
            }
            None => {
                self.draft_key = None;
                self.draft.clear();
                self.fields = QuestionFields::default();
            }
        }
    }
}

fn write_jpeg(image: DynamicImage, path: &Path) -> Result<(), ActionError> {
    let capture_error = |source| ActionError::Capture { path: path.to_path_buf(), source };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| capture_error(image::ImageError::IoError(err)))?;
    }
    DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(path, ImageFormat::Jpeg).map_err(capture_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocr_review_cli::{open_review, InputArgs};
    use pretty_assertions::assert_eq;
    use review_model::{FieldError, MatchColumns};
    use serde_json::json;
    use std::fs;

    struct Fixture {
        _temp: tempfile::TempDir,
        inputs: InputArgs,
    }

    /// Three pages: two questions on page 1, none on page 2, one on page 3.
    fn fixture() -> Fixture {
        fixture_on_pages([1, 1, 3])
    }

    /// Three pages holding questions 1 to 3 on the given pages.
    fn fixture_on_pages([first, second, third]: [u32; 3]) -> Fixture {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let pdf = temp.path().join("paper.pdf");
        let bbox_json = temp.path().join("paper_bbox.json");
        let ocr_json = temp.path().join("paper.json");

        fs::write(&pdf, pdf_engine::fixtures::blank_pdf(3).expect("fixture pdf")).expect("write pdf");
        fs::write(
            &bbox_json,
            json!({
                "1": { "page": first, "bbox": [40.0, 60.0, 500.0, 160.0] },
                "2": { "page": second, "bbox": [40.0, 200.0, 500.0, 320.0] },
                "3": { "page": third, "bbox": [40.0, 360.0, 500.0, 480.0] },
            })
            .to_string(),
        )
        .expect("write bbox");
        fs::write(
            &ocr_json,
            json!({
                "examDetails": { "year": 2023 },
                "questions": {
                    "qn_1": { "questionText": "Wh1ch cell", "options": ["Neuron", "Nephron"], "correctOption": 1 },
                    "qn_2": { "questionText": "Name the b0ne" },
                    "qn_3": { "questionText": "Def1ne osmosis" },
                }
            })
            .to_string(),
        )
        .expect("write ocr");

        let inputs = InputArgs { pdf, bbox_json, ocr_json, output: None, resume: false };
        Fixture { _temp: temp, inputs }
    }

    fn session(fixture: &Fixture) -> ReviewSession {
        let review = open_review(&fixture.inputs).expect("review should open");
        ReviewSession::new(review, Position::default())
    }

    #[test]
    fn draft_starts_from_current_record() {
        let fixture = fixture();
        let session = session(&fixture);

        assert_eq!(session.page(), 1);
        assert_eq!(session.draft(), "Wh1ch cell");
        assert!(!session.has_unsaved_changes());
    }

    #[test]
    fn navigation_commits_draft_without_saving() {
        let fixture = fixture();
        let mut session = session(&fixture);

        *session.draft_mut() = "Which cell".to_owned();
        assert!(session.has_unsaved_changes());

        let moved = session.go(Step::NextQuestion).expect("record exists");
        assert_eq!(moved, Move::Moved(Position::new(0, 1)));
        assert_eq!(session.draft(), "Name the b0ne");
        assert_eq!(session.store().get(1, 1).expect("record").corrected_text(), "Which cell");
        assert!(session.store().is_dirty());
        assert!(!session.output().exists());
    }

    #[test]
    fn page_steps_stop_at_edges() {
        let fixture = fixture();
        let mut session = session(&fixture);

        assert!(session.go(Step::PreviousPage).expect("step").is_boundary());

        assert_eq!(session.go(Step::NextPage).expect("step"), Move::Moved(Position::new(1, 0)));
        assert!(session.current().is_none());
        assert_eq!(session.draft(), "");

        assert_eq!(session.go(Step::NextPage).expect("step"), Move::Moved(Position::new(2, 0)));
        assert!(session.go(Step::NextPage).expect("step").is_boundary());
        assert_eq!(session.draft(), "Def1ne osmosis");
    }

    #[test]
    fn question_steps_skip_empty_pages() {
        let fixture = fixture();
        let mut session = session(&fixture);

        session.go(Step::NextQuestion).expect("step");
        let moved = session.go(Step::NextQuestion).expect("step");

        assert_eq!(moved, Move::Moved(Position::new(2, 0)));
        assert_eq!(session.page(), 3);
    }

    #[test]
    fn select_jumps_to_record() {
        let fixture = fixture();
        let mut session = session(&fixture);

        let moved = session.select(RecordKey::new(3, 3)).expect("record exists");
        assert_eq!(moved.position(), Position::new(2, 0));

        let err = session.select(RecordKey::new(2, 9)).expect_err("no such record");
        assert_eq!(err, NotFound { key: RecordKey::new(2, 9) });
    }

    #[test]
    fn revert_restores_extracted_text() {
        let fixture = fixture();
        let mut session = session(&fixture);

        *session.draft_mut() = "Which cell".to_owned();
        session.commit_draft().expect("record exists");

        assert!(session.revert_current().expect("record exists"));
        assert_eq!(session.draft(), "Wh1ch cell");
        assert!(!session.store().get(1, 1).expect("record").is_corrected());
    }

    #[test]
    fn save_writes_pending_draft_and_clears_dirty_state() {
        let fixture = fixture();
        let mut session = session(&fixture);

        *session.draft_mut() = "Which cell?".to_owned();
        let output = session.save().expect("save should succeed");

        assert!(!session.has_unsaved_changes());
        let saved: serde_json::Value =
            serde_json::from_slice(&fs::read(&output).expect("read output")).expect("json");
        assert_eq!(saved[0]["corrected_text"], json!("Which cell?"));
        assert_eq!(saved[1]["corrected_text"], json!("Name the b0ne"));
    }

    #[test]
    fn save_as_retargets_later_saves() {
        let fixture = fixture();
        let mut session = session(&fixture);
        let target = fixture.inputs.pdf.with_file_name("elsewhere.json");

        session.save_as(target.clone()).expect("save should succeed");

        assert_eq!(session.output(), target.as_path());
        assert!(target.exists());
    }

    #[test]
    fn failed_save_keeps_changes_unsaved() {
        let fixture = fixture();
        let mut session = session(&fixture);
        let missing_dir = fixture.inputs.pdf.with_file_name("missing").join("out.json");

        *session.draft_mut() = "Which cell".to_owned();
        let err = session.save_as(missing_dir).expect_err("directory does not exist");

        assert!(matches!(err, ActionError::Write(_)));
        assert!(session.has_unsaved_changes());
    }

    #[test]
    fn opens_on_first_question_when_first_page_is_empty() {
        let fixture = fixture_on_pages([2, 2, 3]);
        let review = open_review(&fixture.inputs).expect("review should open");
        let session = ReviewSession::new(review, Position::default());

        assert_eq!(session.position(), Position::new(1, 0));
        assert_eq!(session.draft(), "Wh1ch cell");
    }

    #[test]
    fn saved_position_on_empty_page_falls_back_to_first_question() {
        let fixture = fixture();
        let review = open_review(&fixture.inputs).expect("review should open");
        let session = ReviewSession::new(review, Position::new(1, 0));

        assert_eq!(session.position(), Position::new(0, 0));
        assert_eq!(session.current().map(Record::key), Some(RecordKey::new(1, 1)));
    }

    #[test]
    fn field_edits_travel_with_navigation_and_save() {
        let fixture = fixture();
        let mut session = session(&fixture);
        assert_eq!(session.fields().options, vec!["Neuron", "Nephron"]);

        let fields = session.fields_mut();
        fields.options.push("Neutrophil".to_owned());
        fields.correct_option = Some(3);
        fields.match_columns = Some(MatchColumns { column_a: vec!["axon".into()], column_b: vec!["signal".into()] });
        assert!(session.draft_is_pending());

        session.go(Step::NextQuestion).expect("record exists");
        session.go(Step::PreviousQuestion).expect("record exists");
        assert_eq!(session.fields().correct_option, Some(3));

        let output = session.save().expect("save should succeed");
        let saved: serde_json::Value =
            serde_json::from_slice(&fs::read(&output).expect("read output")).expect("json");
        assert_eq!(saved[0]["extra"]["options"], json!(["Neuron", "Nephron", "Neutrophil"]));
        assert_eq!(saved[0]["extra"]["correctOption"], json!(3));
        assert_eq!(saved[0]["extra"]["matchColumns"], json!({ "columnA": ["axon"], "columnB": ["signal"] }));
    }

    #[test]
    fn invalid_fields_block_the_save() {
        let fixture = fixture();
        let mut session = session(&fixture);

        session.fields_mut().correct_option = Some(5);
        let err = session.save().expect_err("correct option is out of range");

        match err {
            ActionError::Invalid(invalid) => assert_eq!(
                invalid.records,
                vec![(RecordKey::new(1, 1), vec![FieldError::CorrectOptionOutOfRange { value: 5, options: 2 }])]
            ),
            other => panic!("expected a validation error, got {other}"),
        }
        assert!(!session.output().exists());
        assert!(session.has_unsaved_changes());

        session.fields_mut().correct_option = Some(2);
        session.save().expect("save should succeed");
    }

    #[test]
    fn revert_drops_field_edits() {
        let fixture = fixture();
        let mut session = session(&fixture);

        session.fields_mut().options.clear();
        session.commit_draft().expect("record exists");
        assert!(session.revert_current().expect("record exists"));

        assert_eq!(session.fields().options, vec!["Neuron", "Nephron"]);
        assert!(!session.draft_is_pending());
    }

    #[test]
    fn captured_region_is_saved_as_jpeg_and_recorded() {
        let fixture = fixture();
        let mut session = session(&fixture);
        let region = BoundingBox::from_corners(40.0, 60.0, 140.0, 110.0).expect("valid box");

        let path = session.capture_region(region, 2.0).expect("capture should succeed");

        assert_eq!(path, fixture.inputs.pdf.with_file_name("images").join("2023_qn_1.jpg"));
        assert_eq!(image::ImageFormat::from_path(&path).expect("known extension"), image::ImageFormat::Jpeg);
        let captured = image::open(&path).expect("captured image should be readable");
        assert!(captured.width() > 0 && captured.height() > 0);
        assert_eq!(session.fields().image_path.as_deref(), Some("images/2023_qn_1.jpg"));
        assert_eq!(
            session.store().get(1, 1).expect("record").extra.get("imagePath"),
            Some(&json!("images/2023_qn_1.jpg"))
        );
        assert!(session.store().is_dirty());
    }

    #[test]
    fn capture_without_a_question_is_refused() {
        let fixture = fixture_on_pages([3, 3, 3]);
        let review = open_review(&fixture.inputs).expect("review should open");
        let mut session = ReviewSession::new(review, Position::default());
        session.go(Step::PreviousPage).expect("step");

        let region = BoundingBox::from_corners(0.0, 0.0, 10.0, 10.0).expect("valid box");
        let err = session.capture_region(region, 1.0).expect_err("empty page");
        assert!(matches!(err, ActionError::NoQuestion));
    }
}
