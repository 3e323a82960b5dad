//! Input files produced by the extraction pipeline.
//!
//! The bbox file maps a question number to its page and corner coordinates:
//!
//! ```json
//! { "12": { "page": 3, "bbox": [72.0, 140.5, 300.0, 210.0] } }
//! ```
//!
//! The OCR file nests questions under `qn_<number>` keys:
//!
//! ```json
//! { "examDetails": { "year": 2024 }, "questions": { "qn_12": { "questionText": "..." } } }
//! ```

use crate::error::LoadError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const QUESTION_KEY_PREFIX: &str = "qn_";

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BboxEntry {
    /// 1-based.
    pub page: u32,
    /// `[x0, y0, x1, y1]`.
    pub bbox: [f64; 4],
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OcrQuestion {
    #[serde(rename = "questionText", default)]
    pub question_text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrFile {
    #[serde(rename = "examDetails", default)]
    exam_details: Option<Value>,
    #[serde(default)]
    questions: BTreeMap<String, OcrQuestion>,
}

#[derive(Debug, Clone)]
pub(crate) struct OcrDocument {
    pub exam_details: Option<Value>,
    pub questions: BTreeMap<u32, OcrQuestion>,
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let bytes =
        fs::read(path).map_err(|source| LoadError::Read { path: path.to_path_buf(), source })?;
    serde_json::from_slice(&bytes)
        .map_err(|source| LoadError::Malformed { path: path.to_path_buf(), source })
}

/// Reads the bbox file, keyed by question number. Keys that are not
/// integers are skipped.
pub(crate) fn read_bboxes(path: &Path) -> Result<BTreeMap<u32, BboxEntry>, LoadError> {
    let raw: BTreeMap<String, BboxEntry> = read_json(path)?;

    let mut entries = BTreeMap::new();
    for (key, entry) in raw {
        match key.trim().parse::<u32>() {
            Ok(question) => {
                entries.insert(question, entry);
            }
            Err(_) => tracing::warn!(path = %path.display(), key = %key, "skipping non-numeric bbox key"),
        }
    }

    Ok(entries)
}

pub(crate) fn read_ocr(path: &Path) -> Result<OcrDocument, LoadError> {
    let raw: OcrFile = read_json(path)?;

    let mut questions = BTreeMap::new();
    for (key, question) in raw.questions {
        match parse_question_key(&key) {
            Some(number) => {
                questions.insert(number, question);
            }
            None => tracing::warn!(path = %path.display(), key = %key, "skipping invalid question key"),
        }
    }

    if questions.is_empty() {
        return Err(LoadError::NoQuestions { path: path.to_path_buf() });
    }

    Ok(OcrDocument { exam_details: raw.exam_details, questions })
}

/// `qn_12` -> `12`.
pub(crate) fn parse_question_key(key: &str) -> Option<u32> {
    key.strip_prefix(QUESTION_KEY_PREFIX)?.parse().ok()
}
