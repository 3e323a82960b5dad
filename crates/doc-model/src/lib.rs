use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

mod fields;
mod navigator;

pub use fields::{
    FieldError, MatchColumns, QuestionFields, CORRECT_OPTION_KEY, IMAGE_PATH_KEY, MATCH_COLUMNS_KEY, MAX_OPTIONS,
    OPTIONS_KEY,
};
pub use navigator::{Move, Navigator, Position};

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("degenerate bounding box [{x0}, {y0}, {x1}, {y1}]")]
pub struct InvalidBoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

/// Rectangle in PDF points, origin at the top-left of the page.
///
/// Serialized as `[x, y, width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Builds a box from two corners, rejecting empty or inverted rectangles.
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Result<Self, InvalidBoundingBox> {
        let finite = [x0, y0, x1, y1].iter().all(|value| value.is_finite());
        if !finite || x0 >= x1 || y0 >= y1 {
            return Err(InvalidBoundingBox { x0, y0, x1, y1 });
        }

        Ok(Self { x: x0, y: y0, width: x1 - x0, height: y1 - y0 })
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Grows the box by `padding` on every side. The origin never goes negative.
    pub fn padded(&self, padding: f64) -> Self {
        let x = (self.x - padding).max(0.0);
        let y = (self.y - padding).max(0.0);
        Self { x, y, width: self.right() + padding - x, height: self.bottom() + padding - y }
    }

    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.right() && py >= self.y && py <= self.bottom()
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([x, y, width, height]: [f64; 4]) -> Self {
        Self { x, y, width, height }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.x, bbox.y, bbox.width, bbox.height]
    }
}

/// Composite record id. Orders by page, then question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub page: u32,
    pub question: u32,
}

impl RecordKey {
    pub fn new(page: u32, question: u32) -> Self {
        Self { page, question }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} question {}", self.page, self.question)
    }
}

/// One reviewable question on a page.
///
/// `page` is 1-based, matching the numbering used by the bbox files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecordEntry", into = "RecordEntry")]
pub struct Record {
    pub page: u32,
    pub question_id: u32,
    pub bbox: BoundingBox,
    pub text: String,
    corrected_text: Option<String>,
    pub extra: Map<String, Value>,
}

impl Record {
    pub fn new(page: u32, question_id: u32, bbox: BoundingBox, text: impl Into<String>) -> Self {
        Self {
            page,
            question_id,
            bbox,
            text: text.into(),
            corrected_text: None,
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra = extra;
        self
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.page, self.question_id)
    }

    /// The corrected text when one exists, otherwise the extracted text.
    pub fn corrected_text(&self) -> &str {
        self.corrected_text.as_deref().unwrap_or(&self.text)
    }

    pub fn is_corrected(&self) -> bool {
        self.corrected_text.is_some()
    }

    /// Stores `new_text` as the correction. Returns whether the visible text changed.
    ///
    /// Setting the extracted text back clears the correction.
    pub fn set_correction(&mut self, new_text: impl Into<String>) -> bool {
        let new_text = new_text.into();
        if new_text == self.corrected_text() {
            return false;
        }

        self.corrected_text = if new_text == self.text { None } else { Some(new_text) };
        true
    }

    pub fn clear_correction(&mut self) -> bool {
        self.corrected_text.take().is_some()
    }
}

/// On-disk shape of a [`Record`]; `corrected_text` is always written out.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordEntry {
    page: u32,
    question_id: u32,
    bbox: BoundingBox,
    text: String,
    #[serde(default)]
    corrected_text: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    extra: Map<String, Value>,
}

impl From<RecordEntry> for Record {
    fn from(entry: RecordEntry) -> Self {
        let corrected_text = entry.corrected_text.filter(|corrected| *corrected != entry.text);
        Self {
            page: entry.page,
            question_id: entry.question_id,
            bbox: entry.bbox,
            text: entry.text,
            corrected_text,
            extra: entry.extra,
        }
    }
}

impl From<Record> for RecordEntry {
    fn from(record: Record) -> Self {
        let corrected_text = Some(record.corrected_text().to_owned());
        Self {
            page: record.page,
            question_id: record.question_id,
            bbox: record.bbox,
            text: record.text,
            corrected_text,
            extra: record.extra,
        }
    }
}

/// The PDF being reviewed. Read-only after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub page_count: u32,
}

impl DocumentInfo {
    pub fn contains_page(&self, page: u32) -> bool {
        page >= 1 && page <= self.page_count
    }
}

/// Reviewer preferences persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Points added around a question when showing its crop.
    pub crop_padding: f64,
    /// Pixels per point for the question crop.
    pub crop_zoom: f32,
    pub show_overlays: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self { crop_padding: 10.0, crop_zoom: 2.0, show_overlays: true }
    }
}

impl Preferences {
    pub const CROP_PADDING_RANGE: RangeInclusive<f64> = 0.0..=50.0;
    pub const CROP_ZOOM_RANGE: RangeInclusive<f32> = 1.0..=4.0;

    /// Pulls hand-edited or stale values back into the ranges the UI offers.
    pub fn clamped(self) -> Self {
        let padding = &Self::CROP_PADDING_RANGE;
        let zoom = &Self::CROP_ZOOM_RANGE;
        let defaults = Self::default();
        Self {
            crop_padding: if self.crop_padding.is_finite() {
                self.crop_padding.clamp(*padding.start(), *padding.end())
            } else {
                defaults.crop_padding
            },
            crop_zoom: if self.crop_zoom.is_finite() {
                self.crop_zoom.clamp(*zoom.start(), *zoom.end())
            } else {
                defaults.crop_zoom
            },
            ..self
        }
    }
}

/// What to reopen on the next launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSession {
    pub pdf: PathBuf,
    pub bbox_json: PathBuf,
    pub ocr_json: PathBuf,
    pub output: PathBuf,
    pub position: Position,
}

impl LastSession {
    /// Whether this session was recorded for the same set of inputs.
    pub fn matches(&self, pdf: &Path, bbox_json: &Path, ocr_json: &Path) -> bool {
        self.pdf == pdf && self.bbox_json == bbox_json && self.ocr_json == ocr_json
    }
}
