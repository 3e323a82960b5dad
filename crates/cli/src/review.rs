use anyhow::{Context, Result};
use clap::Args;
use pdf_engine::{default_engine, DocumentHandle, OpenSource, PdfEngine};
use review_model::DocumentInfo;
use review_storage::RecordStore;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// The three inputs of a review plus where corrections go.
#[derive(Debug, Clone, Args)]
pub struct InputArgs {
    /// Scanned exam paper.
    #[arg(long, value_name = "PATH")]
    pub pdf: PathBuf,
    /// Question bounding boxes, keyed by question number.
    #[arg(long = "bbox-json", value_name = "PATH")]
    pub bbox_json: PathBuf,
    /// OCR output with a `questions` object keyed `qn_<number>`.
    #[arg(long = "ocr-json", value_name = "PATH")]
    pub ocr_json: PathBuf,
    /// Corrections file [default: <ocr-json stem>.corrected.json]
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,
    /// Start from the corrections already in the output file.
    #[arg(long)]
    pub resume: bool,
}

impl InputArgs {
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| default_output(&self.ocr_json))
    }

    /// Every input must be an existing regular file.
    pub fn validate(&self) -> Result<()> {
        ensure_file_exists(&self.pdf)?;
        ensure_file_exists(&self.bbox_json)?;
        ensure_file_exists(&self.ocr_json)?;
        Ok(())
    }
}

/// A loaded review: the open PDF, its records and the save target.
pub struct Review {
    pub document: DocumentInfo,
    pub store: RecordStore,
    pub output: PathBuf,
    pub engine: Box<dyn PdfEngine>,
    pub handle: DocumentHandle,
}

/// Validates the inputs, opens the PDF and loads the records. Nothing is
/// shown to the user until this succeeds.
pub fn open_review(args: &InputArgs) -> Result<Review> {
    args.validate()?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(args.pdf.as_path())).context("failed to open PDF")?;
    let page_count = engine.page_count(handle)?;
    let document = DocumentInfo { path: args.pdf.clone(), page_count };

    let mut store = RecordStore::load(&args.bbox_json, &args.ocr_json, page_count)
        .context("failed to load review records")?;

    let output = args.output_path();
    if args.resume && output.is_file() {
        store
            .apply_saved(&output)
            .with_context(|| format!("failed to resume from {}", output.display()))?;
    }

    Ok(Review { document, store, output, engine, handle })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub page: u32,
    pub questions: usize,
}

/// Machine-readable overview printed by `check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewSummary {
    pub pdf: String,
    pub page_count: u32,
    pub record_count: usize,
    pub corrected_count: usize,
    /// False when the PDF renderer only produces blank pages.
    pub renders_content: bool,
    pub pages: Vec<PageSummary>,
}

impl ReviewSummary {
    pub fn new(review: &Review) -> Self {
        let Review { document, store, engine, .. } = review;
        let pages = store
            .page_groups()
            .into_iter()
            .map(|(page, records)| PageSummary { page, questions: records.len() })
            .collect();

        Self {
            pdf: document.path.display().to_string(),
            page_count: document.page_count,
            record_count: store.len(),
            corrected_count: store.corrected_count(),
            renders_content: engine.renders_content(),
            pages,
        }
    }
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_output(ocr_json: &Path) -> PathBuf {
    let stem = ocr_json.file_stem().and_then(|name| name.to_str()).unwrap_or("review");

    ocr_json.with_file_name(format!("{stem}.corrected.json"))
}
