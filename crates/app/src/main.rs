//! OCR Review - egui desktop reviewer
//!
//! Shows each question's box on the scanned page next to its OCR text and
//! writes the reviewer's corrections back to JSON.

mod app;
mod render_cache;
mod session;

use anyhow::Result;
use app::ReviewApp;
use clap::Parser;
use eframe::egui;
use ocr_review_cli::{init_tracing, open_review, InputArgs};
use review_storage::Storage;
use session::ReviewSession;

#[derive(Debug, Parser)]
#[command(name = "ocr-review", version)]
#[command(about = "Review and correct OCR text against the scanned exam paper")]
struct Args {
    #[command(flatten)]
    inputs: InputArgs,
}

fn main() {
    init_tracing("ocr_review=info,review_storage=info");

    if let Err(error) = run(Args::parse()) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let review = open_review(&args.inputs)?;
    tracing::info!(
        pdf = %args.inputs.pdf.display(),
        pages = review.document.page_count,
        records = review.store.len(),
        "review loaded"
    );

    let storage = match Storage::from_default_project() {
        Ok(storage) => Some(storage),
        Err(err) => {
            tracing::warn!("session and preferences will not be kept: {err}");
            None
        }
    };

    let preferences = storage
        .as_ref()
        .map(|storage| {
            storage.load_preferences().unwrap_or_else(|err| {
                tracing::warn!("using default preferences: {err}");
                Default::default()
            })
        })
        .unwrap_or_default()
        .clamped();

    let start = storage
        .as_ref()
        .and_then(Storage::load_session)
        .filter(|last| last.matches(&args.inputs.pdf, &args.inputs.bbox_json, &args.inputs.ocr_json))
        .map(|last| last.position)
        .unwrap_or_default();

    let session = ReviewSession::new(review, start);
    let app = ReviewApp::new(session, args.inputs, storage, preferences);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 860.0])
            .with_min_inner_size([800.0, 600.0])
            .with_title("OCR Review"),
        ..Default::default()
    };

    eframe::run_native("OCR Review", options, Box::new(move |_cc| Ok(Box::new(app))))
        .map_err(|error| anyhow::anyhow!("failed to start the review window: {error}"))
}
