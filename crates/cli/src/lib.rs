use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::Rgba;
use pdf_engine::overlay::{stroke_rect, to_pixels};
use pdf_engine::{ClipRect, RenderRequest};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

mod logging;
mod review;

pub use logging::init_tracing;
pub use review::{open_review, InputArgs, PageSummary, Review, ReviewSummary};

const OVERLAY_COLOR: Rgba<u8> = Rgba([220, 40, 40, 255]);
const CORRECTED_OVERLAY_COLOR: Rgba<u8> = Rgba([30, 150, 60, 255]);

#[derive(Debug, Parser)]
#[command(name = "ocr-review-cli")]
#[command(about = "Headless checks and exports for OCR review inputs")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load and validate the inputs, then print a JSON summary.
    Check {
        #[command(flatten)]
        inputs: InputArgs,
    },
    /// Write the merged record set to the corrections file.
    Export {
        #[command(flatten)]
        inputs: InputArgs,
    },
    /// Render one page with its question boxes outlined.
    RenderPage {
        #[command(flatten)]
        inputs: InputArgs,
        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Pixels per PDF point.
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
        #[arg(long, value_name = "PNG")]
        image: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Check { inputs } => run_check(&inputs),
        Commands::Export { inputs } => run_export(&inputs),
        Commands::RenderPage { inputs, page, scale, image } => {
            run_render_page(&inputs, page, scale, image.as_deref())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_check(inputs: &InputArgs) -> Result<()> {
    let review = open_review(inputs)?;
    let summary = ReviewSummary::new(&review);

    let json = serde_json::to_string_pretty(&summary)?;
    println!("{json}");

    Ok(())
}

fn run_export(inputs: &InputArgs) -> Result<()> {
    let mut review = open_review(inputs)?;

    review
        .store
        .save(&review.output)
        .with_context(|| format!("failed to save {}", review.output.display()))?;

    println!("{}", review.output.display());

    Ok(())
}

fn run_render_page(inputs: &InputArgs, page: u32, scale: f32, output: Option<&Path>) -> Result<()> {
    let mut review = open_review(inputs)?;

    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }
    if !review.engine.renders_content() {
        tracing::warn!("PDF renderer unavailable, page {page} is drawn blank");
    }

    let mut image = review
        .engine
        .render_page(review.handle, RenderRequest::page(page - 1, scale))
        .with_context(|| format!("failed to render page {page}"))?;

    for record in review.store.list_for_page(page) {
        let rect = ClipRect {
            x: record.bbox.x as f32,
            y: record.bbox.y as f32,
            width: record.bbox.width as f32,
            height: record.bbox.height as f32,
        };
        let color = if record.is_corrected() { CORRECTED_OVERLAY_COLOR } else { OVERLAY_COLOR };
        if let Some(region) = to_pixels(rect, scale, (0.0, 0.0)) {
            stroke_rect(&mut image, region, color, 2);
        }
    }

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_render_output(inputs, page));

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    image
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());

    review.engine.close(review.handle)?;

    Ok(())
}

fn default_render_output(inputs: &InputArgs, page: u32) -> PathBuf {
    let stem = inputs.pdf.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    inputs.pdf.with_file_name(format!("{stem}-page-{page}-review.png"))
}
