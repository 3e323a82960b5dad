use image::{ImageBuffer, Rgba};
use lopdf::{Dictionary, Document, ObjectId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod overlay;
#[cfg(feature = "pdfium")]
pub mod pdfium_backend;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// US Letter, used when a page carries no readable MediaBox.
const FALLBACK_PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

/// How far up the page tree to look for an inherited MediaBox.
const MAX_PAGE_TREE_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

/// Region of a page in points, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    /// Pixels per point.
    pub scale: f32,
    pub clip: Option<ClipRect>,
}

impl RenderRequest {
    pub fn page(page_index: u32, scale: f32) -> Self {
        Self { page_index, scale, clip: None }
    }

    pub fn clipped(page_index: u32, scale: f32, clip: ClipRect) -> Self {
        Self { page_index, scale, clip: Some(clip) }
    }

    fn effective_scale(&self) -> f32 {
        if self.scale.is_finite() && self.scale > 0.0 {
            self.scale
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("clip region lies outside page {page}")]
    EmptyClip { page: u32 },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    NoPages,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Read-only access to a PDF: page geometry plus rasterization.
///
/// Page indices are zero-based.
pub trait PdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(&self, handle: DocumentHandle, page_index: u32)
        -> Result<PageSize, PdfEngineError>;
    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;

    /// Whether `render_page` produces the page's real content rather than a
    /// blank sheet of the right size.
    fn renders_content(&self) -> bool {
        true
    }
}

/// Pixel rectangle covered by a render request, derived from its clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Resolves `request` against `page` into the full-page pixel size and the
/// region to keep. The clip is intersected with the page bounds.
pub fn render_geometry(
    page: PageSize,
    request: &RenderRequest,
) -> Result<((u32, u32), PixelRegion), PdfEngineError> {
    let scale = request.effective_scale();
    let full_width = (page.width_pt * scale).round().max(1.0) as u32;
    let full_height = (page.height_pt * scale).round().max(1.0) as u32;

    let Some(clip) = request.clip else {
        let region = PixelRegion { x: 0, y: 0, width: full_width, height: full_height };
        return Ok(((full_width, full_height), region));
    };

    let x0 = (clip.x * scale).round().clamp(0.0, full_width as f32) as u32;
    let y0 = (clip.y * scale).round().clamp(0.0, full_height as f32) as u32;
    let x1 = ((clip.x + clip.width) * scale).round().clamp(0.0, full_width as f32) as u32;
    let y1 = ((clip.y + clip.height) * scale).round().clamp(0.0, full_height as f32) as u32;

    if x1 <= x0 || y1 <= y0 {
        return Err(PdfEngineError::EmptyClip { page: request.page_index });
    }

    let region = PixelRegion { x: x0, y: y0, width: x1 - x0, height: y1 - y0 };
    Ok(((full_width, full_height), region))
}

pub(crate) fn read_source(source: OpenSource) -> Result<Vec<u8>, PdfEngineError> {
    let bytes = match source {
        OpenSource::Path(path) => fs::read(path)?,
        OpenSource::Bytes(bytes) => bytes,
    };

    if bytes.windows(b"/Encrypt".len()).any(|window| window == b"/Encrypt") {
        return Err(PdfEngineError::EncryptedUnsupported);
    }

    Ok(bytes)
}

#[derive(Debug, Clone)]
struct OpenDocument {
    page_sizes: Vec<PageSize>,
}

/// Geometry comes from the page tree. Rasterization yields blank pages of
/// the right size; enable the `pdfium` feature for real pixels.
#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, OpenDocument>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, PdfEngineError> {
        let doc = Document::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            let size = media_box(&doc, object_id).unwrap_or(FALLBACK_PAGE_SIZE);
            sizes.push(size);
        }

        if sizes.is_empty() {
            return Err(PdfEngineError::NoPages);
        }

        Ok(sizes)
    }

    fn document(&self, handle: DocumentHandle) -> Result<&OpenDocument, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

fn media_box(doc: &Document, page_id: ObjectId) -> Option<PageSize> {
    let mut dict: &Dictionary = doc.get_dictionary(page_id).ok()?;

    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Some(size) = own_media_box(dict) {
            return Some(size);
        }

        let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }

    None
}

fn own_media_box(dict: &Dictionary) -> Option<PageSize> {
    let array = dict.get(b"MediaBox").ok()?.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let x0 = array[0].as_float().ok()?;
    let y0 = array[1].as_float().ok()?;
    let x1 = array[2].as_float().ok()?;
    let y1 = array[3].as_float().ok()?;
    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
}

impl PdfEngine for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = read_source(source)?;
        let page_sizes = Self::parse_sizes(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        tracing::debug!(handle = handle.raw(), pages = page_sizes.len(), "opened PDF");
        self.docs.insert(handle, OpenDocument { page_sizes });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.document(handle)?.page_sizes.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        let document = self.document(handle)?;
        document.page_sizes.get(page_index as usize).copied().ok_or(
            PdfEngineError::PageOutOfRange {
                page: page_index,
                page_count: document.page_sizes.len() as u32,
            },
        )
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError> {
        let page_size = self.page_size(handle, request.page_index)?;
        let (_, region) = render_geometry(page_size, &request)?;

        let mut image = RgbaImage::from_pixel(region.width, region.height, Rgba([255, 255, 255, 255]));
        if request.clip.is_none() {
            overlay::stroke_rect(
                &mut image,
                PixelRegion { x: 0, y: 0, width: region.width, height: region.height },
                Rgba([220, 220, 220, 255]),
                1,
            );
        }

        Ok(image)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }

    fn renders_content(&self) -> bool {
        false
    }
}

#[cfg(feature = "pdfium")]
pub fn default_engine() -> Box<dyn PdfEngine> {
    match pdfium_backend::PdfiumEngine::from_system_library() {
        Ok(engine) => Box::new(engine),
        Err(err) => {
            tracing::warn!("pdfium unavailable, rendering blank pages: {err}");
            Box::new(LopdfEngine::new())
        }
    }
}

#[cfg(not(feature = "pdfium"))]
pub fn default_engine() -> Box<dyn PdfEngine> {
    Box::new(LopdfEngine::new())
}
