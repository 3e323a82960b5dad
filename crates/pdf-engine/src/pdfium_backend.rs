use crate::{
    read_source, render_geometry, DocumentHandle, LopdfEngine, OpenSource, PageSize, PdfEngine,
    PdfEngineError, RenderRequest, RgbaImage,
};
use pdfium_render::prelude::*;
use std::collections::HashMap;

struct LoadedDocument {
    bytes: Vec<u8>,
    page_sizes: Vec<PageSize>,
}

/// Renders real page pixels through a system PDFium library. Geometry still
/// comes from lopdf so both backends agree on page sizes.
pub struct PdfiumEngine {
    pdfium: Pdfium,
    next_handle: u64,
    docs: HashMap<DocumentHandle, LoadedDocument>,
}

impl PdfiumEngine {
    pub fn from_system_library() -> Result<Self, PdfEngineError> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|err| {
                PdfEngineError::Backend(format!("failed to bind pdfium library: {err}"))
            })?;

        Ok(Self { pdfium: Pdfium::new(bindings), next_handle: 0, docs: HashMap::new() })
    }

    fn document(&self, handle: DocumentHandle) -> Result<&LoadedDocument, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

impl PdfEngine for PdfiumEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = read_source(source)?;
        let page_sizes = LopdfEngine::parse_sizes(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        self.docs.insert(handle, LoadedDocument { bytes, page_sizes });

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
        let ((full_width, full_height), region) = render_geometry(page_size, &request)?;
        let document = self.document(handle)?;

        let pdf = self
            .pdfium
            .load_pdf_from_byte_slice(&document.bytes, None)
            .map_err(|err| PdfEngineError::Backend(err.to_string()))?;
        let page = pdf
            .pages()
            .get(request.page_index as u16)
            .map_err(|err| PdfEngineError::Backend(err.to_string()))?;

        let config = PdfRenderConfig::new()
            .set_target_width(full_width as i32)
            .set_target_height(full_height as i32);
        let bitmap =
            page.render_with_config(&config).map_err(|err| PdfEngineError::Backend(err.to_string()))?;

        let full = RgbaImage::from_raw(full_width, full_height, bitmap.as_rgba_bytes().to_vec())
            .ok_or_else(|| PdfEngineError::Backend("bitmap size mismatch".to_owned()))?;

        if request.clip.is_none() {
            return Ok(full);
        }

        Ok(image::imageops::crop_imm(&full, region.x, region.y, region.width, region.height)
            .to_image())
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}
