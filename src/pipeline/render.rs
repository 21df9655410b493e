//! PDF rasterisation: page counts and single-page renders via pdfium.
//!
//! Each call loads the document and renders exactly one page, so peak memory
//! is one page image no matter how long the menu is. Menus are short; the
//! repeated document load is cheap next to the VLM round trip.
//!
//! pdfium uses thread-local state and blocks, so the async entry points
//! [`page_count`] and [`render_page`] move the work onto tokio's blocking
//! pool with `spawn_blocking`.

use crate::error::{MenuOcrError, PageError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Turns a PDF into page images, one page at a time.
pub trait PageRasterizer: Send + Sync {
    /// Total number of pages.
    ///
    /// Fails with [`MenuOcrError::Inspection`] when the document cannot be
    /// opened or the rendering engine is unavailable.
    fn page_count(&self, pdf_path: &Path) -> Result<usize, MenuOcrError>;

    /// Render one 1-indexed page.
    fn render_page(&self, pdf_path: &Path, page_number: usize) -> Result<DynamicImage, PageError>;
}

/// [`PageRasterizer`] backed by the pdfium shared library.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    lib_dir: Option<PathBuf>,
    max_rendered_pixels: u32,
}

impl PdfiumRasterizer {
    pub fn new(lib_dir: Option<PathBuf>, max_rendered_pixels: u32) -> Self {
        Self {
            lib_dir,
            max_rendered_pixels,
        }
    }

    /// Bind to pdfium in `lib_dir`, or the system library when unset.
    fn bind(&self) -> Result<Pdfium, String> {
        let bindings = match &self.lib_dir {
            Some(dir) => {
                let lib_path =
                    Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
                debug!("Binding pdfium from {}", dir.display());
                Pdfium::bind_to_library(&lib_path)
                    .map_err(|e| format!("failed to load pdfium from {}: {e}", dir.display()))?
            }
            None => Pdfium::bind_to_system_library().map_err(|e| {
                format!("pdfium library not found; install it or pass --pdfium-lib: {e}")
            })?,
        };
        Ok(Pdfium::new(bindings))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn page_count(&self, pdf_path: &Path) -> Result<usize, MenuOcrError> {
        let inspection = |detail: String| MenuOcrError::Inspection {
            path: pdf_path.to_path_buf(),
            detail,
        };

        let pdfium = self.bind().map_err(inspection)?;
        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| inspection(format!("{e:?}")))?;

        let total = document.pages().len() as usize;
        info!("PDF loaded: {} pages", total);
        Ok(total)
    }

    fn render_page(&self, pdf_path: &Path, page_number: usize) -> Result<DynamicImage, PageError> {
        let failed = |detail: String| PageError::Rasterization {
            page: page_number,
            detail,
        };

        let pdfium = self.bind().map_err(failed)?;
        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| failed(format!("{e:?}")))?;

        let pages = document.pages();
        let total = pages.len() as usize;
        if page_number == 0 || page_number > total {
            return Err(failed(format!(
                "no image returned (document has {total} pages)"
            )));
        }

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_rendered_pixels as i32)
            .set_maximum_height(self.max_rendered_pixels as i32);

        let page = pages
            .get((page_number - 1) as u16)
            .map_err(|e| failed(format!("{e:?}")))?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| failed(format!("{e:?}")))?;

        let image = bitmap.as_image();
        if image.width() == 0 || image.height() == 0 {
            return Err(failed("no image returned".to_string()));
        }
        debug!(
            "Rendered page {} → {}x{} px",
            page_number,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

/// Count pages without blocking the async runtime.
pub async fn page_count(
    rasterizer: Arc<dyn PageRasterizer>,
    pdf_path: &Path,
) -> Result<usize, MenuOcrError> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || rasterizer.page_count(&path))
        .await
        .map_err(|e| MenuOcrError::Internal(format!("Inspection task panicked: {}", e)))?
}

/// Render one page without blocking the async runtime.
pub async fn render_page(
    rasterizer: Arc<dyn PageRasterizer>,
    pdf_path: &Path,
    page_number: usize,
) -> Result<DynamicImage, PageError> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || rasterizer.render_page(&path, page_number))
        .await
        .map_err(|e| PageError::Rasterization {
            page: page_number,
            detail: format!("render task panicked: {e}"),
        })?
}
