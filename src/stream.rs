//! Streaming extraction: one result per page, lazily, in page order.
//!
//! [`extraction_stream`] does the fatal pre-checks (credential, PDF path,
//! page count) eagerly and then returns a `Stream` that renders and extracts
//! page *k* only when the consumer asks for item *k*. Pages are processed one
//! at a time; the stream yields exactly `total_pages` items, page 1 first,
//! and never ends early because a page failed.
//!
//! The stream is single-pass. Running it again means rendering and calling
//! the model for every page again.

use crate::config::ExtractionConfig;
use crate::error::MenuOcrError;
use crate::output::MenuExtractionResult;
use crate::pipeline::llm::{MenuExtractor, OpenRouterClient};
use crate::pipeline::render::{self, PageRasterizer, PdfiumRasterizer};
use crate::pipeline::{input, page};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page results.
pub type ResultStream = Pin<Box<dyn Stream<Item = MenuExtractionResult> + Send>>;

/// Start an extraction run over every page of `pdf_path`.
///
/// # Errors
/// Only fatal errors, before any page is processed:
/// - credential missing ([`MenuOcrError::MissingCredential`])
/// - no / missing / non-PDF input
/// - page count unavailable ([`MenuOcrError::Inspection`])
pub async fn extraction_stream(
    pdf_path: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ResultStream, MenuOcrError> {
    config.credential()?;
    let pdf_path = input::resolve_pdf(pdf_path.as_ref())?;
    info!("Starting extraction: {}", pdf_path.display());

    let rasterizer = resolve_rasterizer(config);
    let extractor = resolve_extractor(config)?;

    let total_pages = render::page_count(Arc::clone(&rasterizer), &pdf_path).await?;
    info!("Processing {} pages", total_pages);

    let callback = config.progress_callback.clone();
    if let Some(ref cb) = callback {
        cb.on_run_start(total_pages);
        if total_pages == 0 {
            cb.on_run_complete(0, 0);
        }
    }

    let succeeded = Arc::new(AtomicUsize::new(0));

    let s = stream::iter(1..=total_pages).then(move |page_number| {
        let rasterizer = Arc::clone(&rasterizer);
        let extractor = Arc::clone(&extractor);
        let pdf_path = pdf_path.clone();
        let callback = callback.clone();
        let succeeded = Arc::clone(&succeeded);
        async move {
            info!("Processing page {}/{}...", page_number, total_pages);
            if let Some(ref cb) = callback {
                cb.on_page_start(page_number, total_pages);
            }

            let result =
                page::process_page(&rasterizer, &extractor, &pdf_path, page_number, total_pages)
                    .await;

            if result.is_success() {
                succeeded.fetch_add(1, Ordering::SeqCst);
            }
            if let Some(ref cb) = callback {
                match &result.error {
                    None => cb.on_page_complete(page_number, total_pages, result.item_count),
                    Some(e) => cb.on_page_error(page_number, total_pages, e),
                }
                if page_number == total_pages {
                    cb.on_run_complete(total_pages, succeeded.load(Ordering::SeqCst));
                }
            }
            result
        }
    });

    Ok(Box::pin(s))
}

/// Use the injected rasterizer, else pdfium.
pub(crate) fn resolve_rasterizer(config: &ExtractionConfig) -> Arc<dyn PageRasterizer> {
    match config.rasterizer {
        Some(ref r) => Arc::clone(r),
        None => Arc::new(PdfiumRasterizer::new(
            config.pdfium_lib_path.clone(),
            config.max_rendered_pixels,
        )),
    }
}

/// Use the injected extractor, else an OpenRouter client.
pub(crate) fn resolve_extractor(
    config: &ExtractionConfig,
) -> Result<Arc<dyn MenuExtractor>, MenuOcrError> {
    match config.extractor {
        Some(ref e) => Ok(Arc::clone(e)),
        None => Ok(Arc::new(OpenRouterClient::from_config(config)?)),
    }
}
