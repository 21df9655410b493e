//! Top-level entry points.
//!
//! * [`run_pipeline`] — extract every page and load the results into SQLite.
//! * [`extract_menu`] — extract every page and return the results in memory.
//! * [`extract_image`] — extract a single standalone image file.
//! * [`inspect`] — page count only; needs no credential.
//!
//! All of them report configuration and inspection problems as
//! `Err(MenuOcrError)` before any page is processed. Page failures never
//! surface as `Err`; they are recorded on the page's result.

use crate::config::{ExtractionConfig, LoaderConfig, DEFAULT_MAX_RENDERED_PIXELS};
use crate::error::{MenuOcrError, PageError};
use crate::output::{ExtractionOutput, MenuExtractionResult, RunStats};
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer};
use crate::pipeline::{encode, input, page};
use crate::sink::{table_name_for, LoadInfo, SqliteLoader};
use crate::stream::{extraction_stream, resolve_extractor};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Extract menu items from every page of `pdf_path` and replace the
/// destination table with the results.
///
/// The table is `loader.table_name`, or the normalised PDF file name.
///
/// # Errors
/// - configuration errors and [`MenuOcrError::Inspection`]: nothing is
///   written and the loader is never opened
/// - [`MenuOcrError::Load`]: the previous table contents are kept
pub async fn run_pipeline(
    pdf_path: impl AsRef<str>,
    config: &ExtractionConfig,
    loader: &LoaderConfig,
) -> Result<LoadInfo, MenuOcrError> {
    let pdf_path = pdf_path.as_ref();
    let table = loader
        .table_name
        .clone()
        .unwrap_or_else(|| table_name_for(Path::new(pdf_path)));

    let records = extraction_stream(pdf_path, config).await?;

    let info = SqliteLoader::new(loader.clone()).load(&table, records).await?;
    info!(
        "Pipeline completed: {} pages ({} failed), {} items → {}",
        info.pages_loaded,
        info.failed_pages,
        info.items_loaded,
        info.database_path.display()
    );
    Ok(info)
}

/// Extract menu items from every page and collect the results.
pub async fn extract_menu(
    pdf_path: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, MenuOcrError> {
    let start = Instant::now();
    let results: Vec<MenuExtractionResult> =
        extraction_stream(pdf_path, config).await?.collect().await;

    let stats = RunStats::from_results(&results, start.elapsed().as_millis() as u64);
    info!(
        "Extraction complete: {}/{} pages, {} items, {}ms",
        stats.succeeded_pages, stats.total_pages, stats.total_items, stats.duration_ms
    );
    Ok(ExtractionOutput { results, stats })
}

/// Synchronous wrapper around [`extract_menu`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_menu_sync(
    pdf_path: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, MenuOcrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| MenuOcrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_menu(pdf_path, config))
}

/// Extract menu items from one image file (PNG, JPEG, WebP).
///
/// The file is sent as-is, with its MIME type taken from the extension. The
/// result is numbered as page 1 of 1.
pub async fn extract_image(
    image_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<MenuExtractionResult, MenuOcrError> {
    config.credential()?;
    let image_path = image_path.as_ref();
    let extractor = resolve_extractor(config)?;

    let data_url = encode::encode_file(image_path).map_err(|e| MenuOcrError::ImageRead {
        path: image_path.to_path_buf(),
        source: e,
    })?;

    let source = image_path.display().to_string();
    let result = match extractor.extract(&data_url).await {
        Ok(response) => page::normalize_response(&source, 1, 1, response),
        Err(e) => {
            let err = PageError::ServiceCall {
                page: 1,
                detail: e.to_string(),
            };
            warn!("{}: {}", source, err);
            MenuExtractionResult::failure(source, 1, 1, None, &err)
        }
    };
    Ok(result)
}

/// Count the pages of a PDF without extracting anything.
///
/// Nothing is rendered, so the render size is left at its default.
pub async fn inspect(
    pdf_path: impl AsRef<str>,
    pdfium_lib_path: Option<PathBuf>,
) -> Result<usize, MenuOcrError> {
    let path = input::resolve_pdf(pdf_path.as_ref())?;
    let rasterizer: std::sync::Arc<dyn PageRasterizer> = std::sync::Arc::new(
        PdfiumRasterizer::new(pdfium_lib_path, DEFAULT_MAX_RENDERED_PIXELS),
    );
    crate::pipeline::render::page_count(rasterizer, &path).await
}
