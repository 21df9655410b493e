//! One page, start to finish: render → encode → extract → normalise.
//!
//! [`process_page`] never returns an error. Every failure is caught at this
//! boundary and turned into an error [`MenuExtractionResult`], so a bad page
//! cannot stop the run.
//!
//! The reply is decoded in two stages. The outer envelope is the
//! chat-completions JSON; its `choices[0].message.content` is itself a JSON
//! string that must match [`crate::schema::menu_items_schema`]. A reply that
//! arrives but fails either decode is a malformed response, distinct from a
//! failed request.

use crate::error::PageError;
use crate::output::MenuExtractionResult;
use crate::pipeline::llm::{ChatCompletion, MenuExtractor};
use crate::pipeline::render::{self, PageRasterizer};
use crate::pipeline::encode;
use crate::schema::parse_menu_payload;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produce the result for one 1-indexed page.
pub async fn process_page(
    rasterizer: &Arc<dyn PageRasterizer>,
    extractor: &Arc<dyn MenuExtractor>,
    pdf_path: &Path,
    page_number: usize,
    total_pages: usize,
) -> MenuExtractionResult {
    let pdf = pdf_path.display().to_string();
    let fail = |ocr_response: Option<Value>, e: PageError| {
        warn!("Page {}/{}: {}", page_number, total_pages, e);
        MenuExtractionResult::failure(pdf.clone(), page_number, total_pages, ocr_response, &e)
    };

    let image = match render::render_page(Arc::clone(rasterizer), pdf_path, page_number).await {
        Ok(img) => img,
        Err(e) => return fail(None, e),
    };

    let data_url = match encode::encode_page(&image) {
        Ok(url) => url,
        Err(e) => {
            return fail(
                None,
                PageError::Rasterization {
                    page: page_number,
                    detail: format!("image encoding failed: {e}"),
                },
            )
        }
    };
    drop(image);

    let response = match extractor.extract(&data_url).await {
        Ok(v) => v,
        Err(e) => {
            return fail(
                None,
                PageError::ServiceCall {
                    page: page_number,
                    detail: e.to_string(),
                },
            )
        }
    };

    let result = normalize_response(&pdf, page_number, total_pages, response);
    match &result.error {
        None => debug!(
            "Page {}/{}: {} menu items",
            page_number, total_pages, result.item_count
        ),
        Some(e) => warn!("Page {}/{}: {}", page_number, total_pages, e),
    }
    result
}

/// Turn a raw service reply into the page's result.
pub fn normalize_response(
    pdf_path: &str,
    page_number: usize,
    total_pages: usize,
    response: Value,
) -> MenuExtractionResult {
    let failure = |response: Value, e: PageError| {
        MenuExtractionResult::failure(pdf_path, page_number, total_pages, Some(response), &e)
    };

    let envelope: ChatCompletion = match serde_json::from_value(response.clone()) {
        Ok(c) => c,
        Err(e) => {
            return failure(
                response,
                PageError::MalformedResponse {
                    page: page_number,
                    detail: format!("unexpected response envelope: {e}"),
                },
            )
        }
    };

    let Some(content) = envelope.first_content() else {
        return failure(response, PageError::EmptyChoices { page: page_number });
    };

    match parse_menu_payload(content) {
        Ok((menu_data, items)) => MenuExtractionResult::success(
            pdf_path,
            page_number,
            total_pages,
            response,
            menu_data,
            items,
        ),
        Err(detail) => failure(
            response,
            PageError::MalformedResponse {
                page: page_number,
                detail,
            },
        ),
    }
}
