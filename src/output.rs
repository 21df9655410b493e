//! Records produced by the page pipeline.

use crate::error::PageError;
use crate::schema::MenuItem;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The outcome of one PDF page.
///
/// Exactly one of `menu_data` / `error` is populated. An empty but successful
/// page has `menu_data = Some(..)`, `menu_items = []` and no `error`.
/// Build values with [`MenuExtractionResult::success`] or
/// [`MenuExtractionResult::failure`]. Outside this crate the fields are
/// read-only in practice: a struct literal does not compile.
///
/// ```compile_fail
/// let r = menu_ocr::MenuExtractionResult {
///     pdf_path: "menu.pdf".into(),
///     page_number: 1,
///     total_pages: 1,
///     ocr_response: None,
///     menu_data: None,
///     menu_items: vec![],
///     item_count: 0,
///     error: None,
///     processed_at: String::new(),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct MenuExtractionResult {
    pub pdf_path: String,
    /// 1-indexed.
    pub page_number: usize,
    pub total_pages: usize,
    /// Raw service reply; `None` when the request never produced one.
    pub ocr_response: Option<Value>,
    /// Parsed structured payload; `None` on failure.
    pub menu_data: Option<Value>,
    pub menu_items: Vec<MenuItem>,
    pub item_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339 UTC timestamp of when the record was created.
    pub processed_at: String,
}

impl MenuExtractionResult {
    pub fn success(
        pdf_path: impl Into<String>,
        page_number: usize,
        total_pages: usize,
        ocr_response: Value,
        menu_data: Value,
        menu_items: Vec<MenuItem>,
    ) -> Self {
        Self {
            pdf_path: pdf_path.into(),
            page_number,
            total_pages,
            ocr_response: Some(ocr_response),
            menu_data: Some(menu_data),
            item_count: menu_items.len(),
            menu_items,
            error: None,
            processed_at: timestamp(),
        }
    }

    /// A failed page. `ocr_response` is kept when the service did answer
    /// (empty choices, malformed content) so the raw reply reaches the table.
    pub fn failure(
        pdf_path: impl Into<String>,
        page_number: usize,
        total_pages: usize,
        ocr_response: Option<Value>,
        error: &PageError,
    ) -> Self {
        Self {
            pdf_path: pdf_path.into(),
            page_number,
            total_pages,
            ocr_response,
            menu_data: None,
            menu_items: Vec::new(),
            item_count: 0,
            error: Some(error.to_string()),
            processed_at: timestamp(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Summary counts over a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_pages: usize,
    pub succeeded_pages: usize,
    pub failed_pages: usize,
    pub total_items: usize,
    pub duration_ms: u64,
}

impl RunStats {
    pub fn from_results(results: &[MenuExtractionResult], duration_ms: u64) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            total_pages: results.len(),
            succeeded_pages: succeeded,
            failed_pages: results.len() - succeeded,
            total_items: results.iter().map(|r| r.item_count).sum(),
            duration_ms,
        }
    }
}

/// Everything an eager extraction run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// One result per page, in page order.
    pub results: Vec<MenuExtractionResult>,
    pub stats: RunStats,
}
