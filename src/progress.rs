//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline processes each page. Pages are processed one at a
//! time, so events for a run arrive strictly in page order.
//!
//! # Example
//!
//! ```rust
//! use menu_ocr::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct ItemCounter {
//!     items: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for ItemCounter {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, item_count: usize) {
//!         self.items.fetch_add(item_count, Ordering::SeqCst);
//!         eprintln!("Page {}/{}: {} items", page_num, total_pages, item_count);
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .api_key("sk-or-test")
//!     .progress_callback(Arc::new(ItemCounter { items: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the page pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once, after the page count is known and before page 1.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a page is rasterised.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page produced a successful result.
    ///
    /// # Arguments
    /// * `item_count` — number of menu items extracted from the page
    fn on_page_complete(&self, page_num: usize, total_pages: usize, item_count: usize) {
        let _ = (page_num, total_pages, item_count);
    }

    /// Called when a page produced an error result.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after the last page has been emitted.
    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
