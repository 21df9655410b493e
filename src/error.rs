//! Error types for the menu-ocr library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`MenuOcrError`] — **Fatal**: the run cannot start or cannot be bounded
//!   (missing credential, no PDF, page count unavailable, load failed).
//!   Returned as `Err(MenuOcrError)` from the top-level entry points.
//!
//! * [`PageError`] — **Non-fatal**: a single page failed (render glitch,
//!   HTTP error, unparseable reply) but every other page is still attempted.
//!   Its message is recorded in [`crate::output::MenuExtractionResult::error`]
//!   so the failure travels to the sink as data.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the menu-ocr library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::output::MenuExtractionResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum MenuOcrError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// The extraction service credential is missing or empty.
    #[error(
        "OPENROUTER_API_KEY environment variable not set.\n\
Please set this environment variable (or pass --api-key) to continue."
    )]
    MissingCredential,

    /// No PDF path was supplied.
    #[error("No PDF file selected. Please select a PDF file first.")]
    NoPdfSelected,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// A standalone image could not be read for encoding.
    #[error("Failed to read image '{path}': {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The page count could not be determined (corrupt file, pdfium missing).
    #[error("Could not get PDF info for '{path}': {detail}")]
    Inspection { path: PathBuf, detail: String },

    // ── Sink errors ───────────────────────────────────────────────────────
    /// Writing the results table failed; the previous table contents are kept.
    #[error("Failed to load results into table '{table}': {detail}")]
    Load { table: String, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MenuOcrError {
    /// `true` for errors raised before any page work, by configuration checks.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MenuOcrError::MissingCredential
                | MenuOcrError::NoPdfSelected
                | MenuOcrError::InvalidConfig(_)
        )
    }
}

/// A non-fatal error for a single page.
///
/// The pipeline converts it to a string and stores it on the page's result;
/// the run continues with the next page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The page could not be rendered or encoded.
    #[error("Could not extract page {page} from PDF: {detail}")]
    Rasterization { page: usize, detail: String },

    /// The extraction service call failed (HTTP status or transport).
    #[error("Page {page}: extraction request failed: {detail}")]
    ServiceCall { page: usize, detail: String },

    /// The service replied without any completion choices.
    #[error("No valid response from OpenRouter")]
    EmptyChoices { page: usize },

    /// The reply's content did not decode as the structured menu payload.
    #[error("Page {page}: malformed structured payload: {detail}")]
    MalformedResponse { page: usize, detail: String },
}

impl PageError {
    /// The 1-indexed page this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::Rasterization { page, .. }
            | PageError::ServiceCall { page, .. }
            | PageError::EmptyChoices { page }
            | PageError::MalformedResponse { page, .. } => *page,
        }
    }
}
