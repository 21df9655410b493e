//! Pipeline stages for menu extraction.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested alone and swapped behind its trait (rasterizer, extractor).
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ page
//! (path)    (pdfium)   (base64)   (VLM)   (normalise)
//! ```
//!
//! 1. [`input`]  — validate the operator's PDF path
//! 2. [`render`] — page count and one-page rasterisation; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`] — JPEG-encode and wrap as a `data:` URL
//! 4. [`llm`]    — one schema-constrained chat-completions request per page
//! 5. [`page`]   — drive 2–4 for one page and decode the reply into a
//!    [`crate::output::MenuExtractionResult`]

pub mod encode;
pub mod input;
pub mod llm;
pub mod page;
pub mod render;
