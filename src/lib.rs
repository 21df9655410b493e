//! # menu-ocr
//!
//! Extract structured menu items from scanned restaurant-menu PDFs using
//! Vision Language Models (VLMs), and load them into a local SQLite table.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    validate the local path (%PDF magic)
//!  ├─ 2. Inspect  page count via pdfium (fatal if unavailable)
//!  │   for page in 1..=N, one at a time:
//!  ├─ 3. Render   rasterise this page only (spawn_blocking)
//!  ├─ 4. Encode   JPEG → data:image/jpeg;base64,…
//!  ├─ 5. VLM      chat completion with a strict JSON-schema response format
//!  ├─ 6. Parse    envelope → content string → { "menuItems": [...] }
//!  └─ 7. Load     stream of page records → full replace of the table
//! ```
//!
//! A page that fails at steps 3–6 becomes a record with its `error` set and
//! the run moves on to the next page.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use menu_ocr::{run_pipeline, ExtractionConfig, LoaderConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads OPENROUTER_API_KEY once; build() fails if it is missing.
//!     let config = ExtractionConfig::from_env().build()?;
//!     let info = run_pipeline("menu.pdf", &config, &LoaderConfig::default()).await?;
//!     eprintln!("{} items in {}", info.items_loaded, info.table);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `menu-ocr` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;
pub mod schema;
pub mod sink;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, LoaderConfig};
pub use error::{MenuOcrError, PageError};
pub use output::{ExtractionOutput, MenuExtractionResult, RunStats};
pub use pipeline::llm::{MenuExtractor, OpenRouterClient};
pub use pipeline::render::{PageRasterizer, PdfiumRasterizer};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use run::{extract_image, extract_menu, extract_menu_sync, inspect, run_pipeline};
pub use schema::MenuItem;
pub use sink::{LoadInfo, SqliteLoader};
pub use stream::{extraction_stream, ResultStream};
