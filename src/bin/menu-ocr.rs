//! CLI binary for menu-ocr.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` / `LoaderConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use menu_ocr::config::{DEFAULT_ENDPOINT, DEFAULT_MAX_RENDERED_PIXELS, DEFAULT_MODEL};
use menu_ocr::{
    extract_image, extract_menu, inspect, run_pipeline, ExtractionConfig,
    ExtractionProgressCallback, LoaderConfig, ProgressCallback,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while the PDF is inspected, then a bar with
/// one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the page currently in flight. Pages run one at a time.
    page_started: Mutex<Option<Instant>>,
    items: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.yellow} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Counting pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
            items: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.yellow} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn page_elapsed(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut g| g.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            yellow("◆"),
            bold(&format!("Processing {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut g) = self.page_started.lock() {
            *g = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, item_count: usize) {
        let secs = self.page_elapsed();
        self.items.fetch_add(item_count, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{item_count:>4} items")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.page_elapsed();
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();
        let items = self.items.load(Ordering::SeqCst);

        if failed == 0 {
            eprintln!(
                "{} {} pages processed, {} menu items",
                green("✔"),
                bold(&success_count.to_string()),
                bold(&items.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages processed, {} menu items  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    yellow("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                bold(&items.to_string()),
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a menu and load it into ./mandu.db, table "dinner_menu"
  menu-ocr dinner-menu.pdf

  # Choose the database location, dataset and table
  menu-ocr --database-dir data --dataset menus --table spring menu.pdf

  # Print the per-page records as JSON instead of loading them
  menu-ocr --json menu.pdf > menu.json

  # Extract a single photographed page
  menu-ocr --image photo.jpg

  # Page count only (no API key needed)
  menu-ocr --inspect-only menu.pdf

OUTPUT TABLES (SQLite, <database-dir>/<dataset>.db):
  <table>                one row per page (raw reply, payload, error, counts)
  <table>__menu_items    one row per extracted item, linked by page_number
  _loads                 one row per completed load
  Every run fully replaces <table> and <table>__menu_items.

ENVIRONMENT VARIABLES:
  OPENROUTER_API_KEY     OpenRouter API key (required for extraction)
  MENU_OCR_MODEL         Override model ID
  PDFIUM_LIB_PATH        Directory containing libpdfium
  RUST_LOG               Override the log filter
"#;

/// Extract structured menu items from scanned menu PDFs using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "menu-ocr",
    version,
    about = "Extract structured menu items from scanned menu PDFs using Vision LLMs",
    long_about = "Render every page of a scanned restaurant menu, ask a vision model on \
OpenRouter for a strict JSON list of menu items, and load the results into a local \
SQLite table.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path (or image path with --image).
    input: String,

    /// OpenRouter API key.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Vision model ID.
    #[arg(long, env = "MENU_OCR_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Chat-completions endpoint URL.
    #[arg(long, env = "MENU_OCR_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Directory holding the SQLite database file.
    #[arg(long, env = "MENU_OCR_DATABASE_DIR", default_value = ".")]
    database_dir: PathBuf,

    /// Dataset name; the database file is <dataset>.db.
    #[arg(long, env = "MENU_OCR_DATASET", default_value = "mandu")]
    dataset: String,

    /// Destination table (default: derived from the PDF file name).
    #[arg(long)]
    table: Option<String>,

    /// Longest rendered page side, in pixels.
    #[arg(long, default_value_t = DEFAULT_MAX_RENDERED_PIXELS,
          value_parser = clap::value_parser!(u32).range(100..=10_000))]
    max_pixels: u32,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Per-request timeout in seconds (default: none).
    #[arg(long, env = "MENU_OCR_TIMEOUT")]
    timeout: Option<u64>,

    /// Print the per-page records as JSON instead of loading them.
    #[arg(long)]
    json: bool,

    /// Print the page count only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Treat the input as a single image file instead of a PDF.
    #[arg(long, conflicts_with = "inspect_only")]
    image: bool,

    /// Disable progress bar.
    #[arg(long, env = "MENU_OCR_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar gives all the feedback that matters, so library logs
    // drop to errors while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.image;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let pages = inspect(&cli.input, cli.pdfium_lib.clone())
            .await
            .context("Failed to inspect PDF")?;
        if cli.json {
            println!("{}", serde_json::json!({ "file": cli.input, "pages": pages }));
        } else {
            println!("File:   {}", cli.input);
            println!("Pages:  {}", pages);
        }
        return Ok(());
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Single image ─────────────────────────────────────────────────────
    if cli.image {
        let result = extract_image(&cli.input, &config)
            .await
            .context("Image extraction failed")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise result")?
        );
        if let Some(ref e) = result.error {
            anyhow::bail!("{}", e);
        }
        return Ok(());
    }

    // ── Print records instead of loading ─────────────────────────────────
    if cli.json {
        let output = extract_menu(&cli.input, &config)
            .await
            .context("Extraction failed")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
        return Ok(());
    }

    // ── Extract and load ─────────────────────────────────────────────────
    let loader = LoaderConfig {
        database_dir: cli.database_dir.clone(),
        dataset_name: cli.dataset.clone(),
        table_name: cli.table.clone(),
        ..LoaderConfig::default()
    };
    let info = run_pipeline(&cli.input, &config, &loader)
        .await
        .context("Pipeline failed")?;

    if !cli.quiet {
        eprintln!(
            "{}  {} rows → {}  {}",
            if info.failed_pages == 0 {
                green("✔")
            } else {
                yellow("⚠")
            },
            info.pages_loaded,
            bold(&format!("{}.{}", info.database_path.display(), info.table)),
            dim(&format!("({} items in {})", info.items_loaded, info.items_table)),
        );
        if info.failed_pages > 0 {
            eprintln!(
                "   {} pages failed; see the error column",
                red(&info.failed_pages.to_string())
            );
        }
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .endpoint(cli.endpoint.clone())
        .model(cli.model.clone())
        .max_rendered_pixels(cli.max_pixels);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref dir) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(dir.clone());
    }
    if let Some(secs) = cli.timeout {
        builder = builder.request_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
