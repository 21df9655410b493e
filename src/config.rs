//! Configuration types for menu extraction and loading.
//!
//! Extraction behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. The credential is an explicit value of the
//! config: [`ExtractionConfigBuilder::build`] refuses to produce a config
//! without one, so a missing key is reported before any page is touched and
//! the environment is never consulted mid-run.
//!
//! Where results are written is controlled by the separate [`LoaderConfig`].

use crate::error::MenuOcrError;
use crate::pipeline::llm::MenuExtractor;
use crate::pipeline::render::PageRasterizer;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable holding the OpenRouter credential.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Chat-completions endpoint used unless overridden.
pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Vision model used unless overridden.
pub const DEFAULT_MODEL: &str = "qwen/qwen3-vl-30b-a3b-instruct";

/// Default longest side of a rendered page, in pixels.
pub const DEFAULT_MAX_RENDERED_PIXELS: u32 = 2000;

/// Configuration for extracting menu items from a PDF.
///
/// # Example
/// ```rust
/// use menu_ocr::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .api_key("sk-or-test")
///     .model("qwen/qwen3-vl-30b-a3b-instruct")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_rendered_pixels, 2000);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Bearer credential for the extraction service. Always `Some` and
    /// non-empty on a built config.
    pub api_key: Option<String>,

    /// Chat-completions URL. Default: [`DEFAULT_ENDPOINT`].
    pub endpoint: String,

    /// Vision model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Custom extraction instruction. If None, uses the built-in default.
    pub prompt: Option<String>,

    /// Maximum rendered image dimension (width or height) in pixels.
    /// Default: [`DEFAULT_MAX_RENDERED_PIXELS`].
    ///
    /// Caps memory per page regardless of the PDF's physical page size.
    pub max_rendered_pixels: u32,

    /// Directory containing the pdfium shared library. If None, the system
    /// library search path is used.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Per-request timeout in seconds. Default: None (wait indefinitely).
    pub request_timeout_secs: Option<u64>,

    /// Pre-constructed rasterizer. Takes precedence over pdfium.
    pub rasterizer: Option<Arc<dyn PageRasterizer>>,

    /// Pre-constructed extraction client. Takes precedence over OpenRouter.
    pub extractor: Option<Arc<dyn MenuExtractor>>,

    /// Per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            prompt: None,
            max_rendered_pixels: DEFAULT_MAX_RENDERED_PIXELS,
            pdfium_lib_path: None,
            request_timeout_secs: None,
            rasterizer: None,
            extractor: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("prompt", &self.prompt.as_ref().map(|p| p.len()))
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("rasterizer", &self.rasterizer.as_ref().map(|_| "<dyn PageRasterizer>"))
            .field("extractor", &self.extractor.as_ref().map(|_| "<dyn MenuExtractor>"))
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// A builder pre-loaded with the credential from [`API_KEY_ENV`], if set.
    ///
    /// The environment is read once, here.
    pub fn from_env() -> ExtractionConfigBuilder {
        let builder = Self::builder();
        match std::env::var(API_KEY_ENV) {
            Ok(key) => builder.api_key(key),
            Err(_) => builder,
        }
    }

    /// The credential of a built config.
    pub(crate) fn credential(&self) -> Result<&str, MenuOcrError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(MenuOcrError::MissingCredential)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn MenuExtractor>) -> Self {
        self.config.extractor = Some(extractor);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, MenuOcrError> {
        let c = &self.config;
        c.credential()?;
        if !(c.endpoint.starts_with("http://") || c.endpoint.starts_with("https://")) {
            return Err(MenuOcrError::InvalidConfig(format!(
                "endpoint must be an HTTP(S) URL, got '{}'",
                c.endpoint
            )));
        }
        if c.model.trim().is_empty() {
            return Err(MenuOcrError::InvalidConfig("model must not be empty".into()));
        }
        if c.request_timeout_secs == Some(0) {
            return Err(MenuOcrError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Where and how extraction results are stored.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Directory holding the database file. Default: current directory.
    pub database_dir: PathBuf,

    /// Dataset namespace; the database file is `<dataset_name>.db`. Default: "mandu".
    pub dataset_name: String,

    /// Explicit table name. If None, derived from the PDF file name.
    pub table_name: Option<String>,

    /// Records buffered between the page stream and the writer. Default: 8.
    pub channel_capacity: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            database_dir: PathBuf::from("."),
            dataset_name: "mandu".to_string(),
            table_name: None,
            channel_capacity: 8,
        }
    }
}

impl LoaderConfig {
    /// Full path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.database_dir.join(format!("{}.db", self.dataset_name))
    }
}
