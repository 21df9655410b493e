//! VLM interaction: build the structured-extraction request and call the
//! chat-completions endpoint.
//!
//! One page, one request. There is no retry and no backoff: a failed call
//! fails that page only, and the caller records it and moves on. All prompt
//! text lives in [`crate::prompts`] and the output contract in
//! [`crate::schema`]; this module only shapes and sends the request.
//!
//! The reply is returned undecoded (`serde_json::Value`) so the page record
//! can keep the raw response; [`ChatCompletion`] is the typed view of the
//! outer envelope used when normalising it.

use crate::config::ExtractionConfig;
use crate::prompts::DEFAULT_EXTRACTION_PROMPT;
use crate::schema::response_format;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Longest response-body excerpt kept in an HTTP error message.
const ERROR_BODY_LIMIT: usize = 500;

/// Why an extraction request produced no usable reply body.
#[derive(Debug, Error)]
pub enum ExtractorError {
    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never completed (DNS, TLS, connection reset, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The reply body was not JSON.
    #[error("response body is not JSON: {0}")]
    InvalidBody(String),
}

/// Sends one encoded page image for structured extraction.
#[async_trait]
pub trait MenuExtractor: Send + Sync {
    /// Returns the decoded JSON response body.
    async fn extract(&self, image_data_url: &str) -> Result<Value, ExtractorError>;
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    provider: ProviderPreferences,
    response_format: Value,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct ProviderPreferences {
    /// Route only to providers that honour every request parameter,
    /// `response_format` in particular.
    require_parameters: bool,
}

/// The outer chat-completions envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletion {
    /// `None` when the key is absent or `null`.
    #[serde(default)]
    pub choices: Option<Vec<Choice>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletion {
    /// Content of the first choice, `""` when the message or content is absent.
    /// `None` when there are no choices, whether missing, `null` or empty.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.as_deref().and_then(<[Choice]>::first).map(|c| {
            c.message
                .as_ref()
                .and_then(|m| m.content.as_deref())
                .unwrap_or("")
        })
    }
}

/// Build the request body for one page.
fn build_request<'a>(model: &'a str, prompt: &'a str, image_data_url: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content: vec![
                ContentPart::Text { text: prompt },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_data_url,
                    },
                },
            ],
        }],
        provider: ProviderPreferences {
            require_parameters: true,
        },
        response_format: response_format(),
    }
}

// ── OpenRouter client ────────────────────────────────────────────────────

/// [`MenuExtractor`] for OpenRouter (or any OpenAI-compatible endpoint that
/// supports `json_schema` response formats).
pub struct OpenRouterClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    prompt: String,
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenRouterClient {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        prompt: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ExtractorError> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let http = builder
            .build()
            .map_err(|e| ExtractorError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            prompt: prompt.into(),
        })
    }

    /// Build a client from a validated config.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, crate::error::MenuOcrError> {
        let api_key = config.credential()?;
        let prompt = config
            .prompt
            .as_deref()
            .unwrap_or(DEFAULT_EXTRACTION_PROMPT);
        Self::new(
            config.endpoint.clone(),
            config.model.clone(),
            api_key,
            prompt,
            config.request_timeout_secs.map(Duration::from_secs),
        )
        .map_err(|e| crate::error::MenuOcrError::InvalidConfig(e.to_string()))
    }
}

#[async_trait]
impl MenuExtractor for OpenRouterClient {
    async fn extract(&self, image_data_url: &str) -> Result<Value, ExtractorError> {
        let start = Instant::now();
        let body = build_request(&self.model, &self.prompt, image_data_url);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractorError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractorError::Http {
                status: status.as_u16(),
                body: error_body(response.text().await),
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| ExtractorError::InvalidBody(e.to_string()))?;

        debug!(
            "{} replied in {:?}",
            self.model,
            start.elapsed()
        );
        Ok(value)
    }
}

/// Body excerpt for an HTTP error; a failed read is reported in its place.
fn error_body<E: std::fmt::Display>(read: Result<String, E>) -> String {
    match read {
        Ok(text) => truncate(&text, ERROR_BODY_LIMIT),
        Err(e) => format!("<failed to read response body: {e}>"),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\u{2026}", &s[..end])
}
