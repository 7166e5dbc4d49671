//! OpenRouter chat client for the rephrasing pass.
//!
//! Kept deliberately small: the engine sends one non-streaming completion
//! per request and validates the JSON that comes back. Transient HTTP/API
//! errors (429, 5xx, network timeouts) are retried with exponential backoff
//! and deterministic jitter; 400/401-class errors are never retried.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for the rephrasing pass. Cheap and fast; the validator
/// catches anything it gets wrong.
pub const DEFAULT_REPHRASE_MODEL: &str = "openai/gpt-4o-mini";

const REPHRASE_MAX_TOKENS: u32 = 1_500;

// ── Request/response types ────────────────────────────────────────

/// One chat message.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A non-streaming chat completion request.
#[derive(Serialize, Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl ChatRequest {
    /// A rephrasing request: low temperature, bounded output.
    pub fn rephrase(model: &str, system: &str, user: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![Message::system(system), Message::user(user)],
            max_tokens: REPHRASE_MAX_TOKENS,
            temperature: 0.2,
        }
    }
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawMessage,
}

#[derive(Deserialize, Debug)]
struct RawMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

// ── Retry policy ──────────────────────────────────────────────────

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = fail immediately).
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0).
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic jitter keyed on the attempt number; not worth
            // pulling in rand for this.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Whether an error string indicates a transient (retryable) failure.
pub fn is_transient_error(error: &str) -> bool {
    let transient_statuses = ["429", "500", "502", "503", "504"];
    if transient_statuses
        .iter()
        .any(|s| error.contains(&format!("HTTP {s}")))
    {
        return true;
    }

    let lower = error.to_lowercase();
    [
        "request failed:",
        "connection reset",
        "connection refused",
        "timed out",
        "timeout",
        "broken pipe",
        "network",
    ]
    .iter()
    .any(|p| lower.contains(p))
}

// ── Client ────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    referer: String,
    title: String,
    pub model: String,
    pub retry: RetryConfig,
}

impl LlmClient {
    /// Create a client with the given API key and the default rephrasing
    /// model.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("visage-rs/0.3")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: "https://github.com/tacryt-socryp/visage-rs".to_string(),
            title: "visage-rs".to_string(),
            model: DEFAULT_REPHRASE_MODEL.to_string(),
            retry: RetryConfig::default(),
        })
    }

    /// Read the API key from `OPENROUTER_KEY`. Fails fast when unset so the
    /// engine can fall back to deterministic output with a warning.
    pub fn from_env() -> Result<Self, String> {
        let api_key =
            std::env::var("OPENROUTER_KEY").map_err(|_| "OPENROUTER_KEY not set".to_string())?;
        Self::new(api_key)
    }

    /// Override the model used for rephrasing.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Send one chat completion request and return the text content.
    pub async fn chat(&self, body: &ChatRequest) -> Result<String, String> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("OpenRouter API HTTP {status}: {text}"));
        }

        let parsed: RawChatResponse =
            serde_json::from_str(&text).map_err(|e| format!("failed to parse response: {e}"))?;

        if let Some(err) = parsed.error {
            return Err(format!("OpenRouter API error: {}", err.message));
        }

        parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .ok_or_else(|| "OpenRouter API returned no content".to_string())
    }

    /// [`chat`](Self::chat) with transient-error retry.
    pub async fn chat_with_retry(&self, body: &ChatRequest) -> Result<String, String> {
        let mut attempt = 0;
        loop {
            match self.chat(body).await {
                Ok(content) => return Ok(content),
                Err(e) if attempt < self.retry.max_retries && is_transient_error(&e) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!("transient LLM error (attempt {attempt}): {e}; retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
