//! External text-generation provider client.
//!
//! `TextProvider` is the seam between the adapters and the network: chat
//! completions for copy generation, embeddings for ingestion/retrieval, and
//! audio transcription for media files. `OpenAiProvider` speaks the
//! OpenAI-compatible wire format over reqwest with a hard per-request
//! timeout and a bounded retry policy; `StubProvider` is the deterministic
//! in-process implementation used by tests and credential-less deployments.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("empty response from provider")]
    EmptyResponse,
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Chat sampling parameters, fixed for content generation.
pub const CHAT_TEMPERATURE: f32 = 0.3;
pub const CHAT_MAX_TOKENS: u32 = 1000;

#[async_trait]
pub trait TextProvider: Send + Sync {
    /// One chat completion; returns the assistant message text.
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ProviderError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Transcribe an audio/video payload to text.
    async fn transcribe(&self, bytes: &[u8], mime_type: &str) -> Result<String, ProviderError>;

    /// Label recorded on versions produced with this provider.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

fn status_is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_delay(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    if let Some(value) = retry_after.and_then(|v| v.to_str().ok()) {
        if let Ok(secs) = value.parse::<u64>() {
            return Duration::from_secs(secs.min(30));
        }
    }

    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    Duration::from_millis(base)
}

/// Send a request, retrying transport errors and retryable statuses with
/// exponential backoff, honoring `Retry-After` when present.
async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, ProviderError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(ProviderError::Http);
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                if status_is_retryable(status) && attempt < attempts {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    log::warn!(
                        "provider retry {}/{} after status {} (sleep {:?})",
                        attempt,
                        attempts,
                        status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                let retryable_transport = err.is_timeout() || err.is_connect();
                if retryable_transport && attempt < attempts {
                    let delay = retry_delay(attempt, policy, None);
                    log::warn!(
                        "provider retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(ProviderError::Http(err));
            }
        }
    }

    Err(ProviderError::Unavailable(
        "request exhausted retries".to_string(),
    ))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ProviderError::Api {
        status: status.as_u16(),
        message,
    })
}

// ---------------------------------------------------------------------------
// Wire types (OpenAI-compatible)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

// ---------------------------------------------------------------------------
// HTTP provider
// ---------------------------------------------------------------------------

pub struct OpenAiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embed_model: String,
    transcribe_model: String,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
            embed_model: config.embed_model.clone(),
            transcribe_model: config.transcribe_model.clone(),
            retry: RetryPolicy::default(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl TextProvider for OpenAiProvider {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: CHAT_TEMPERATURE,
            max_tokens: CHAT_MAX_TOKENS,
        };

        let request = self
            .http
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body);

        let response = check_status(send_with_retry(request, &self.retry).await?).await?;
        let parsed: ChatResponse = response.json().await?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = EmbeddingRequest {
            model: &self.embed_model,
            input: text,
        };

        let request = self
            .http
            .post(self.url("embeddings"))
            .bearer_auth(&self.api_key)
            .json(&body);

        let response = check_status(send_with_retry(request, &self.retry).await?).await?;
        let parsed: EmbeddingResponse = response.json().await?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or(ProviderError::EmptyResponse)
    }

    async fn transcribe(&self, bytes: &[u8], mime_type: &str) -> Result<String, ProviderError> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name("upload")
            .mime_str(mime_type)
            .map_err(|e| ProviderError::Unavailable(format!("bad mime type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.transcribe_model.clone())
            .part("file", part);

        // Multipart bodies cannot be cloned for retry; a transcription is
        // one attempt under the client timeout.
        let response = self
            .http
            .post(self.url("audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let response = check_status(response).await?;
        let parsed: TranscriptionResponse = response.json().await?;
        if parsed.text.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(parsed.text)
    }

    fn model_name(&self) -> &str {
        &self.chat_model
    }
}

// ---------------------------------------------------------------------------
// Deterministic stub
// ---------------------------------------------------------------------------

/// In-process provider used by tests and deployments without a credential.
///
/// `chat` returns a canned valid JSON payload (or errors when `failing`),
/// `embed` hashes tokens into a small fixed-dimension vector so similarity
/// ranking stays deterministic, and `transcribe` returns a fixed marker.
pub struct StubProvider {
    failing: bool,
}

impl StubProvider {
    pub fn new() -> Self {
        Self { failing: false }
    }

    /// A stub that fails every call, exercising the fallback paths.
    pub fn failing() -> Self {
        Self { failing: true }
    }
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::new()
    }
}

const STUB_EMBED_DIM: usize = 16;

fn hash_embed(text: &str) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut vec = vec![0.0_f32; STUB_EMBED_DIM];
    for token in text.split_whitespace() {
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            continue;
        }
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let hash = hasher.finish();
        let idx = (hash as usize) % STUB_EMBED_DIM;
        let sign = if (hash & 1) == 0 { 1.0 } else { -1.0 };
        vec[idx] += sign;
    }

    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vec {
            *value /= norm;
        }
    }
    vec
}

#[async_trait]
impl TextProvider for StubProvider {
    async fn chat(&self, _system_prompt: &str, user_prompt: &str) -> Result<String, ProviderError> {
        if self.failing {
            return Err(ProviderError::Unavailable("stub set to fail".to_string()));
        }

        let variants: Vec<serde_json::Value> = (1..=3)
            .map(|i| {
                serde_json::json!({
                    "text": format!("Variant {i}: {user_prompt}"),
                    "suggestedHashtags": [format!("#stub{i}"), "#copydesk"],
                    "suggestedImagePrompt": "A clean branded visual",
                })
            })
            .collect();
        Ok(serde_json::json!({ "variants": variants }).to_string())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if self.failing {
            return Err(ProviderError::Unavailable("stub set to fail".to_string()));
        }
        Ok(hash_embed(text))
    }

    async fn transcribe(&self, _bytes: &[u8], _mime_type: &str) -> Result<String, ProviderError> {
        if self.failing {
            return Err(ProviderError::Unavailable("stub set to fail".to_string()));
        }
        Ok("[stub transcription]".to_string())
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_honors_retry_after() {
        let policy = RetryPolicy::default();
        let header = reqwest::header::HeaderValue::from_static("2");
        assert_eq!(
            retry_delay(1, &policy, Some(&header)),
            Duration::from_secs(2)
        );
        // Backoff doubles per attempt, capped.
        assert_eq!(retry_delay(1, &policy, None), Duration::from_millis(250));
        assert_eq!(retry_delay(2, &policy, None), Duration::from_millis(500));
        assert_eq!(retry_delay(10, &policy, None), Duration::from_millis(2_000));
    }

    #[tokio::test]
    async fn test_stub_chat_is_valid_contract_json() {
        let provider = StubProvider::new();
        let raw = provider.chat("system", "launch the beta").await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["variants"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_stub_embed_deterministic() {
        let provider = StubProvider::new();
        let a = provider.embed("brand voice guide").await.unwrap();
        let b = provider.embed("brand voice guide").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), STUB_EMBED_DIM);
    }

    #[tokio::test]
    async fn test_failing_stub_errors() {
        let provider = StubProvider::failing();
        assert!(provider.chat("s", "u").await.is_err());
        assert!(provider.embed("x").await.is_err());
    }
}
