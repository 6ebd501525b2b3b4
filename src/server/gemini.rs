//! Gemini-backed text generation for the assistant API service
//!
//! Defines the [`TextGenerator`] trait the HTTP handlers depend on, and its
//! production implementation speaking the Gemini `generateContent` /
//! `streamGenerateContent` endpoints. Tests inject a fake generator instead.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::ProviderConfig;
use crate::error::IdeascopeError;

/// Stream of generated text increments
pub type TextStream =
    Pin<Box<dyn Stream<Item = std::result::Result<String, IdeascopeError>> + Send>>;

/// Text generation backend for the assistant endpoints
///
/// `generate` serves query enhancement; `stream` serves summarization.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce the full completion for `prompt`
    async fn generate(&self, prompt: &str) -> std::result::Result<String, IdeascopeError>;

    /// Open an incremental completion stream for `prompt`
    ///
    /// Chunks arrive in generation order. A mid-generation failure surfaces
    /// as an `Err` item, after which the stream ends.
    async fn stream(&self, prompt: &str) -> std::result::Result<TextStream, IdeascopeError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

impl GenerateRequest {
    fn from_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

/// Concatenated text of the first candidate
fn extract_text(response: &GenerateResponse) -> String {
    response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .map(|p| p.text.as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Payloads of every `data:` field in one SSE event block
fn sse_data_payloads(event_block: &str) -> Vec<String> {
    let mut payloads = Vec::new();
    for line in event_block.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            payloads.push(value.trim().to_string());
        }
        // Other SSE fields (id, event, retry) and comments are ignored.
    }
    payloads
}

/// Generator backed by the Gemini API
pub struct GeminiGenerator {
    client: Client,
    api_base: String,
    model: String,
    enhance_model: String,
    api_key: String,
}

impl GeminiGenerator {
    /// Build a generator from provider settings and the API key
    pub fn new(
        config: &ProviderConfig,
        api_key: String,
    ) -> std::result::Result<Self, IdeascopeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            model: config.model.clone(),
            enhance_model: config
                .enhance_model
                .clone()
                .unwrap_or_else(|| config.model.clone()),
            api_key,
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.api_base, model, method)
    }

    fn map_status(status: reqwest::StatusCode, body: String) -> IdeascopeError {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            IdeascopeError::Config(format!("provider rejected the API key: {status}"))
        } else {
            IdeascopeError::Assistant(format!("provider returned {status}: {body}"))
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, IdeascopeError> {
        let url = self.endpoint(&self.enhance_model, "generateContent");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateRequest::from_prompt(prompt))
            .send()
            .await
            .map_err(|e| IdeascopeError::Assistant(format!("provider request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            IdeascopeError::Assistant(format!("failed to parse provider response: {e}"))
        })?;

        Ok(extract_text(&parsed))
    }

    async fn stream(&self, prompt: &str) -> std::result::Result<TextStream, IdeascopeError> {
        let url = self.endpoint(&self.model, "streamGenerateContent");

        let response = self
            .client
            .post(&url)
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateRequest::from_prompt(prompt))
            .send()
            .await
            .map_err(|e| IdeascopeError::Assistant(format!("provider request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let byte_stream = response.bytes_stream();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            forward_sse_text(byte_stream, tx).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Parse a Gemini SSE body, forwarding each chunk's candidate text
///
/// SSE events are separated by blank lines; every `data:` payload is one
/// `GenerateContentResponse` JSON document. Payloads that do not parse are
/// skipped. A transport error mid-body is forwarded as an `Err` item and
/// terminates the stream.
async fn forward_sse_text(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>>,
    tx: mpsc::Sender<std::result::Result<String, IdeascopeError>>,
) {
    use futures::StreamExt;

    let mut buffer = String::new();

    tokio::pin!(byte_stream);

    while let Some(chunk_result) = byte_stream.next().await {
        let chunk = match chunk_result {
            Ok(c) => c,
            Err(e) => {
                let _ = tx
                    .send(Err(IdeascopeError::Assistant(format!(
                        "provider stream failed: {e}"
                    ))))
                    .await;
                return;
            }
        };

        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buffer.find("\n\n") {
            let event_block = buffer[..pos].to_string();
            buffer = buffer[pos + 2..].to_string();
            if !emit_event_text(&event_block, &tx).await {
                return;
            }
        }
    }

    // Trailing event without a closing blank line.
    if !buffer.is_empty() {
        let _ = emit_event_text(&buffer, &tx).await;
    }
}

/// Forward the candidate text of one SSE event block; false when the
/// receiver is gone
async fn emit_event_text(
    event_block: &str,
    tx: &mpsc::Sender<std::result::Result<String, IdeascopeError>>,
) -> bool {
    for payload in sse_data_payloads(event_block) {
        let parsed: GenerateResponse = match serde_json::from_str(&payload) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("skipping unparseable SSE payload: {}", e);
                continue;
            }
        };
        let text = extract_text(&parsed);
        if text.is_empty() {
            continue;
        }
        if tx.send(Ok(text)).await.is_err() {
            return false;
        }
    }
    true
}
