//! Claude provider implementation using the Anthropic Messages API.
//!
//! Streaming uses SSE events:
//! - `content_block_delta` carries `text_delta` / `thinking_delta` payloads
//! - `message_stop` marks the end of the response
//! - `error` carries an API-level failure embedded in the stream

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;

use crate::providers::{ProviderError, QueryProvider, QueryRequest, StreamChunk};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// The Messages API requires max_tokens; used when the caller doesn't set one.
const DEFAULT_MAX_TOKENS: u32 = 4096;
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ============================================================================
// Messages API Types
// ============================================================================

#[derive(Serialize, Debug, Clone)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

/// The request body for the Messages API.
#[derive(Serialize, Debug)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

/// Delta payload inside a `content_block_delta` event.
#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum BlockDelta {
    #[serde(rename = "text_delta")]
    Text { text: String },
    #[serde(rename = "thinking_delta")]
    Thinking { thinking: String },
    /// Other delta kinds (signatures, tool input) are ignored.
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct ContentBlockDeltaEvent {
    delta: BlockDelta,
}

/// In-stream error event (`event: error`).
#[derive(Deserialize, Debug)]
struct ErrorEvent {
    error: ErrorBody,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

// ============================================================================
// Translation Layer
// ============================================================================

/// Builds the Messages API body from a query request.
fn build_request(request: &QueryRequest<'_>) -> MessagesRequest {
    MessagesRequest {
        model: request.model.to_string(),
        max_tokens: request.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages: vec![ApiMessage {
            role: "user",
            content: request.prompt.to_string(),
        }],
        system: request.options.system_prompt.clone(),
        temperature: request.options.temperature,
        stream: true,
    }
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Anthropic API provider using the Messages API.
pub struct ClaudeProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl ClaudeProvider {
    /// Creates a new Claude provider.
    ///
    /// # Arguments
    /// * `api_key` - Anthropic API key; queries fail with a config error if absent
    /// * `base_url` - Optional custom base URL (defaults to Anthropic's API)
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: reqwest::Client::new(),
        }
    }

    async fn send_request(
        &self,
        api_key: &str,
        request: &MessagesRequest,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        debug!("Claude response status: {}", response.status());

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let err_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            warn!("Claude API error: {} - {}", status, err_body);
            return Err(ProviderError::Api {
                status,
                message: err_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl QueryProvider for ClaudeProvider {
    fn name(&self) -> &str {
        "claude"
    }

    async fn stream_query(
        &self,
        request: QueryRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<(), ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProviderError::Config(
                "no API key for claude (set ANTHROPIC_API_KEY or [claude].api_key)".to_string(),
            )
        })?;

        let messages_request = build_request(&request);

        info!(
            "Claude Messages API request: model={}, max_tokens={}",
            messages_request.model, messages_request.max_tokens,
        );

        let response = self.send_request(api_key, &messages_request).await?;

        // Process the SSE stream with typed events
        let mut buffer = String::new();
        let mut current_event_type: Option<String> = None;
        let mut total_content_len = 0usize;
        let mut chunk_count = 0usize;
        let mut response = response;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?
        {
            let s = String::from_utf8_lossy(&chunk);
            buffer.push_str(&s);

            // Process complete lines from buffer
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].to_string();
                buffer.drain(..pos + 1);

                let line = line.trim();

                if let Some(event_type) = line.strip_prefix("event: ") {
                    debug!("SSE event type: {}", event_type);
                    current_event_type = Some(event_type.to_string());
                    continue;
                }

                if let Some(data) = line.strip_prefix("data: ") {
                    match current_event_type.as_deref() {
                        Some("content_block_delta") => {
                            if let Ok(event) = serde_json::from_str::<ContentBlockDeltaEvent>(data)
                            {
                                let outgoing = match event.delta {
                                    BlockDelta::Text { text } if !text.is_empty() => {
                                        total_content_len += text.len();
                                        Some(StreamChunk::Content(text))
                                    }
                                    BlockDelta::Thinking { thinking } if !thinking.is_empty() => {
                                        Some(StreamChunk::Thinking(thinking))
                                    }
                                    _ => None,
                                };
                                if let Some(outgoing) = outgoing {
                                    chunk_count += 1;
                                    if sender.send(outgoing).await.is_err() {
                                        warn!("chunk send failed: receiver dropped");
                                        return Err(ProviderError::ChannelClosed);
                                    }
                                }
                            }
                        }
                        Some("message_stop") => {
                            info!(
                                "Stream complete: {} chunks, {} content bytes",
                                chunk_count, total_content_len
                            );
                            if sender.send(StreamChunk::Completed).await.is_err() {
                                warn!("Completed send failed: receiver dropped");
                                return Err(ProviderError::ChannelClosed);
                            }
                            return Ok(());
                        }
                        Some("error") => {
                            let message = serde_json::from_str::<ErrorEvent>(data)
                                .map(|e| e.error.message)
                                .unwrap_or_else(|_| data.to_string());
                            warn!("Claude in-stream error: {}", message);
                            return Err(ProviderError::Api {
                                status: 500,
                                message,
                            });
                        }
                        Some(other) => {
                            // message_start, content_block_start, ping, etc.
                            debug!("Ignoring event type '{}': {} bytes", other, data.len());
                        }
                        None => {
                            debug!("Could not determine event type for data: {}", data);
                        }
                    }

                    current_event_type = None;
                }
            }
        }

        info!(
            "Stream ended: {} chunks processed, {} total content bytes",
            chunk_count, total_content_len
        );
        Ok(())
    }
}
