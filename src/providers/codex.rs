//! Codex provider implementation using the OpenAI Responses API.
//!
//! SSE events of interest:
//! - `response.output_text.delta` — answer text
//! - `response.reasoning_text.delta` / `response.reasoning_summary_text.delta` — reasoning
//! - `response.completed` — end of response

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;

use crate::providers::{ProviderError, QueryProvider, QueryRequest, StreamChunk};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "o4-mini";

// ============================================================================
// Responses API Types
// ============================================================================

/// Role in an input message (OpenAI terminology)
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "lowercase")]
enum Role {
    System,
    User,
}

#[derive(Serialize, Debug, Clone)]
struct InputMessage {
    role: Role,
    content: String,
}

/// The request body for the Responses API
#[derive(Serialize, Debug)]
struct ResponsesRequest {
    model: String,
    input: Vec<InputMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

/// Generic SSE event wrapper to extract the type field.
/// The event type is embedded in the JSON as well as the SSE `event:` line.
#[derive(Deserialize, Debug)]
struct SseEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: String,
}

// ============================================================================
// Translation Layer
// ============================================================================

/// Builds the Responses API input array: optional system message, then the prompt.
fn build_input(request: &QueryRequest<'_>) -> Vec<InputMessage> {
    let mut input = Vec::new();
    if let Some(system) = &request.options.system_prompt {
        input.push(InputMessage {
            role: Role::System,
            content: system.clone(),
        });
    }
    input.push(InputMessage {
        role: Role::User,
        content: request.prompt.to_string(),
    });
    input
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// OpenAI API provider using the Responses API.
pub struct CodexProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl CodexProvider {
    /// Creates a new Codex provider.
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key; queries fail with a config error if absent
    /// * `base_url` - Optional custom base URL (defaults to OpenAI's API)
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
        request: &ResponsesRequest,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        debug!("Codex response status: {}", response.status());

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let err_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            warn!("Codex API error: {} - {}", status, err_body);
            return Err(ProviderError::Api {
                status,
                message: err_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl QueryProvider for CodexProvider {
    fn name(&self) -> &str {
        "codex"
    }

    async fn stream_query(
        &self,
        request: QueryRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<(), ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProviderError::Config(
                "no API key for codex (set OPENAI_API_KEY or [codex].api_key)".to_string(),
            )
        })?;

        let responses_request = ResponsesRequest {
            model: request.model.to_string(),
            input: build_input(&request),
            stream: Some(true),
            temperature: request.options.temperature,
            max_output_tokens: request.options.max_tokens,
        };

        info!(
            "Codex Responses API request: model={}, input_count={}",
            request.model,
            responses_request.input.len(),
        );

        let response = self.send_request(api_key, &responses_request).await?;

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

                // Parse SSE event type
                if let Some(event_type) = line.strip_prefix("event: ") {
                    debug!("SSE event type: {}", event_type);
                    current_event_type = Some(event_type.to_string());
                    continue;
                }

                // Parse SSE data
                if let Some(data) = line.strip_prefix("data: ") {
                    // Skip [DONE] marker
                    if data == "[DONE]" {
                        debug!("Received [DONE] marker");
                        continue;
                    }

                    // Fall back to the embedded type field when no event: line was seen
                    let event_type = current_event_type.clone().or_else(|| {
                        serde_json::from_str::<SseEvent>(data)
                            .ok()
                            .map(|e| e.event_type)
                    });

                    match event_type.as_deref() {
                        Some("response.output_text.delta") => {
                            if let Ok(event) = serde_json::from_str::<SseEvent>(data)
                                && !event.delta.is_empty()
                            {
                                chunk_count += 1;
                                total_content_len += event.delta.len();
                                if sender
                                    .send(StreamChunk::Content(event.delta))
                                    .await
                                    .is_err()
                                {
                                    warn!("Content chunk send failed: receiver dropped");
                                    return Err(ProviderError::ChannelClosed);
                                }
                            }
                        }
                        Some("response.reasoning_text.delta")
                        | Some("response.reasoning_summary_text.delta") => {
                            if let Ok(event) = serde_json::from_str::<SseEvent>(data)
                                && !event.delta.is_empty()
                            {
                                chunk_count += 1;
                                if sender
                                    .send(StreamChunk::Thinking(event.delta))
                                    .await
                                    .is_err()
                                {
                                    warn!("Thinking chunk send failed: receiver dropped");
                                    return Err(ProviderError::ChannelClosed);
                                }
                            }
                        }
                        Some("response.completed") => {
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
                        Some(other) => {
                            // Ignore other event types (response.created, response.in_progress, etc.)
                            debug!("Ignoring event type '{}': {} bytes", other, data.len());
                        }
                        None => {
                            debug!("Could not parse event type from data: {}", data);
                        }
                    }

                    // Reset event type after processing data
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
