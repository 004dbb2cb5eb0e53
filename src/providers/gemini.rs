//! Gemini provider implementation using the Generative Language API.
//!
//! Streaming uses `streamGenerateContent` with `alt=sse`: each SSE data line
//! is a complete GenerateContentResponse chunk (no `event:` lines). The final
//! chunk carries a `finishReason` on its candidate.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;

use crate::providers::{ProviderError, QueryProvider, QueryRequest, StreamChunk};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

// ============================================================================
// Generative Language API Types
// ============================================================================

#[derive(Serialize, Debug, Clone)]
struct Part {
    text: String,
}

#[derive(Serialize, Debug)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize, Debug)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize, Debug)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// The request body for generateContent / streamGenerateContent.
#[derive(Serialize, Debug)]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

/// One streamed GenerateContentResponse chunk.
#[derive(Deserialize, Debug)]
struct StreamResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

// ============================================================================
// Translation Layer
// ============================================================================

/// Builds the generateContent body from a query request.
fn build_request(request: &QueryRequest<'_>) -> GenerateRequest {
    let system_instruction = request
        .options
        .system_prompt
        .as_ref()
        .map(|prompt| SystemInstruction {
            parts: vec![Part {
                text: prompt.clone(),
            }],
        });

    GenerateRequest {
        system_instruction,
        contents: vec![Content {
            role: "user",
            parts: vec![Part {
                text: request.prompt.to_string(),
            }],
        }],
        generation_config: GenerationConfig {
            max_output_tokens: request.options.max_tokens,
            temperature: request.options.temperature,
        },
    }
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Google Gemini API provider using streamGenerateContent.
pub struct GeminiProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Creates a new Gemini provider.
    ///
    /// # Arguments
    /// * `api_key` - Gemini API key; queries fail with a config error if absent
    /// * `base_url` - Optional custom base URL (defaults to Google's API)
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl QueryProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn stream_query(
        &self,
        request: QueryRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<(), ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProviderError::Config(
                "no API key for gemini (set GEMINI_API_KEY or [gemini].api_key)".to_string(),
            )
        })?;

        let generate_request = build_request(&request);

        info!("Gemini streamGenerateContent request: model={}", request.model);

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, request.model, api_key
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&generate_request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        debug!("Gemini response status: {}", response.status());

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let err_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            warn!("Gemini API error: {} - {}", status, err_body);
            return Err(ProviderError::Api {
                status,
                message: err_body,
            });
        }

        // Each SSE data line is a standalone JSON chunk
        let mut buffer = String::new();
        let mut total_content_len = 0usize;
        let mut chunk_count = 0usize;
        let mut finished = false;
        let mut response = response;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?
        {
            let s = String::from_utf8_lossy(&chunk);
            buffer.push_str(&s);

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].to_string();
                buffer.drain(..pos + 1);

                let line = line.trim();

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };

                let parsed = match serde_json::from_str::<StreamResponse>(data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        debug!("Skipping unparseable chunk: {} ({})", data, e);
                        continue;
                    }
                };

                for candidate in parsed.candidates {
                    if let Some(content) = candidate.content {
                        for part in content.parts {
                            if part.text.is_empty() {
                                continue;
                            }
                            chunk_count += 1;
                            total_content_len += part.text.len();
                            if sender
                                .send(StreamChunk::Content(part.text))
                                .await
                                .is_err()
                            {
                                warn!("Content chunk send failed: receiver dropped");
                                return Err(ProviderError::ChannelClosed);
                            }
                        }
                    }
                    if let Some(reason) = candidate.finish_reason {
                        debug!("Gemini finish reason: {}", reason);
                        finished = true;
                    }
                }
            }
        }

        info!(
            "Stream ended: {} chunks processed, {} total content bytes",
            chunk_count, total_content_len
        );

        if finished && sender.send(StreamChunk::Completed).await.is_err() {
            warn!("Completed send failed: receiver dropped");
            return Err(ProviderError::ChannelClosed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::QueryOptions;

    #[test]
    fn test_build_request_single_user_turn() {
        let options = QueryOptions::default();
        let request = QueryRequest {
            prompt: "Hello",
            model: DEFAULT_MODEL,
            options: &options,
        };
        let body = build_request(&request);
        assert!(body.system_instruction.is_none());
        assert_eq!(body.contents.len(), 1);
        assert_eq!(body.contents[0].role, "user");
        assert_eq!(body.contents[0].parts[0].text, "Hello");
    }

    #[test]
    fn test_build_request_with_system_prompt() {
        let options = QueryOptions {
            system_prompt: Some("Be brief.".to_string()),
            max_tokens: Some(256),
            ..Default::default()
        };
        let request = QueryRequest {
            prompt: "Hi",
            model: "test-model",
            options: &options,
        };
        let json = serde_json::to_string(&build_request(&request)).unwrap();
        assert!(json.contains(r#""system_instruction""#));
        assert!(json.contains("Be brief."));
        assert!(json.contains(r#""max_output_tokens":256"#));
    }

    #[test]
    fn test_request_serialization_skips_empty_generation_config_fields() {
        let options = QueryOptions::default();
        let request = QueryRequest {
            prompt: "Hi",
            model: "test-model",
            options: &options,
        };
        let json = serde_json::to_string(&build_request(&request)).unwrap();
        assert!(!json.contains("max_output_tokens"));
        assert!(!json.contains("temperature"));
    }

    #[test]
    fn test_stream_response_parses_text_parts() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"Hello"}],"role":"model"}}]}"#;
        let parsed: StreamResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.candidates.len(), 1);
        let content = parsed.candidates[0].content.as_ref().unwrap();
        assert_eq!(content.parts[0].text, "Hello");
    }

    #[test]
    fn test_stream_response_parses_finish_reason() {
        let json = r#"{"candidates":[{"finishReason":"STOP"}]}"#;
        let parsed: StreamResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.candidates[0].finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_stream_response_tolerates_empty_chunk() {
        let parsed: StreamResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.candidates.is_empty());
    }
}
