use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ProviderKind;

/// Role of a message in a query transcript.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One message of a transcript. Providers stream text chunks; the client
/// assembles them into assistant messages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Message {
        Message {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Message {
        Message {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-query knobs. Everything is optional; a provider falls back to its
/// configured or built-in defaults for anything unset.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
    pub timeout: Option<Duration>,
}

/// Represents a chunk of streamed content from a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Content(String),
    Thinking(String),
    /// The provider signalled the end of the response.
    Completed,
}

/// Timing and attribution for a completed query, printed on `--show-metrics`.
#[derive(Debug, Clone)]
pub struct ResponseMetrics {
    pub duration: Duration,
    pub provider: ProviderKind,
    pub model: String,
}
