use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;

use super::types::{QueryOptions, StreamChunk};

/// Errors that can occur during provider operations.
/// Variants carry enough info to determine retryability.
#[derive(Debug)]
pub enum ProviderError {
    /// Provider misconfigured (missing API key, bad URL). Not retryable.
    Config(String),
    /// Network-level failure (timeout, DNS, connection refused). Retryable.
    Network(String),
    /// API returned an error response. Retryable if status >= 500 or 429.
    Api { status: u16, message: String },
    /// Failed to parse the provider's response. Not retryable.
    Parse(String),
    /// The mpsc channel was closed (caller dropped the receiver). Not retryable.
    ChannelClosed,
}

impl ProviderError {
    /// Whether the client's retry loop may re-attempt the query.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Network(_) => true,
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Config(_) | ProviderError::Parse(_) | ProviderError::ChannelClosed => {
                false
            }
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Config(msg) => write!(f, "config error: {msg}"),
            ProviderError::Network(msg) => write!(f, "network error: {msg}"),
            ProviderError::Api { status, message } => {
                write!(f, "API error (HTTP {status}): {message}")
            }
            ProviderError::Parse(msg) => write!(f, "parse error: {msg}"),
            ProviderError::ChannelClosed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Everything a provider needs to fulfill a query.
pub struct QueryRequest<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    pub options: &'a QueryOptions,
}

#[async_trait]
pub trait QueryProvider: Send + Sync {
    /// Returns the name of the provider.
    fn name(&self) -> &str;

    /// Streams a response for the given request, sending chunks to the
    /// provided channel. Sends `StreamChunk::Completed` when the backend
    /// signals the end of the response.
    async fn stream_query(
        &self,
        request: QueryRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<(), ProviderError>;
}
