//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;

use crate::providers::{ProviderError, QueryProvider, QueryRequest, StreamChunk};

/// A no-op provider for tests that don't need chunks at all.
pub struct NoopProvider;

#[async_trait]
impl QueryProvider for NoopProvider {
    fn name(&self) -> &str {
        "noop"
    }

    async fn stream_query(
        &self,
        _request: QueryRequest<'_>,
        _sender: Sender<StreamChunk>,
    ) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Sends a fixed reply as one content chunk, then completes.
pub struct ScriptedProvider {
    reply: String,
}

impl ScriptedProvider {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl QueryProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_query(
        &self,
        _request: QueryRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<(), ProviderError> {
        sender
            .send(StreamChunk::Content(self.reply.clone()))
            .await
            .map_err(|_| ProviderError::ChannelClosed)?;
        sender
            .send(StreamChunk::Completed)
            .await
            .map_err(|_| ProviderError::ChannelClosed)?;
        Ok(())
    }
}

/// Always fails with the given error, counting attempts.
pub struct FailingProvider {
    error: fn() -> ProviderError,
    attempts: AtomicU32,
}

impl FailingProvider {
    pub fn new(error: fn() -> ProviderError) -> Self {
        Self {
            error,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn stream_query(
        &self,
        _request: QueryRequest<'_>,
        _sender: Sender<StreamChunk>,
    ) -> Result<(), ProviderError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err((self.error)())
    }
}

/// Fails with a network error for the first `failures` attempts, then
/// behaves like [`ScriptedProvider`].
pub struct FlakyProvider {
    remaining_failures: AtomicU32,
    attempts: AtomicU32,
    reply: String,
}

impl FlakyProvider {
    pub fn new(failures: u32, reply: &str) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
            reply: reply.to_string(),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryProvider for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn stream_query(
        &self,
        _request: QueryRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<(), ProviderError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ProviderError::Network("flaky failure".to_string()));
        }
        sender
            .send(StreamChunk::Content(self.reply.clone()))
            .await
            .map_err(|_| ProviderError::ChannelClosed)?;
        sender
            .send(StreamChunk::Completed)
            .await
            .map_err(|_| ProviderError::ChannelClosed)?;
        Ok(())
    }
}

/// Delivers one content chunk, then fails with a (nominally retryable)
/// network error. Used to verify streams are not retried mid-flight.
pub struct DeliverThenFailProvider {
    reply: String,
    attempts: AtomicU32,
}

impl DeliverThenFailProvider {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryProvider for DeliverThenFailProvider {
    fn name(&self) -> &str {
        "deliver-then-fail"
    }

    async fn stream_query(
        &self,
        _request: QueryRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<(), ProviderError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        sender
            .send(StreamChunk::Content(self.reply.clone()))
            .await
            .map_err(|_| ProviderError::ChannelClosed)?;
        Err(ProviderError::Network("connection reset".to_string()))
    }
}

/// Sleeps for the given duration before completing. Used with paused-time
/// tests to exercise the client's timeout handling.
pub struct SlowProvider {
    delay: Duration,
}

impl SlowProvider {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl QueryProvider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    async fn stream_query(
        &self,
        _request: QueryRequest<'_>,
        sender: Sender<StreamChunk>,
    ) -> Result<(), ProviderError> {
        tokio::time::sleep(self.delay).await;
        sender
            .send(StreamChunk::Completed)
            .await
            .map_err(|_| ProviderError::ChannelClosed)?;
        Ok(())
    }
}
