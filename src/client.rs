//! # Unified client
//!
//! Holds the provider registry and implements the dispatch operations:
//! single-provider query/stream, random selection, parallel fan-out, and
//! health checks. Retryable failures (network errors, HTTP 429/5xx) are
//! re-attempted with exponential backoff; a live stream is never retried
//! once the first chunk reached the caller.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, warn};
use tokio::sync::mpsc::{self, Sender};

use crate::core::config::{ResolvedConfig, RetryPolicy};
use crate::error::ClaifError;
use crate::providers::{
    ClaudeProvider, CodexProvider, GeminiProvider, Message, ProviderError, ProviderKind,
    QueryOptions, QueryProvider, QueryRequest, StreamChunk,
};

/// One registered provider: the client implementation plus its configured
/// default model and timeout.
pub struct ProviderRegistration {
    pub kind: ProviderKind,
    pub provider: Arc<dyn QueryProvider>,
    pub model: String,
    pub timeout: Duration,
}

/// Unified client for all providers.
pub struct ClaifClient {
    providers: Vec<ProviderRegistration>,
    retry: RetryPolicy,
}

impl ClaifClient {
    /// Creates a client from an explicit registry. Mostly useful for tests
    /// and embedders; CLI code goes through [`ClaifClient::from_config`].
    pub fn new(providers: Vec<ProviderRegistration>, retry: RetryPolicy) -> Self {
        Self { providers, retry }
    }

    /// Builds the registry from resolved configuration. Disabled providers
    /// are not registered.
    pub fn from_config(config: &ResolvedConfig) -> Self {
        let mut providers = Vec::new();
        for kind in ProviderKind::ALL {
            let settings = config.provider(kind);
            if !settings.enabled {
                debug!("Provider {} disabled, skipping registration", kind);
                continue;
            }
            let api_key = settings.api_key.clone();
            let base_url = Some(settings.base_url.clone());
            let provider: Arc<dyn QueryProvider> = match kind {
                ProviderKind::Claude => Arc::new(ClaudeProvider::new(api_key, base_url)),
                ProviderKind::Gemini => Arc::new(GeminiProvider::new(api_key, base_url)),
                ProviderKind::Codex => Arc::new(CodexProvider::new(api_key, base_url)),
            };
            providers.push(ProviderRegistration {
                kind,
                provider,
                model: settings.model.clone(),
                timeout: settings.timeout,
            });
        }
        Self {
            providers,
            retry: config.retry.clone(),
        }
    }

    /// Registered provider kinds, in registry order.
    pub fn list_providers(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|r| r.kind).collect()
    }

    fn get(&self, kind: ProviderKind) -> Result<&ProviderRegistration, ClaifError> {
        self.providers
            .iter()
            .find(|r| r.kind == kind)
            .ok_or(ClaifError::ProviderDisabled(kind))
    }

    /// Query the given provider and collect the response into messages.
    /// Retryable failures are re-attempted per the retry policy.
    pub async fn query(
        &self,
        kind: ProviderKind,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<Vec<Message>, ClaifError> {
        let registration = self.get(kind)?;
        debug!("Using provider: {}", kind);

        let mut delay = self.retry.initial_delay;
        let mut attempt = 1u32;
        loop {
            match self.query_once(registration, prompt, options).await {
                Ok(messages) => return Ok(messages),
                Err(e) if e.is_retryable() && attempt < self.retry.count => {
                    warn!(
                        "{} query failed (attempt {}/{}): {}, retrying in {:?}",
                        kind, attempt, self.retry.count, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f64(self.retry.backoff);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(ClaifError::Provider {
                        provider: kind,
                        source: e,
                    });
                }
            }
        }
    }

    /// One attempt: run the provider stream and the collector concurrently.
    async fn query_once(
        &self,
        registration: &ProviderRegistration,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<Vec<Message>, ProviderError> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| registration.model.clone());
        let timeout = options.timeout.unwrap_or(registration.timeout);
        let request = QueryRequest {
            prompt,
            model: &model,
            options,
        };

        let (tx, mut rx) = mpsc::channel::<StreamChunk>(100);
        let send = tokio::time::timeout(timeout, registration.provider.stream_query(request, tx));
        let recv = async {
            let mut content = String::new();
            while let Some(chunk) = rx.recv().await {
                match chunk {
                    StreamChunk::Content(text) => content.push_str(&text),
                    StreamChunk::Thinking(_) | StreamChunk::Completed => {}
                }
            }
            content
        };

        let (send_result, content) = tokio::join!(send, recv);
        match send_result {
            Err(_) => Err(ProviderError::Network(format!(
                "request timed out after {}s",
                timeout.as_secs()
            ))),
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) if content.is_empty() => Ok(Vec::new()),
            Ok(Ok(())) => Ok(vec![Message::assistant(content)]),
        }
    }

    /// Query the given provider, forwarding chunks to `sender` as they
    /// arrive. Retries only while nothing has been delivered yet; a broken
    /// stream after the first chunk surfaces immediately.
    pub async fn stream(
        &self,
        kind: ProviderKind,
        prompt: &str,
        options: &QueryOptions,
        sender: Sender<StreamChunk>,
    ) -> Result<(), ClaifError> {
        let registration = self.get(kind)?;
        debug!("Streaming from provider: {}", kind);

        let mut delay = self.retry.initial_delay;
        let mut attempt = 1u32;
        loop {
            let model = options
                .model
                .clone()
                .unwrap_or_else(|| registration.model.clone());
            let timeout = options.timeout.unwrap_or(registration.timeout);
            let request = QueryRequest {
                prompt,
                model: &model,
                options,
            };

            let (tx, mut rx) = mpsc::channel::<StreamChunk>(100);
            let send =
                tokio::time::timeout(timeout, registration.provider.stream_query(request, tx));
            let forward = async {
                let mut delivered = false;
                while let Some(chunk) = rx.recv().await {
                    if matches!(chunk, StreamChunk::Content(_) | StreamChunk::Thinking(_)) {
                        delivered = true;
                    }
                    if sender.send(chunk).await.is_err() {
                        break;
                    }
                }
                delivered
            };

            let (send_result, delivered) = tokio::join!(send, forward);
            let result = match send_result {
                Err(_) => Err(ProviderError::Network(format!(
                    "request timed out after {}s",
                    timeout.as_secs()
                ))),
                Ok(r) => r,
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && !delivered && attempt < self.retry.count => {
                    warn!(
                        "{} stream failed (attempt {}/{}): {}, retrying in {:?}",
                        kind, attempt, self.retry.count, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f64(self.retry.backoff);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(ClaifError::Provider {
                        provider: kind,
                        source: e,
                    });
                }
            }
        }
    }

    /// Query a uniformly random registered provider. Returns which provider
    /// was selected alongside the messages.
    pub async fn query_random(
        &self,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<(ProviderKind, Vec<Message>), ClaifError> {
        use rand::seq::SliceRandom;

        let kinds = self.list_providers();
        let kind = *kinds
            .choose(&mut rand::thread_rng())
            .ok_or(ClaifError::NoProviders)?;
        debug!("Randomly selected provider: {}", kind);

        let messages = self.query(kind, prompt, options).await?;
        Ok((kind, messages))
    }

    /// Query every registered provider concurrently. A provider failure
    /// yields an error slot for that provider, not a global failure.
    pub async fn query_all(
        &self,
        prompt: &str,
        options: &QueryOptions,
    ) -> Vec<(ProviderKind, Result<Vec<Message>, ClaifError>)> {
        let futures = self.providers.iter().map(|registration| {
            let kind = registration.kind;
            async move { (kind, self.query(kind, prompt, options).await) }
        });
        join_all(futures).await
    }

    /// Probe each registered provider with a 1-token query and a short
    /// timeout. Returns per-provider health.
    pub async fn health_check(&self) -> Vec<(ProviderKind, bool)> {
        let options = QueryOptions {
            max_tokens: Some(1),
            timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let futures = self.providers.iter().map(|registration| {
            let options = &options;
            async move {
                let healthy = self
                    .query_once(registration, "Hello", options)
                    .await
                    .map(|messages| !messages.is_empty())
                    .unwrap_or(false);
                (registration.kind, healthy)
            }
        });
        join_all(futures).await
    }
}
