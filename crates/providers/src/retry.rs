//! Bounded-timeout retry wrapper.
//!
//! Every generation call is bounded by a per-attempt timeout. Transient
//! failures (network, timeout, rate limit, 5xx) are retried a fixed number of
//! times; permanent ones surface immediately.

use async_trait::async_trait;
use polibrief_core::error::ProviderError;
use polibrief_core::provider::{GenerationRequest, Provider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Wraps a provider with a per-attempt timeout and bounded retries.
pub struct RetryingProvider {
    inner: Arc<dyn Provider>,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl RetryingProvider {
    /// Wrap `inner` with the default 120s timeout and one retry.
    pub fn new(inner: Arc<dyn Provider>) -> Self {
        Self {
            inner,
            timeout: Duration::from_secs(120),
            max_retries: 1,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn attempt(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        match tokio::time::timeout(self.timeout, self.inner.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "Provider '{}' timed out after {}s",
                self.inner.name(),
                self.timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        let total = self.max_retries + 1;
        let mut attempt = 1;
        loop {
            match self.attempt(request.clone()).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < total => {
                    warn!(
                        provider = %self.inner.name(),
                        attempt,
                        total,
                        error = %e,
                        "Generation failed, retrying"
                    );
                    let delay = match &e {
                        ProviderError::RateLimited { retry_after_secs } => {
                            Duration::from_secs(*retry_after_secs).min(self.timeout)
                        }
                        _ => self.backoff,
                    };
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    info!(provider = %self.inner.name(), attempt, "Retrying generation");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}
