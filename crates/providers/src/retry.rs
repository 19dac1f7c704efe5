//! Provider retry — re-issues a request after transient failures.
//!
//! Rate limits, timeouts, network errors and 5xx/529 responses are retried
//! with exponential backoff; everything else is returned immediately.

use async_trait::async_trait;
use calsync_core::error::ProviderError;
use calsync_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A provider that wraps another and retries transient failures.
pub struct RetryProvider {
    inner: Arc<dyn calsync_core::Provider>,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn calsync_core::Provider>) -> Self {
        Self {
            inner,
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before the given retry (0-based), or `None` if the error is final.
    fn backoff(&self, error: &ProviderError, attempt: u32) -> Option<Duration> {
        let exponential = self.base_delay * 2u32.saturating_pow(attempt);
        match error {
            ProviderError::RateLimited { retry_after_secs } => {
                Some(exponential.max(Duration::from_secs(*retry_after_secs)))
            }
            ProviderError::Timeout(_) | ProviderError::Network(_) => Some(exponential),
            ProviderError::ApiError { status_code, .. } if *status_code >= 500 => Some(exponential),
            _ => None,
        }
    }
}

#[async_trait]
impl calsync_core::Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let delay = match self.backoff(&e, attempt) {
                        Some(delay) if attempt < self.max_retries => delay,
                        _ => return Err(e),
                    };
                    warn!(
                        provider = %self.inner.name(),
                        error = %e,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying provider request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
