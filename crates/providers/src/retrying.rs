//! Bounded retry around a single provider.
//!
//! Each attempt runs under its own timeout. Retryable failures (rate
//! limits, timeouts, dropped connections, 5xx) are retried under the
//! injected [`RetryPolicy`]; anything else fails on the first attempt.
//! A rate limit's retry-after is honored when it exceeds the backoff.

use appforge_core::error::ProviderError;
use appforge_core::provider::*;
use appforge_core::retry::RetryPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A provider that retries another provider's failed turns.
pub struct RetryingProvider {
    inner: Arc<dyn appforge_core::Provider>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn appforge_core::Provider>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            attempt_timeout: Duration::from_secs(300),
        }
    }

    /// Timeout applied to each attempt separately.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl appforge_core::Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send_turn(&self, request: TurnRequest) -> std::result::Result<AssistantTurn, ProviderError> {
        let provider_name = self.inner.name().to_string();
        let max_attempts = self.policy.max_attempts;

        self.policy
            .run_with_hint(
                |attempt| {
                    let request = request.clone();
                    let provider_name = provider_name.clone();
                    async move {
                        let result =
                            match tokio::time::timeout(self.attempt_timeout, self.inner.send_turn(request)).await {
                                Ok(result) => result,
                                Err(_) => Err(ProviderError::Timeout(format!(
                                    "Provider '{}' timed out after {}s",
                                    provider_name,
                                    self.attempt_timeout.as_secs()
                                ))),
                            };
                        if let Err(e) = &result {
                            warn!(
                                provider = %provider_name,
                                attempt,
                                max_attempts,
                                retryable = e.is_retryable(),
                                error = %e,
                                "Model turn failed"
                            );
                        }
                        result
                    }
                },
                ProviderError::is_retryable,
                ProviderError::retry_after,
            )
            .await
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}
