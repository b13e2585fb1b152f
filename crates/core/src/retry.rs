//! Retry policy shared by the model transport and the change tracker.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// No delay between attempts. For compare-and-set loops and tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = max;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-indexed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// attempts run out. Returns the last error on exhaustion.
    pub async fn run<T, E, F, Fut>(&self, op: F, is_retryable: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_with_hint(op, is_retryable, |_| None).await
    }

    /// [`run`](Self::run), waiting at least as long as `retry_after`
    /// reports for the failed attempt.
    pub async fn run_with_hint<T, E, F, Fut>(
        &self,
        mut op: F,
        is_retryable: impl Fn(&E) -> bool,
        retry_after: impl Fn(&E) -> Option<Duration>,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    let backoff = self.backoff(attempt);
                    let delay = retry_after(&e).map_or(backoff, |hint| hint.max(backoff));
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Retrying");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, Duration::from_millis(500)).with_max_backoff(Duration::from_secs(8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100))
            .with_max_backoff(Duration::from_millis(350));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
    }

    #[test]
    fn zero_attempts_clamps_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = RetryPolicy::immediate(3)
            .run(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { if attempt < 3 { Err("flaky".to_string()) } else { Ok(attempt) } }
                },
                |_| true,
            )
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_hint_extends_short_backoff() {
        let start = tokio::time::Instant::now();
        let result: Result<(), String> = RetryPolicy::new(2, Duration::from_millis(100))
            .run_with_hint(
                |attempt| async move { if attempt < 2 { Err("slow down".to_string()) } else { Ok(()) } },
                |_| true,
                |_| Some(Duration::from_secs(3)),
            )
            .await;
        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = RetryPolicy::immediate(5)
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("fatal".to_string()) }
                },
                |_| false,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
