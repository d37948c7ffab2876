//! Retry with exponential backoff for transient embedding failures.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::Result;

/// Retry policy applied at the embedding boundary.
///
/// Only errors for which [`VaultError::is_retryable`](crate::VaultError::is_retryable)
/// holds are retried. The delay doubles on every attempt: with the defaults
/// an operation is tried, retried once after 200 ms, and then abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 1, initial_backoff: Duration::from_millis(200) }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self { max_retries, initial_backoff }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self { max_retries: 0, initial_backoff: Duration::ZERO }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.initial_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `operation`, retrying retryable failures according to this policy.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation = operation_name, retries = attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let backoff = self.backoff_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 0 {
                        warn!(operation = operation_name, attempts = attempt + 1, error = %err, "giving up");
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::VaultError;

    fn unavailable() -> VaultError {
        VaultError::EmbeddingUnavailable { provider: "test".into(), message: "down".into() }
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(200));
        assert_eq!(policy.backoff_for(0), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failure_once_after_backoff() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = RetryPolicy::default()
            .execute("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 { Err(unavailable()) } else { Ok(7) }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::default()
            .execute("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            })
            .await;

        assert!(matches!(result, Err(VaultError::EmbeddingUnavailable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::default()
            .execute("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(VaultError::Chunking("bad input".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
