//! Bounded retry with capped exponential backoff for collaborator calls.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 100, max_delay_ms: 2_000 }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttemptError<E> {
    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
    #[error("{0}")]
    Failed(E),
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, base_delay_ms: 0, max_delay_ms: 0 }
    }

    /// Policy for `retries` additional attempts after the first.
    pub fn with_retries(retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            base_delay_ms,
            max_delay_ms: Self::default().max_delay_ms.max(base_delay_ms),
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Runs `attempt_fn` until it succeeds or the attempts are used up. Each
    /// attempt is bounded by `per_attempt`; the last error is returned.
    pub async fn run_bounded<T, E, F, Fut>(
        &self,
        operation: &str,
        per_attempt: Duration,
        mut attempt_fn: F,
    ) -> Result<T, AttemptError<E>>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let error = match tokio::time::timeout(per_attempt, attempt_fn(attempt)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => AttemptError::Failed(error),
                Err(_) => AttemptError::TimedOut(per_attempt),
            };

            attempt += 1;
            warn!(
                event_name = "retry.attempt_failed",
                operation,
                attempt,
                max_attempts,
                error = %error,
                "bounded operation attempt failed"
            );
            if attempt >= max_attempts {
                return Err(error);
            }
            tokio::time::sleep(self.backoff(attempt - 1)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::{AttemptError, RetryPolicy};

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy { max_attempts: 5, base_delay_ms: 100, max_delay_ms: 350 };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_configured_attempt_count() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy { max_attempts: 3, base_delay_ms: 10, max_delay_ms: 50 };

        let result: Result<(), AttemptError<String>> = policy
            .run_bounded("test.always_fails", Duration::from_secs(1), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".to_string()) }
            })
            .await;

        assert_eq!(result, Err(AttemptError::Failed("boom".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let policy = RetryPolicy::with_retries(2, 10);

        let result = policy
            .run_bounded("test.flaky", Duration::from_secs(1), |attempt| async move {
                if attempt == 0 {
                    Err("transient")
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result, Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out() {
        let policy = RetryPolicy::no_retry();

        let result: Result<u32, AttemptError<String>> = policy
            .run_bounded("test.slow", Duration::from_millis(50), |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(7)
            })
            .await;

        assert_eq!(result, Err(AttemptError::TimedOut(Duration::from_millis(50))));
    }
}
