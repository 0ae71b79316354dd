//! Retry logic with exponential backoff
//!
//! Used around collaborator fetches and model completions. Only errors that
//! report themselves as retryable are attempted again.

use crate::config::ResearchConfig;
use crate::error::CollaboratorError;
use research_llm::LLMError;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Errors that know whether another attempt may succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for CollaboratorError {
    fn is_retryable(&self) -> bool {
        CollaboratorError::is_retryable(self)
    }
}

impl Retryable for LLMError {
    fn is_retryable(&self) -> bool {
        LLMError::is_retryable(self)
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier (typically 2.0 for exponential backoff)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Policy derived from the engine configuration
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            initial_backoff: config.retry_backoff_base,
            max_backoff: config.retry_backoff(config.max_retries.saturating_sub(1)),
            backoff_multiplier: 2.0,
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Create a policy with fast retries (for testing)
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }

    /// Backoff before the given retry; zero before the first attempt
    fn backoff_duration(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);

        Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
    }

    /// Execute an async operation with retry logic
    ///
    /// Returns the first success, the first non-retryable error, or the last
    /// error once all attempts are spent.
    pub async fn execute<F, Fut, T, E>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Debug,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            debug!(operation = operation_name, attempt = attempt + 1, attempts, "Attempting operation");

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(operation = operation_name, retries = attempt, "Operation succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(e) if !e.is_retryable() => {
                    debug!(operation = operation_name, error = ?e, "Operation failed with non-retryable error");
                    return Err(e);
                }
                Err(e) if attempt + 1 >= attempts => {
                    warn!(operation = operation_name, attempts, error = ?e, "Operation failed after all attempts");
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    let backoff = self.backoff_duration(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        attempts,
                        error = ?e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Operation failed, retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unreachable_error() -> CollaboratorError {
        CollaboratorError::Unreachable {
            source_name: "test".to_string(),
            message: "connection reset".to_string(),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
        assert_eq!(policy.max_backoff, Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff_duration(0), Duration::ZERO);
        assert_eq!(policy.backoff_duration(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_duration(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_duration(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_capped_at_max() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        assert_eq!(policy.backoff_duration(10), Duration::from_secs(5));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from_config(&ResearchConfig::default());
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(500));
        assert_eq!(policy.max_backoff, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = RetryPolicy::fast()
            .execute("flaky", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(unreachable_error())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = RetryPolicy::fast()
            .execute("down", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(unreachable_error())
                }
            })
            .await;

        assert_eq!(result, Err(unreachable_error()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = RetryPolicy::fast()
            .execute("bad", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(CollaboratorError::NotConfigured("news".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
