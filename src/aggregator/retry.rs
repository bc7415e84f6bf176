//! Retry logic with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::{PriceWatchError, Result};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Retry policy for transient upstream failures.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute an operation, retrying retryable errors with backoff.
    ///
    /// Non-retryable errors (4xx other than 429, validation, config)
    /// propagate immediately.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.config.max_attempts {
            attempts += 1;

            match operation().await {
                Ok(result) => {
                    if attempts > 1 {
                        debug!(attempts, "operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !err.is_retryable() {
                        debug!(error = %err, "non-retryable error");
                        return Err(err);
                    }

                    warn!(
                        attempt = attempts,
                        max_attempts = self.config.max_attempts,
                        error = %err,
                        "attempt failed"
                    );

                    if attempts < self.config.max_attempts {
                        // A 429 with an advertised delay overrides the
                        // computed backoff.
                        let backoff = match &err {
                            PriceWatchError::RateLimited {
                                retry_after: Some(after),
                            } => (*after).max(self.calculate_backoff(attempts)),
                            _ => self.calculate_backoff(attempts),
                        };
                        debug!(?backoff, "retrying after backoff");
                        sleep(backoff).await;
                    }

                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(PriceWatchError::RetryExhausted {
                attempts,
                last_error: Box::new(err),
            }),
            None => Err(PriceWatchError::internal("retry loop without attempts")),
        }
    }

    fn calculate_backoff(&self, attempt: usize) -> Duration {
        let base = self.config.initial_backoff.as_secs_f64()
            * self.config.multiplier.powi((attempt - 1) as i32);

        let backoff = Duration::from_secs_f64(base.min(self.config.max_backoff.as_secs_f64()));

        if self.config.jitter {
            add_jitter(backoff)
        } else {
            backoff
        }
    }
}

/// Shave 0-30% off the delay to avoid thundering herd.
fn add_jitter(duration: Duration) -> Duration {
    use rand::Rng;
    let jitter: f64 = rand::thread_rng().gen_range(0.0..=0.3);
    Duration::from_secs_f64(duration.as_secs_f64() * (1.0 - jitter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: false,
        })
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = fast_policy()
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(PriceWatchError::api(500, "server error"))
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let result = fast_policy()
            .execute(|| async { Err::<(), _>(PriceWatchError::api(503, "unavailable")) })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            PriceWatchError::RetryExhausted { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_non_retryable_error_propagates() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = fast_policy()
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(PriceWatchError::api(404, "not found"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
