use std::future::Future;
use std::time::Duration;

use crate::error::ActivityError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), capped at `max_interval`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_coefficient.max(1.0).powi(exponent);
        let delay = self.initial_interval.mul_f64(factor.min(1e6));
        delay.min(self.max_interval)
    }

    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOptions {
    pub start_to_close: Duration,
    pub retry: RetryPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of running an activity to completion under its retry policy.
pub(crate) struct Attempted<T> {
    pub result: Result<T, ActivityError>,
    pub attempts: u32,
}

pub(crate) async fn run_with_retry<T, F, Fut>(
    name: &str,
    options: &ActivityOptions,
    mut attempt: F,
) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ActivityError>>,
{
    let max_attempts = options.retry.max_attempts.max(1);
    let mut attempts = 0;
    loop {
        attempts += 1;
        let result = match tokio::time::timeout(options.start_to_close, attempt()).await {
            Ok(result) => result,
            Err(_) => Err(ActivityError::Timeout(options.start_to_close)),
        };
        match result {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts,
                };
            }
            Err(err) if err.is_retryable() && attempts < max_attempts => {
                let delay = options.retry.delay(attempts);
                tracing::warn!(activity = name, attempt = attempts, error = %err, ?delay, "retrying activity");
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                return Attempted {
                    result: Err(err),
                    attempts,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> ActivityOptions {
        ActivityOptions {
            start_to_close: Duration::from_millis(200),
            retry: RetryPolicy {
                max_attempts,
                initial_interval: Duration::from_millis(1),
                backoff_coefficient: 2.0,
                max_interval: Duration::from_millis(5),
            },
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_interval: Duration::from_millis(100),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_millis(500),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(400));
        assert_eq!(policy.delay(4), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let outcome = run_with_retry("flaky", &fast(5), || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ActivityError::retryable("not yet"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(outcome.result, Ok(7));
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn non_retryable_stops_immediately() {
        let outcome: Attempted<()> = run_with_retry("bad", &fast(5), || async {
            Err(ActivityError::non_retryable("invalid input"))
        })
        .await;
        assert_eq!(outcome.attempts, 1);
        assert!(matches!(outcome.result, Err(ActivityError::NonRetryable(_))));
    }

    #[tokio::test]
    async fn exhausts_attempts() {
        let outcome: Attempted<()> = run_with_retry("down", &fast(3), || async {
            Err(ActivityError::retryable("unavailable"))
        })
        .await;
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.result.is_err());
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let outcome: Attempted<()> = run_with_retry("slow", &fast(1), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(outcome.result, Err(ActivityError::Timeout(_))));
    }
}
