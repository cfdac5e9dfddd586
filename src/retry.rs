//! Retry with exponential backoff.
//!
//! [`retry_with_backoff`] is the single retry loop used by the harness. It
//! is parameterised by a [`RetryPolicy`] (how many retries, how long to
//! wait) and by the error type's [`Retryable`] classification (which
//! failures are worth another attempt).

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Backoff settings for transient model failures, read from
/// `[rerank.retry]`.
///
/// ```
/// use serp_rerank::retry::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts, 3);
/// assert!(policy.backoff(1).as_millis() >= 1_000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first call; 0 disables retrying.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay, before jitter.
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 32_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Sleep before retry number `retry` (1-based): the capped exponential
    /// delay plus up to 10% random jitter. `backoff(0)` is zero.
    pub fn backoff(&self, retry: u32) -> Duration {
        let Some(exponent) = retry.checked_sub(1) else {
            return Duration::ZERO;
        };
        let growth = self
            .backoff_multiplier
            .powi(i32::try_from(exponent).unwrap_or(i32::MAX));
        let capped = (self.base_delay_ms as f64 * growth).min(self.max_delay_ms as f64);
        let jittered = capped * (1.0 + rand::random::<f64>() / 10.0);
        Duration::from_millis(jittered as u64)
    }
}

/// Classifies errors for [`retry_with_backoff`].
pub trait Retryable {
    /// True if the failure is transient and the call may succeed if repeated.
    fn is_retryable(&self) -> bool;
}

/// Result of a retried operation.
#[derive(Debug)]
pub struct Retried<T, E> {
    /// Final outcome: the first success, or the last error.
    pub result: Result<T, E>,
    /// Number of calls made (at least 1).
    pub attempts: u32,
    /// Cancellation stopped the loop while a retry was still due, so
    /// `result` is not a final answer.
    pub cancelled: bool,
}

/// Run `op` until it succeeds, fails non-transiently, exhausts the policy,
/// or `cancel` fires during a backoff sleep.
///
/// `op` receives the 1-based attempt number. Cancellation never interrupts
/// a call in flight; it is checked before each backoff sleep and during it,
/// and sets [`Retried::cancelled`].
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Retried<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1u32;
    loop {
        match op(attempt).await {
            Ok(value) => {
                return Retried {
                    result: Ok(value),
                    attempts: attempt,
                    cancelled: false,
                };
            }
            Err(error) => {
                let retries_used = attempt - 1;
                if !error.is_retryable() || retries_used >= policy.max_attempts {
                    return Retried {
                        result: Err(error),
                        attempts: attempt,
                        cancelled: false,
                    };
                }
                if cancel.is_cancelled() {
                    return Retried {
                        result: Err(error),
                        attempts: attempt,
                        cancelled: true,
                    };
                }

                let delay = policy.backoff(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "transient failure, backing off"
                );

                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancel.cancelled() => {
                        tracing::debug!(attempt, "cancelled during backoff");
                        return Retried {
                            result: Err(error),
                            attempts: attempt,
                            cancelled: true,
                        };
                    }
                }
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Fatal,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, Self::Transient)
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn backoff_grows_exponentially_within_jitter() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::ZERO);
        let d1 = policy.backoff(1).as_millis();
        let d3 = policy.backoff(3).as_millis();
        assert!((1_000..=1_100).contains(&d1), "d1={d1}");
        assert!((4_000..=4_400).contains(&d3), "d3={d3}");
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_delay_ms: 5_000,
            ..RetryPolicy::default()
        };
        let d = policy.backoff(20).as_millis();
        assert!(d <= 5_500, "d={d}");
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let out = retry_with_backoff(&fast_policy(3), &CancellationToken::new(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(out.result, Ok("done"));
        assert_eq!(out.attempts, 3);
        assert!(!out.cancelled);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let out: Retried<(), _> =
            retry_with_backoff(&fast_policy(3), &CancellationToken::new(), |_| async {
                Err(TestError::Fatal)
            })
            .await;
        assert_eq!(out.result, Err(TestError::Fatal));
        assert_eq!(out.attempts, 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let out: Retried<(), _> =
            retry_with_backoff(&fast_policy(2), &CancellationToken::new(), |_| async {
                Err(TestError::Transient)
            })
            .await;
        assert_eq!(out.result, Err(TestError::Transient));
        assert_eq!(out.attempts, 3);
        assert!(!out.cancelled, "exhaustion is a final answer");
    }

    #[tokio::test]
    async fn cancellation_stops_retrying() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out: Retried<(), _> = retry_with_backoff(&fast_policy(5), &cancel, |_| async {
            Err(TestError::Transient)
        })
        .await;
        assert_eq!(out.attempts, 1);
        assert!(out.cancelled);
    }

    #[tokio::test]
    async fn cancellation_during_backoff_is_reported() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy {
            base_delay_ms: 60_000,
            max_delay_ms: 60_000,
            ..RetryPolicy::default()
        };
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let out: Retried<(), _> =
            retry_with_backoff(&policy, &cancel, |_| async { Err(TestError::Transient) }).await;
        assert_eq!(out.attempts, 1);
        assert!(out.cancelled);
    }

    #[tokio::test]
    async fn fatal_error_after_cancel_is_final() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out: Retried<(), _> =
            retry_with_backoff(&fast_policy(5), &cancel, |_| async { Err(TestError::Fatal) }).await;
        assert!(!out.cancelled);
    }
}
