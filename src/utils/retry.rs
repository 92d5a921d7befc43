use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Bounded Retry with Exponential Backoff
// ============================================================================
//
// Transient infrastructure failures (storage timeouts, broker hiccups) are
// retried up to a configured attempt budget; business-rule failures abort
// immediately. The attempt budget doubles as the dead-letter threshold for
// the consumer: once it is spent, the message leaves the retry path.
//
// ============================================================================

/// Marks whether an error is worth retrying.
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Tunable, never hard-coded
    /// at call sites.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    fn next_delay(&self, current: Duration) -> Duration {
        let scaled = Duration::from_millis((current.as_millis() as f64 * self.multiplier) as u64);
        scaled.min(self.max_delay)
    }
}

/// Outcome of a retried operation.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Ok(T),
    /// Every attempt failed with a transient error; the budget is spent.
    Exhausted(E),
    /// A permanent error was seen; retrying would not change the result.
    Aborted(E),
}

/// Run `f` until it succeeds, fails permanently, or the attempt budget is
/// spent. The closure receives the 1-based attempt number.
pub async fn retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let mut delay = policy.initial_delay;
    let budget = policy.max_attempts.max(1);

    for attempt in 1..=budget {
        match f(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "Operation recovered after retry");
                }
                return RetryOutcome::Ok(value);
            }
            Err(error) if !error.is_transient() => {
                tracing::error!(operation, attempt, error = %error, "Permanent failure, not retrying");
                return RetryOutcome::Aborted(error);
            }
            Err(error) => {
                if attempt == budget {
                    tracing::error!(
                        operation,
                        attempt,
                        error = %error,
                        "Transient failure, attempt budget spent"
                    );
                    return RetryOutcome::Exhausted(error);
                }

                tracing::warn!(
                    operation,
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, backing off"
                );
                sleep(delay).await;
                delay = policy.next_delay(delay);
            }
        }
    }

    unreachable!("retry loop always returns within the attempt budget")
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl IsTransient for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_recovers_within_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome = retry(&fast_policy(3), "test_op", |_| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert!(matches!(outcome, RetryOutcome::Ok("done")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_budget_on_persistent_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome = retry(&fast_policy(4), "test_op", |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError::Transient)
            }
        })
        .await;

        assert!(matches!(outcome, RetryOutcome::Exhausted(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_permanent_failure_aborts_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome = retry(&fast_policy(5), "test_op", |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError::Permanent)
            }
        })
        .await;

        assert!(matches!(outcome, RetryOutcome::Aborted(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_growth_is_capped() {
        let policy = fast_policy(3);
        let grown = policy.next_delay(Duration::from_millis(15));
        assert_eq!(grown, Duration::from_millis(20));
    }
}
