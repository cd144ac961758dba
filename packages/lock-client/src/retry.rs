//! A generic bounded retry harness, ported from the original `task.go`'s
//! `DoRetryWithTimeout`: a fixed number of attempts, fixed inter-attempt
//! delay, and an overall deadline, built on `tokio::time` rather than raw
//! channels and goroutines (matching the teacher's deadline style in
//! `network/shutdown.rs::wait_for_drain`).

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::LockError;

/// The result of a single retry attempt.
pub enum Step<T> {
    /// Succeeded; stop retrying and return `T`.
    Done(T),
    /// Transient failure; retry after the configured delay if attempts and
    /// time remain. Carries a human-readable cause for the eventual
    /// `LockError::Timeout`.
    Retry(String),
    /// Unrecoverable failure; stop retrying immediately.
    Fatal(LockError),
}

/// Calls `attempt` up to `max_attempts` times, sleeping `delay` between
/// attempts, until it returns `Step::Done`, `Step::Fatal`, the attempt
/// count is exhausted, or `timeout` elapses since the first call.
pub async fn retry_with_timeout<F, Fut, T>(
    max_attempts: u32,
    delay: Duration,
    timeout: Duration,
    mut attempt: F,
) -> Result<T, LockError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Step<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut causes = Vec::new();

    for attempt_no in 1..=max_attempts.max(1) {
        match attempt().await {
            Step::Done(value) => return Ok(value),
            Step::Fatal(err) => return Err(err),
            Step::Retry(cause) => {
                causes.push(cause);
                if attempt_no == max_attempts || Instant::now() >= deadline {
                    break;
                }
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(LockError::Timeout {
        attempts: causes.len() as u32,
        causes: causes.join("; "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_first_attempt() {
        let result = retry_with_timeout(5, Duration::from_secs(1), Duration::from_secs(10), || {
            Box::pin(async { Step::<u32>::Done(42) })
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_timeout(5, Duration::from_millis(100), Duration::from_secs(10), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if n < 2 {
                    Step::Retry(format!("attempt {n} failed"))
                } else {
                    Step::Done(n)
                }
            })
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_attempts_reports_timeout() {
        let err = retry_with_timeout(3, Duration::from_millis(10), Duration::from_secs(10), || {
            Box::pin(async { Step::<u32>::Retry("still locked".to_string()) })
        })
        .await
        .unwrap_err();
        match err {
            LockError::Timeout { attempts, causes } => {
                assert_eq!(attempts, 3);
                assert!(causes.contains("still locked"));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_short_circuits_immediately() {
        let calls = AtomicU32::new(0);
        let err = retry_with_timeout(5, Duration::from_millis(10), Duration::from_secs(10), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Step::<u32>::Fatal(LockError::ConflictRetriesExhausted) })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, LockError::ConflictRetriesExhausted));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
