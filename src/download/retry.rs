// Exponential-backoff retry wrapper around fallible download steps.
//
// Only transient failures (network-level errors, 5xx, timeouts) are
// retried; deterministic failures (4xx, malformed input) surface
// immediately. Delays double per attempt and sleeps happen strictly
// between attempts — there is no trailing sleep before giving up.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::net::FetchError;

/// What the retry hook sees before each backoff sleep.
#[derive(Debug, Clone, Copy)]
pub struct RetryNotice {
    /// Zero-based index of the attempt that just failed.
    pub attempt: u32,
    /// How long the wrapper is about to sleep.
    pub delay: Duration,
}

/// Tunable retry parameters. The defaults mirror the shipped behavior;
/// they are not a contract.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total invocations of the operation, not extra retries.
    pub max_attempts: u32,
    /// First backoff delay; doubles each subsequent attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails deterministically, or the
    /// attempt budget is spent. `on_retry` fires once per backoff sleep
    /// (so never after the final failure).
    pub async fn run<T, F, Fut>(
        &self,
        name: &str,
        mut on_retry: impl FnMut(RetryNotice),
        op: F,
    ) -> Result<T, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut last = FetchError::Network("no attempts made".to_string());

        for attempt in 0..self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !err.is_transient() {
                        return Err(err);
                    }
                    last = err;
                    if attempt + 1 == self.max_attempts {
                        break;
                    }
                    let delay = self.base_delay.saturating_mul(1u32 << attempt);
                    warn!(
                        name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %last,
                        "transient failure, backing off"
                    );
                    on_retry(RetryNotice { attempt, delay });
                    tokio::time::sleep(delay).await;
                }
            }
        }

        warn!(name, attempts = self.max_attempts, error = %last, "giving up");
        Err(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt_calls_once() {
        let calls = AtomicU32::new(0);
        let result = quick()
            .run("t", |_| {}, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, FetchError>(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retry_until_success() {
        let calls = AtomicU32::new(0);
        let result = quick()
            .run("t", |_| {}, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(FetchError::Status(503))
                    } else {
                        Ok("recovered")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn deterministic_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = quick()
            .run("t", |_| {}, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::Status(404)) }
            })
            .await;
        assert!(matches!(result, Err(FetchError::Status(404))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_capped_at_max() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = quick()
            .run("t", |_| {}, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::Timeout) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn delays_double_per_attempt() {
        let mut delays = Vec::new();
        let _ = quick()
            .run(
                "t",
                |notice: RetryNotice| delays.push(notice.delay),
                || async { Err::<(), _>(FetchError::Timeout) },
            )
            .await;

        // 5 attempts mean 4 sleeps: 1s, 2s, 4s, 8s.
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ]
        );
        for pair in delays.windows(2) {
            assert!(pair[1] > pair[0], "delays must strictly increase");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_retry_hook_call_after_final_failure() {
        let notices = AtomicU32::new(0);
        let _ = quick()
            .run(
                "t",
                |_| {
                    notices.fetch_add(1, Ordering::SeqCst);
                },
                || async { Err::<(), _>(FetchError::Network("reset".into())) },
            )
            .await;
        assert_eq!(notices.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sleeps_really_elapse() {
        let start = tokio::time::Instant::now();
        let _ = quick()
            .run("t", |_| {}, || async { Err::<(), _>(FetchError::Timeout) })
            .await;
        // 1 + 2 + 4 + 8 = 15s of virtual time.
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }
}
