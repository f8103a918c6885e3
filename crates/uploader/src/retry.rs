//! Retry policy wrapped around a single chunk or direct request.

use std::future::Future;
use std::time::Duration;

use ferry_transfer::TransferConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::UploadError;

/// Bounded retry with a configurable delay between attempts.
///
/// With `backoff == 1.0` (the default) the delay is fixed; larger factors
/// grow it geometrically up to `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub backoff: f64,
    pub max_delay: Duration,
    /// When false the first failure is terminal.
    pub enabled: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: config.retry_delay,
            backoff: config.retry_backoff,
            max_delay: config.max_retry_delay,
            enabled: config.auto_retry,
        }
    }

    /// Total attempts, including the first one.
    pub fn max_attempts(&self) -> u32 {
        if self.enabled {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(63) as i32;
        let secs = self.delay.as_secs_f64() * self.backoff.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are spent. `op` receives the 1-based attempt number.
    ///
    /// Both the request and the delay between attempts are raced against
    /// `cancel`.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        mut op: F,
    ) -> Result<T, UploadError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, UploadError>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt: u32 = 1;

        loop {
            let err = match cancellable(cancel, op(attempt)).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_retryable() || attempt >= max_attempts {
                return Err(err);
            }

            let delay = self.delay_for_attempt(attempt);
            warn!(operation, attempt, max_attempts, error = %err, "request failed");
            debug!(
                operation,
                delay_ms = delay.as_millis() as u64,
                "retry scheduled"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

/// Races `fut` against `cancel`; cancellation wins ties.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, UploadError>>,
) -> Result<T, UploadError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(UploadError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(max_retries: u32, delay_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            delay: Duration::from_millis(delay_ms),
            backoff: 1.0,
            max_delay: Duration::from_secs(30),
            enabled: true,
        }
    }

    /// Fails with a transport error for the first `failures` calls.
    fn flaky(
        calls: Arc<AtomicU32>,
        failures: u32,
    ) -> impl FnMut(u32) -> std::future::Ready<Result<u32, UploadError>> {
        move |attempt| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if n <= failures {
                Err(UploadError::Transport("connection reset".into()))
            } else {
                Ok(attempt)
            })
        }
    }

    #[test]
    fn fixed_delay_by_default() {
        let p = RetryPolicy::from_config(&TransferConfig::default());
        assert_eq!(p.max_attempts(), 4);
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(3), Duration::from_secs(1));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let p = RetryPolicy {
            backoff: 2.0,
            max_delay: Duration::from_secs(3),
            ..policy(5, 1000)
        };
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(p.delay_for_attempt(3), Duration::from_secs(3));
        assert_eq!(p.delay_for_attempt(60), Duration::from_secs(3));
    }

    #[test]
    fn disabled_means_single_attempt() {
        let p = RetryPolicy {
            enabled: false,
            ..policy(5, 10)
        };
        assert_eq!(p.max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let p = policy(3, 1000);
        let start = Instant::now();

        let result = p
            .run(&CancellationToken::new(), "chunk", flaky(calls.clone(), 2))
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let p = policy(2, 100);

        let result = p
            .run(&CancellationToken::new(), "chunk", flaky(calls.clone(), u32::MAX))
            .await;

        assert!(matches!(result, Err(UploadError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_retry_off_fails_first_time() {
        let calls = Arc::new(AtomicU32::new(0));
        let p = RetryPolicy {
            enabled: false,
            ..policy(3, 100)
        };

        let result = p
            .run(&CancellationToken::new(), "direct", flaky(calls.clone(), 1))
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn protocol_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let p = policy(3, 10);

        let result: Result<(), _> = p
            .run(&CancellationToken::new(), "chunk", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err(UploadError::Protocol("bad ack".into())))
            })
            .await;

        assert!(matches!(result, Err(UploadError::Protocol(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let p = policy(3, 10_000);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let result = p.run(&cancel, "chunk", flaky(calls.clone(), u32::MAX)).await;
        assert_eq!(result, Err(UploadError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellable_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = cancellable(&cancel, async { Ok::<_, UploadError>(1) }).await;
        assert_eq!(result, Err(UploadError::Cancelled));
    }
}
