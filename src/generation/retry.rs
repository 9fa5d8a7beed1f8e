use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;

use super::cancel::CancellationToken;
use crate::error::{AppError, Result};

/// Linear backoff: the delay before retry `n` is `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        self.base_delay * retry
    }
}

/// Waits between attempts. Swappable so tests can observe backoff without sleeping.
pub trait Delay: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

impl Delay for TokioDelay {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    policy: RetryPolicy,
    delay: &dyn Delay,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        cancel.check().await?;

        let err = match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("{} succeeded after {} attempts", label, attempt);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        log::warn!(
            "Error in {} (attempt {}/{}): {}",
            label,
            attempt,
            attempts,
            err
        );
        if !err.code.is_retryable() || attempt >= attempts {
            return Err(err);
        }

        let wait = policy.delay_before_retry(attempt);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::cancelled()),
            _ = delay.sleep(wait) => {}
        }
    }
}
