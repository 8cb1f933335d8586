use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Fixed-delay retry for store capacity errors
///
/// Only [`AppError::Throttled`] is retried; every other error is returned on
/// the spot so the channel's own redelivery handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(100))
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; zero is treated as one
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs `op` until it succeeds, fails with a non-throttling error, or
    /// runs out of attempts
    pub async fn run<F, Fut, T>(&self, operation: &str, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match op().await {
                Err(e) if e.is_throttling() => {
                    if attempt >= self.max_attempts {
                        tracing::error!(
                            operation = %operation,
                            attempts = attempt,
                            error = %e,
                            "Store still throttled, giving up"
                        );
                        return Err(AppError::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                        });
                    }

                    tracing::warn!(
                        operation = %operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        "Store throttled, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
                other => return other,
            }
        }
    }
}
