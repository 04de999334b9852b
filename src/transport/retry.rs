use crate::core::error::ChatError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded retry with a fixed pause between attempts.
///
/// Only [retryable](ChatError::is_retryable) failures are retried; anything else
/// is returned as soon as it happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Runs `op` until it succeeds, fails terminally, or attempts run out.
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ChatError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ChatError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        what, attempt, max_attempts, e
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                    debug!("retrying {} (attempt {}/{})", what, attempt, max_attempts);
                }
                Err(e) if e.is_retryable() => {
                    warn!("{} failed after {} attempts: {}", what, attempt, e);
                    return Err(ChatError::Connection(format!(
                        "{} failed after {} attempts: {}",
                        what, attempt, e
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }
}
