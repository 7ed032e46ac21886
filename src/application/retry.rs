use std::future::Future;
use std::time::Duration;

use crate::domain::errors::DomainError;

/// Bounded retry for transient storage/network failures.
///
/// Non-transient errors return immediately; transient ones are retried up to
/// `max_attempts` with a linearly growing backoff. After the budget is
/// exhausted the last error is surfaced rather than looping forever.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn run<T, F>(&self, mut op: F) -> Result<T, DomainError>
    where
        F: FnMut() -> Result<T, DomainError>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    log::warn!("transient error (attempt {attempt}): {e}; retrying");
                    std::thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    pub async fn run_async<T, F, Fut>(&self, mut op: F) -> Result<T, DomainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    log::warn!("transient error (attempt {attempt}): {e}; retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
