//! Bounded retry with exponential backoff for transient UI races.
//!
//! Reading a response can race the page (clipboard not yet populated,
//! response region still streaming in). Those failures are retried a fixed
//! number of times with exponential delay; structural failures and bot
//! challenges are not retried here.

use crate::error::{AiUiError, Result};
use std::future::Future;
use std::time::Duration;

/// Retry budget: attempt count plus exponential delay window.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Backoff {
    /// Budget for response reads: 5 attempts, 4s doubling up to 15s.
    pub const fn reads() -> Self {
        Self {
            max_attempts: 5,
            min_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(15),
        }
    }

    /// Budget for file attachment: 3 attempts, same delay window.
    pub const fn attach() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(15),
        }
    }

    /// Delay before the given retry (1-based attempt that just failed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << (attempt.saturating_sub(1)).min(16);
        self.min_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `op` until it succeeds, a non-transient error surfaces, or the
/// attempt budget is exhausted.
pub async fn retry_transient<T, F, Fut>(policy: Backoff, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                log::warn!(
                    "transient failure (attempt {}/{}): {}; retrying in {:?}",
                    attempt,
                    policy.max_attempts,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
