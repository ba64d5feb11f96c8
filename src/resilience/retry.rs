//! Retry with exponential backoff
//!
//! Shared by the request manager and by enrichment callers hitting
//! third-party APIs. Delays follow `base * factor^(attempt-1)` capped at
//! `max_delay`, with up to +20% jitter so synchronized callers spread out.
//! Jitter is only ever added, never subtracted, so the unjittered delay is
//! a floor.

use log::warn;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::errors::ScrapeError;
use crate::utils::constants::{
    RETRY_BASE_DELAY_MS, RETRY_FACTOR, RETRY_MAX_ATTEMPTS, RETRY_MAX_DELAY_MS,
};

/// Backoff parameters.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(RETRY_MAX_DELAY_MS),
            factor: RETRY_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Unjittered delay before retrying after a failed `attempt` (1-based).
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.factor.powi(attempt.saturating_sub(1).min(16) as i32);
        let millis = (self.base_delay.as_millis() as f64 * exp) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }

    /// Backoff with up to +20% jitter.
    #[must_use]
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_delay(attempt);
        let jitter = rand::rng().random_range(0.0..=0.2);
        let millis = (base.as_millis() as f64 * (1.0 + jitter)) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }
}

/// Run `operation` up to `policy.max_attempts` times.
///
/// `retry_condition` decides whether a failure is worth another attempt;
/// `on_retry` observes each retry before its backoff sleep. The last error
/// surfaces when attempts are exhausted or the condition rejects.
pub async fn retry_with_backoff<T, Op, Fut, Cond, Hook>(
    policy: RetryPolicy,
    mut operation: Op,
    mut retry_condition: Cond,
    mut on_retry: Hook,
) -> Result<T, ScrapeError>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ScrapeError>>,
    Cond: FnMut(&ScrapeError) -> bool,
    Hook: FnMut(u32, &ScrapeError),
{
    let mut attempt = 1u32;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_attempts || !retry_condition(&err) {
                    return Err(err);
                }

                on_retry(attempt, &err);
                let delay = policy.jittered_delay(attempt);
                warn!(
                    "Retrying after failure (attempt {attempt}/{}), backing off {:?}: {err}",
                    policy.max_attempts, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
