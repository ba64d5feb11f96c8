//! Circuit breaker for host-level failure detection
//!
//! Tracks failures per key (usually a host) and short-circuits further
//! attempts to keys that keep failing, saving time and connection churn.
//!
//! State machine per key:
//! - Closed: normal operation, requests proceed
//! - Open: too many consecutive failures, requests are rejected
//! - `HalfOpen`: reset timeout elapsed, a single probe is allowed; its
//!   outcome closes or re-opens the circuit

use dashmap::DashMap;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

use crate::errors::ScrapeError;
use crate::utils::constants::{BREAKER_FAILURE_THRESHOLD, BREAKER_RESET_TIMEOUT};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests proceed
    Closed,
    /// Testing after the reset timeout - one probe allowed
    HalfOpen,
    /// Failing - requests are rejected without dispatch
    Open,
}

/// Health tracking for a single key
#[derive(Debug, Clone)]
pub struct BreakerHealth {
    /// Consecutive failures without a success
    pub consecutive_failures: u32,
    pub total_attempts: u32,
    pub total_successes: u32,
    pub last_failure: Option<Instant>,
    /// When the circuit last opened, for timeout calculation
    pub last_opened: Option<Instant>,
    pub state: CircuitState,
}

impl BreakerHealth {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            total_attempts: 0,
            total_successes: 0,
            last_failure: None,
            last_opened: None,
            state: CircuitState::Closed,
        }
    }
}

/// Per-key circuit breaker.
///
/// A single success in `HalfOpen` closes the circuit again.
pub struct CircuitBreaker {
    entries: DashMap<String, BreakerHealth>,
    /// Consecutive failures before opening
    failure_threshold: u32,
    /// How long an open circuit rejects before allowing a probe
    reset_timeout: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BREAKER_FAILURE_THRESHOLD, BREAKER_RESET_TIMEOUT)
    }
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            failure_threshold,
            reset_timeout,
        }
    }

    /// Whether a request for `key` may proceed right now.
    ///
    /// Returns true for Closed and `HalfOpen`; an Open circuit whose reset
    /// timeout has elapsed transitions to `HalfOpen` and also returns true.
    pub fn should_attempt(&self, key: &str) -> bool {
        let mut health = self
            .entries
            .entry(key.to_string())
            .or_insert_with(BreakerHealth::new);

        match health.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if let Some(opened) = health.last_opened {
                    if opened.elapsed() >= self.reset_timeout {
                        health.state = CircuitState::HalfOpen;
                        info!(
                            "Circuit breaker HALF-OPEN for {key} (after {:?} timeout)",
                            opened.elapsed()
                        );
                        return true;
                    }
                } else {
                    debug!("Circuit breaker OPEN with no timestamp for {key}, staying Open");
                }
                false
            }
        }
    }

    /// Record a successful request for `key`.
    ///
    /// Resets the consecutive failure count; in `HalfOpen` the single
    /// success closes the circuit.
    pub fn record_success(&self, key: &str) {
        if let Some(mut health) = self.entries.get_mut(key) {
            health.consecutive_failures = 0;
            health.total_successes += 1;
            health.total_attempts += 1;

            if health.state == CircuitState::HalfOpen {
                health.state = CircuitState::Closed;
                info!("Circuit breaker CLOSED for {key}");
            }
        }
    }

    /// Record a failed request for `key`; opens the circuit at the
    /// threshold, and re-opens immediately on a failed half-open probe.
    pub fn record_failure(&self, key: &str, error: &str) {
        let mut health = self
            .entries
            .entry(key.to_string())
            .or_insert_with(BreakerHealth::new);

        health.consecutive_failures += 1;
        health.total_attempts += 1;
        health.last_failure = Some(Instant::now());

        let should_open = health.state == CircuitState::HalfOpen
            || (health.consecutive_failures >= self.failure_threshold
                && health.state != CircuitState::Open);

        if should_open {
            health.state = CircuitState::Open;
            health.last_opened = Some(Instant::now());
            warn!(
                "Circuit breaker OPEN for {key} after {} consecutive failures. Last error: {error}",
                health.consecutive_failures
            );
        } else if health.state != CircuitState::Open {
            debug!(
                "Circuit breaker failure for {key} ({}/{}): {error}",
                health.consecutive_failures, self.failure_threshold
            );
        }
    }

    /// Run `operation` through the breaker: rejected when open, outcome
    /// recorded otherwise. The entry point for enrichment callers.
    pub async fn execute<T, Fut>(
        &self,
        key: &str,
        operation: impl FnOnce() -> Fut,
    ) -> Result<T, ScrapeError>
    where
        Fut: std::future::Future<Output = Result<T, ScrapeError>>,
    {
        if !self.should_attempt(key) {
            return Err(ScrapeError::Network {
                message: format!("circuit breaker open for {key}"),
                url: None,
                status: None,
            });
        }

        match operation().await {
            Ok(value) => {
                self.record_success(key);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(key, &err.to_string());
                Err(err)
            }
        }
    }

    /// Health snapshot for one key, if it has been seen.
    #[must_use]
    pub fn health(&self, key: &str) -> Option<BreakerHealth> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    /// Keys currently in Open state, for monitoring.
    #[must_use]
    pub fn open_keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.value().state == CircuitState::Open)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Forget all tracked keys.
    pub fn clear(&self) {
        self.entries.clear();
    }
}
