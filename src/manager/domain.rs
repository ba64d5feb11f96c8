//! Per-host dispatch gate and statistics
//!
//! Two pieces of host-level discipline live here: an exclusivity permit so
//! at most one request per host is ever inside the dispatch step, and the
//! politeness clock that spaces consecutive dispatches by the effective
//! crawl delay. Host statistics accumulate alongside.

use dashmap::DashMap;
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Running totals for one host.
#[derive(Debug, Default, Clone)]
struct HostTotals {
    success: u64,
    failure: u64,
    total_response_ms: u64,
}

/// Snapshot entry exposed through `getStats()`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DomainStatsEntry {
    pub success: u64,
    pub failure: u64,
    pub avg_response_time_ms: u64,
}

/// Host-keyed gate state shared by all dispatch tasks.
#[derive(Default)]
pub struct DomainGate {
    /// One permit per host: dispatch exclusivity.
    permits: DashMap<String, Arc<Semaphore>>,
    /// When the last dispatch for the host started.
    last_dispatch: DashMap<String, Instant>,
    totals: DashMap<String, HostTotals>,
}

impl DomainGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the host's dispatch permit, creating it lazily.
    ///
    /// Holding the permit makes the politeness clock race-free: nobody
    /// else can read or advance this host's `last_dispatch` mid-wait.
    pub async fn acquire(&self, host: &str) -> OwnedSemaphorePermit {
        let semaphore = self
            .permits
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone();

        loop {
            match semaphore.clone().acquire_owned().await {
                Ok(permit) => return permit,
                Err(_) => {
                    // A closed semaphore would be a bug; replace and retry
                    log::error!("Dispatch permit for '{host}' was closed unexpectedly - replacing");
                    let fresh = Arc::new(Semaphore::new(1));
                    self.permits.insert(host.to_string(), fresh.clone());
                    if let Ok(permit) = fresh.acquire_owned().await {
                        return permit;
                    }
                }
            }
        }
    }

    /// Sleep out the politeness window, then stamp the dispatch start.
    ///
    /// Must be called with the host's permit held. The stamp is taken
    /// after the sleep and before dispatch, so the next caller's window
    /// starts from this dispatch.
    pub async fn wait_turn(&self, host: &str, required_delay: Duration) {
        let wait = self.last_dispatch.get(host).map_or(Duration::ZERO, |last| {
            (*last + required_delay).saturating_duration_since(Instant::now())
        });

        if !wait.is_zero() {
            debug!("Domain gate: waiting {wait:?} before dispatching to {host}");
            tokio::time::sleep(wait).await;
        }

        self.last_dispatch.insert(host.to_string(), Instant::now());
    }

    /// Record a completed request's outcome for `host`.
    pub fn record(&self, host: &str, success: bool, response_ms: u64) {
        let mut totals = self.totals.entry(host.to_string()).or_default();
        if success {
            totals.success += 1;
        } else {
            totals.failure += 1;
        }
        totals.total_response_ms += response_ms;
    }

    /// Per-host stats with the running average materialized.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, DomainStatsEntry> {
        self.totals
            .iter()
            .map(|entry| {
                let totals = entry.value();
                let completed = totals.success + totals.failure;
                let avg = if completed == 0 {
                    0
                } else {
                    totals.total_response_ms / completed
                };
                (
                    entry.key().clone(),
                    DomainStatsEntry {
                        success: totals.success,
                        failure: totals.failure,
                        avg_response_time_ms: avg,
                    },
                )
            })
            .collect()
    }

    /// Zero the statistics. Politeness clocks are left alone: a reset must
    /// not let the next dispatch skip its delay.
    pub fn reset_stats(&self) {
        self.totals.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wait_turn_spaces_dispatches() {
        let gate = DomainGate::new();
        let delay = Duration::from_millis(120);

        let start = Instant::now();
        let permit = gate.acquire("example.com").await;
        gate.wait_turn("example.com", delay).await;
        drop(permit);

        let permit = gate.acquire("example.com").await;
        gate.wait_turn("example.com", delay).await;
        drop(permit);

        assert!(start.elapsed() >= delay, "second dispatch must wait out the delay");
    }

    #[tokio::test]
    async fn test_hosts_do_not_interfere() {
        let gate = DomainGate::new();
        let delay = Duration::from_secs(5);

        let permit = gate.acquire("a.example").await;
        gate.wait_turn("a.example", delay).await;
        drop(permit);

        // A different host has its own clock and proceeds immediately
        let start = Instant::now();
        let permit = gate.acquire("b.example").await;
        gate.wait_turn("b.example", delay).await;
        drop(permit);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_record_and_snapshot_average() {
        let gate = DomainGate::new();
        gate.record("example.com", true, 100);
        gate.record("example.com", true, 200);
        gate.record("example.com", false, 600);

        let snapshot = gate.snapshot();
        let entry = snapshot.get("example.com").expect("tracked host");
        assert_eq!(entry.success, 2);
        assert_eq!(entry.failure, 1);
        assert_eq!(entry.avg_response_time_ms, 300);
    }

    #[tokio::test]
    async fn test_reset_clears_totals_only() {
        let gate = DomainGate::new();
        gate.record("example.com", true, 100);
        gate.reset_stats();
        assert!(gate.snapshot().is_empty());
    }
}
