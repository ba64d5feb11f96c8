//! Read accessors for `ScrapeConfig`
//!
//! Fields stay `pub(crate)`; external consumers go through these getters,
//! which also derive the `Duration`/policy views the components consume.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::ScrapeConfig;
use crate::resilience::RetryPolicy;

impl ScrapeConfig {
    #[must_use]
    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn robots_default_delay_ms(&self) -> u64 {
        self.robots_default_delay_ms
    }

    #[must_use]
    pub fn robots_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_cache_ttl_secs)
    }

    #[must_use]
    pub fn static_timeout(&self) -> Duration {
        Duration::from_secs(self.static_timeout_secs)
    }

    #[must_use]
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    #[must_use]
    pub fn max_browsers(&self) -> usize {
        self.max_browsers
    }

    #[must_use]
    pub fn max_pages_per_browser(&self) -> usize {
        self.max_pages_per_browser
    }

    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    #[must_use]
    pub fn max_requests_per_browser(&self) -> u32 {
        self.max_requests_per_browser
    }

    /// The retry policy view consumed by the manager.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            factor: self.retry_factor,
        }
    }

    #[must_use]
    pub fn retry_max_attempts(&self) -> u32 {
        self.retry_max_attempts
    }

    #[must_use]
    pub fn breaker_threshold(&self) -> u32 {
        self.breaker_threshold
    }

    #[must_use]
    pub fn breaker_reset_timeout(&self) -> Duration {
        Duration::from_secs(self.breaker_reset_timeout_secs)
    }

    #[must_use]
    pub fn browser_executable(&self) -> Option<&PathBuf> {
        self.browser_executable.as_ref()
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }
}
