//! Core configuration types for the scraping core
//!
//! This module contains the main `ScrapeConfig` struct holding every
//! recognized configuration key for the robots cache, the fetcher
//! backends, the browser pool, and the request manager.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::constants::{
    BREAKER_FAILURE_THRESHOLD, BREAKER_RESET_TIMEOUT, DEFAULT_CRAWL_DELAY_MS,
    DEFAULT_MAX_CONCURRENT, DEFAULT_USER_AGENT, MAX_BROWSERS, MAX_PAGES_PER_BROWSER,
    MAX_REQUESTS_PER_BROWSER, PAGE_TIMEOUT_SECS, RETRY_BASE_DELAY_MS, RETRY_FACTOR,
    RETRY_MAX_ATTEMPTS, RETRY_MAX_DELAY_MS, ROBOTS_CACHE_TTL, SESSION_TIMEOUT,
    STATIC_FETCH_TIMEOUT_SECS,
};

/// Main configuration for a `RequestManager` and its owned collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Directory screenshots are written under, keyed by target id.
    ///
    /// **INVARIANT:** always set (required by the builder). The storage
    /// collaborator owns the directory; this crate only writes beneath it.
    pub(crate) media_dir: PathBuf,

    /// Identification for every HTTP request and robots fetch.
    pub(crate) user_agent: String,

    /// Per-host delay when robots.txt does not specify one, milliseconds.
    pub(crate) robots_default_delay_ms: u64,

    /// Lifetime of a cached robots.txt decision, seconds.
    pub(crate) robots_cache_ttl_secs: u64,

    /// Timeout for one static HTTP fetch, seconds.
    pub(crate) static_timeout_secs: u64,

    /// Timeout for headless-page navigation and waits, seconds.
    pub(crate) page_timeout_secs: u64,

    /// Browser pool bounds.
    pub(crate) max_browsers: usize,
    pub(crate) max_pages_per_browser: usize,

    /// Sessions idle longer than this are reaped, seconds.
    pub(crate) session_timeout_secs: u64,

    /// Requests served before a session is recycled.
    pub(crate) max_requests_per_browser: u32,

    /// Retry policy for retryable dispatch failures.
    pub(crate) retry_max_attempts: u32,
    pub(crate) retry_base_delay_ms: u64,
    pub(crate) retry_max_delay_ms: u64,
    pub(crate) retry_factor: f64,

    /// Per-host circuit breaker tuning.
    pub(crate) breaker_threshold: u32,
    pub(crate) breaker_reset_timeout_secs: u64,

    /// Explicit Chrome/Chromium executable; discovered when unset.
    pub(crate) browser_executable: Option<PathBuf>,

    /// Cap on requests dispatched concurrently across all hosts.
    pub(crate) max_concurrent: usize,

    /// Run browsers headless. Disable only for local debugging.
    pub(crate) headless: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("./media"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            robots_default_delay_ms: DEFAULT_CRAWL_DELAY_MS,
            robots_cache_ttl_secs: ROBOTS_CACHE_TTL.as_secs(),
            static_timeout_secs: STATIC_FETCH_TIMEOUT_SECS,
            page_timeout_secs: PAGE_TIMEOUT_SECS,
            max_browsers: MAX_BROWSERS,
            max_pages_per_browser: MAX_PAGES_PER_BROWSER,
            session_timeout_secs: SESSION_TIMEOUT.as_secs(),
            max_requests_per_browser: MAX_REQUESTS_PER_BROWSER,
            retry_max_attempts: RETRY_MAX_ATTEMPTS,
            retry_base_delay_ms: RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: RETRY_MAX_DELAY_MS,
            retry_factor: RETRY_FACTOR,
            breaker_threshold: BREAKER_FAILURE_THRESHOLD,
            breaker_reset_timeout_secs: BREAKER_RESET_TIMEOUT.as_secs(),
            browser_executable: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            headless: true,
        }
    }
}

impl ScrapeConfig {
    /// Start building a configuration; `media_dir` is the one required field.
    #[must_use]
    pub fn builder() -> super::builder::ScrapeConfigBuilder<()> {
        super::builder::ScrapeConfigBuilder::default()
    }
}
