//! Shared configuration constants for coursescrape
//!
//! This module contains default values and configuration constants used
//! throughout the codebase to ensure consistency and avoid magic numbers.

use std::time::Duration;

/// Default identification sent with every HTTP request and robots.txt fetch.
///
/// Operators should override this with a contact URL of their own via
/// `ScrapeConfig::builder().user_agent(..)` so site owners can reach them.
pub const DEFAULT_USER_AGENT: &str =
    "CourseScrapeBot/0.3 (+https://github.com/fairway-data/coursescrape)";

/// Default per-host crawl delay when robots.txt does not specify one: 2 seconds.
///
/// Conservative rate that respects server resources while maintaining
/// reasonable throughput. Most servers can handle this rate without issue.
pub const DEFAULT_CRAWL_DELAY_MS: u64 = 2_000;

/// Crawl delay applied when the robots.txt fetch itself failed: 4 seconds.
///
/// Double the default, so a broken or overloaded host is approached even
/// more gently until its robots.txt becomes reachable again.
pub const ROBOTS_ERROR_DELAY_MS: u64 = 4_000;

/// How long a cached robots.txt decision stays valid: 24 hours.
pub const ROBOTS_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Interval between sweeps that evict expired robots cache entries.
pub const ROBOTS_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Timeout for fetching robots.txt itself.
pub const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a single static HTTP fetch of a target page.
pub const STATIC_FETCH_TIMEOUT_SECS: u64 = 30;

/// Maximum redirect hops the static fetcher will follow.
pub const MAX_REDIRECTS: usize = 5;

/// Default timeout for page navigation and in-page operations.
pub const PAGE_TIMEOUT_SECS: u64 = 30;

/// Upper bound on waiting for an `options.wait_for_selector` match.
pub const SELECTOR_WAIT: Duration = Duration::from_secs(10);

/// Polling interval while waiting for a selector to appear.
pub const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default settle time after navigation before extraction runs: 2 seconds.
///
/// Gives client-side rendering a chance to populate the DOM even when the
/// caller did not name a selector to wait for.
pub const DEFAULT_WAIT_TIME_MS: u64 = 2_000;

/// Maximum concurrently running browser sessions.
pub const MAX_BROWSERS: usize = 3;

/// Maximum pages held open per browser session.
pub const MAX_PAGES_PER_BROWSER: usize = 5;

/// Sessions idle longer than this are eligible for the idle sweep: 30 minutes.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Requests served before a session is recycled instead of reused.
///
/// Long-lived Chrome processes accumulate memory; recycling after a fixed
/// request budget keeps the pool's footprint flat.
pub const MAX_REQUESTS_PER_BROWSER: u32 = 50;

/// Interval between pool sweeps that close idle pages and sessions.
pub const POOL_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default retry policy: attempts including the first dispatch.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Base delay before the first retry: 1 second.
pub const RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Cap on any single backoff sleep: 10 seconds.
pub const RETRY_MAX_DELAY_MS: u64 = 10_000;

/// Exponential backoff multiplier between attempts.
pub const RETRY_FACTOR: f64 = 2.0;

/// Consecutive failures on one host before its circuit opens.
pub const BREAKER_FAILURE_THRESHOLD: u32 = 5;

/// How long an open circuit blocks a host before a half-open probe: 60 seconds.
pub const BREAKER_RESET_TIMEOUT: Duration = Duration::from_secs(60);

/// Default viewport width for headless pages.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;

/// Default viewport height for headless pages.
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 720;

/// Default cap on requests dispatched concurrently across all hosts.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Grace window `cleanup()` waits for in-flight dispatches to drain.
pub const CLEANUP_GRACE: Duration = Duration::from_secs(30);
