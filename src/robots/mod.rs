//! Per-host robots.txt policy cache
//!
//! Answers "may I fetch this URL right now, and with what delay?" for the
//! request manager. Directives are fetched once per origin, cached for 24
//! hours, and swept hourly. The cache never fails a caller: any internal
//! error degrades to a permissive decision with a doubled crawl delay.

pub mod matcher;
pub mod parser;

pub use parser::{validate_robots_txt, RobotsDirective, RobotsValidation};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::utils::constants::{
    DEFAULT_CRAWL_DELAY_MS, DEFAULT_USER_AGENT, ROBOTS_CACHE_TTL, ROBOTS_FETCH_TIMEOUT,
    ROBOTS_SWEEP_INTERVAL,
};

/// Decision returned to the request manager.
#[derive(Debug, Clone)]
pub struct RobotsCheckResult {
    pub allowed: bool,
    /// Always populated: directive delay, configured default, or the
    /// doubled error-path delay.
    pub crawl_delay_ms: u64,
    pub reason: Option<String>,
    pub directive: Option<RobotsDirective>,
    pub cache_hit: bool,
    pub checked_at: DateTime<Utc>,
}

/// Operator-facing snapshot of one host's robots state.
#[derive(Debug, Clone, Serialize)]
pub struct RobotsInfo {
    pub exists: bool,
    pub content: Option<String>,
    pub directive: Option<RobotsDirective>,
    pub sitemaps: Vec<String>,
    pub crawl_delay_ms: Option<u64>,
    pub last_checked: Option<DateTime<Utc>>,
}

/// Cache telemetry counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RobotsCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// What one origin's fetch produced.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Body text on HTTP 200; `None` when the host had no robots.txt.
    raw: Option<String>,
    /// Set when the fetch itself failed (network error or 5xx).
    fetch_error: Option<String>,
    fetched_at: Instant,
    checked_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() > ttl
    }
}

/// Origin-keyed robots.txt cache with TTL eviction.
pub struct RobotsCache {
    client: reqwest::Client,
    entries: DashMap<String, CacheEntry>,
    user_agent: String,
    /// Product token matched against `User-agent:` groups.
    bot_name: String,
    default_delay_ms: u64,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    sweeper: parking_lot::Mutex<Option<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new(
            DEFAULT_USER_AGENT.to_string(),
            DEFAULT_CRAWL_DELAY_MS,
            ROBOTS_CACHE_TTL,
        )
    }
}

impl RobotsCache {
    #[must_use]
    pub fn new(user_agent: String, default_delay_ms: u64, ttl: Duration) -> Self {
        let bot_name = user_agent
            .split(['/', ' '])
            .next()
            .unwrap_or(user_agent.as_str())
            .to_string();

        let client = reqwest::Client::builder()
            .user_agent(user_agent.clone())
            .timeout(ROBOTS_FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            entries: DashMap::new(),
            user_agent,
            bot_name,
            default_delay_ms,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            sweeper: parking_lot::Mutex::new(None),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Delay applied when the robots fetch failed: double the default.
    #[must_use]
    pub fn error_delay_ms(&self) -> u64 {
        self.default_delay_ms * 2
    }

    /// Start the hourly sweep that evicts expired entries.
    pub fn start_sweeper(self: &Arc<Self>) {
        let mut guard = self.sweeper.lock();
        if guard.is_some() {
            return;
        }
        let cache = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(ROBOTS_SWEEP_INTERVAL);
            interval.tick().await;
            while !cache.shutdown.load(Ordering::Relaxed) {
                interval.tick().await;
                cache.sweep_expired();
            }
        }));
    }

    /// Stop the sweep task. Cached entries stay usable.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }

    fn sweep_expired(&self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(self.ttl));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "Swept expired robots cache entries");
        }
    }

    /// May `url` be scraped as `agent` right now, and with what delay?
    ///
    /// Never fails: internal errors translate to a permissive decision
    /// carrying the doubled default delay and an explanatory reason.
    pub async fn can_scrape(&self, url: &str, agent: &str) -> RobotsCheckResult {
        match self.check(url, agent).await {
            Ok(result) => result,
            Err(err) => {
                warn!(url, error = %err, "Robots check failed, allowing permissively");
                RobotsCheckResult {
                    allowed: true,
                    crawl_delay_ms: self.error_delay_ms(),
                    reason: Some(format!("Error during robots check: {err:#}")),
                    directive: None,
                    cache_hit: false,
                    checked_at: Utc::now(),
                }
            }
        }
    }

    async fn check(&self, url: &str, agent: &str) -> anyhow::Result<RobotsCheckResult> {
        let parsed = Url::parse(url)?;
        let origin = crate::utils::origin_of(&parsed)?;

        let (entry, cache_hit) = self.entry_for(&origin).await;
        let checked_at = Utc::now();

        if let Some(fetch_error) = &entry.fetch_error {
            return Ok(RobotsCheckResult {
                allowed: true,
                crawl_delay_ms: self.error_delay_ms(),
                reason: Some(format!("Error fetching robots.txt: {fetch_error}")),
                directive: None,
                cache_hit,
                checked_at,
            });
        }

        let Some(raw) = &entry.raw else {
            // 4xx: the host publishes no robots constraints
            return Ok(RobotsCheckResult {
                allowed: true,
                crawl_delay_ms: self.default_delay_ms,
                reason: None,
                directive: None,
                cache_hit,
                checked_at,
            });
        };

        let outcome = parser::parse(raw, agent, &self.bot_name);
        for warning in &outcome.warnings {
            debug!(origin, warning, "robots.txt parse warning");
        }

        let path = match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        };
        let allowed = matcher::is_allowed(&outcome.directive, &path);
        let crawl_delay_ms = outcome
            .directive
            .crawl_delay_ms
            .unwrap_or(self.default_delay_ms);

        Ok(RobotsCheckResult {
            allowed,
            crawl_delay_ms,
            reason: (!allowed).then(|| format!("Disallowed by robots.txt for {path}")),
            directive: Some(outcome.directive),
            cache_hit,
            checked_at,
        })
    }

    /// Return the cached entry for `origin`, fetching on miss or expiry.
    async fn entry_for(&self, origin: &str) -> (CacheEntry, bool) {
        if let Some(existing) = self.entries.get(origin) {
            if !existing.is_expired(self.ttl) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(origin, "robots cache hit");
                return (existing.clone(), true);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(origin, "robots cache miss, fetching");
        let entry = self.fetch_entry(origin).await;
        self.entries.insert(origin.to_string(), entry.clone());
        (entry, false)
    }

    async fn fetch_entry(&self, origin: &str) -> CacheEntry {
        let robots_url = format!("{origin}/robots.txt");
        let now = Instant::now();
        let checked_at = Utc::now();

        let response = match self.client.get(&robots_url).send().await {
            Ok(response) => response,
            Err(err) => {
                // Cache the failure too, to avoid thundering on a broken host
                return CacheEntry {
                    raw: None,
                    fetch_error: Some(err.to_string()),
                    fetched_at: now,
                    checked_at,
                };
            }
        };

        let status = response.status();
        if status.is_success() {
            match response.text().await {
                Ok(body) => CacheEntry {
                    raw: Some(body),
                    fetch_error: None,
                    fetched_at: now,
                    checked_at,
                },
                Err(err) => CacheEntry {
                    raw: None,
                    fetch_error: Some(format!("failed reading body: {err}")),
                    fetched_at: now,
                    checked_at,
                },
            }
        } else if status.as_u16() < 500 {
            // 4xx means "no robots constraints"
            CacheEntry {
                raw: None,
                fetch_error: None,
                fetched_at: now,
                checked_at,
            }
        } else {
            CacheEntry {
                raw: None,
                fetch_error: Some(format!("HTTP {status}")),
                fetched_at: now,
                checked_at,
            }
        }
    }

    /// Operator snapshot for one host. Accepts a bare host or an origin;
    /// bare hosts are looked up over https.
    pub async fn get_robots_info(&self, host: &str) -> RobotsInfo {
        let origin = if host.contains("://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{host}")
        };

        let (entry, _) = self.entry_for(&origin).await;

        let directive = entry
            .raw
            .as_deref()
            .map(|raw| parser::parse(raw, &self.user_agent, &self.bot_name).directive);

        RobotsInfo {
            exists: entry.raw.is_some(),
            sitemaps: directive
                .as_ref()
                .map(|d| d.sitemaps.clone())
                .unwrap_or_default(),
            crawl_delay_ms: directive.as_ref().and_then(|d| d.crawl_delay_ms),
            content: entry.raw,
            directive,
            last_checked: Some(entry.checked_at),
        }
    }

    /// Drop one host's entry, or everything when `host` is `None`.
    pub fn clear_cache(&self, host: Option<&str>) {
        match host {
            Some(host) => {
                let origin = if host.contains("://") {
                    host.trim_end_matches('/').to_string()
                } else {
                    format!("https://{host}")
                };
                if self.entries.remove(&origin).is_some() {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => {
                let count = self.entries.len() as u64;
                self.entries.clear();
                self.evictions.fetch_add(count, Ordering::Relaxed);
            }
        }
    }

    /// Telemetry counters.
    #[must_use]
    pub fn cache_stats(&self) -> RobotsCacheStats {
        RobotsCacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> RobotsCache {
        RobotsCache::new("CourseScrapeBot/0.3".into(), 2_000, Duration::from_secs(60))
    }

    fn seed(cache: &RobotsCache, origin: &str, raw: Option<&str>, fetch_error: Option<&str>) {
        cache.entries.insert(
            origin.to_string(),
            CacheEntry {
                raw: raw.map(str::to_string),
                fetch_error: fetch_error.map(str::to_string),
                fetched_at: Instant::now(),
                checked_at: Utc::now(),
            },
        );
    }

    #[tokio::test]
    async fn test_decision_deterministic_for_cached_directive() {
        let cache = cache();
        seed(
            &cache,
            "https://example.com",
            Some("User-agent: *\nDisallow: /admin\nCrawl-delay: 3\n"),
            None,
        );

        for _ in 0..3 {
            let result = cache
                .can_scrape("https://example.com/admin/users", "CourseScrapeBot/0.3")
                .await;
            assert!(!result.allowed);
            assert_eq!(result.crawl_delay_ms, 3_000);
            assert!(result.cache_hit);
        }

        let result = cache
            .can_scrape("https://example.com/courses", "CourseScrapeBot/0.3")
            .await;
        assert!(result.allowed);
    }

    #[tokio::test]
    async fn test_fetch_error_entry_is_permissive_with_doubled_delay() {
        let cache = cache();
        seed(&cache, "https://down.example", None, Some("HTTP 503"));

        let result = cache
            .can_scrape("https://down.example/golf", "CourseScrapeBot/0.3")
            .await;
        assert!(result.allowed);
        assert_eq!(result.crawl_delay_ms, 4_000);
        assert!(result.reason.as_deref().is_some_and(|r| r.contains("Error")));
    }

    #[tokio::test]
    async fn test_missing_robots_entry_uses_default_delay() {
        let cache = cache();
        seed(&cache, "https://bare.example", None, None);

        let result = cache
            .can_scrape("https://bare.example/anything", "CourseScrapeBot/0.3")
            .await;
        assert!(result.allowed);
        assert_eq!(result.crawl_delay_ms, 2_000);
        assert!(result.reason.is_none());
    }

    #[tokio::test]
    async fn test_invalid_url_is_permissive_error_path() {
        let cache = cache();
        let result = cache.can_scrape("not a url at all", "CourseScrapeBot/0.3").await;
        assert!(result.allowed);
        assert_eq!(result.crawl_delay_ms, 4_000);
        assert!(result.reason.as_deref().is_some_and(|r| r.contains("Error")));
    }

    #[tokio::test]
    async fn test_clear_cache_single_and_all() {
        let cache = cache();
        seed(&cache, "https://a.example", None, None);
        seed(&cache, "https://b.example", None, None);
        assert_eq!(cache.cache_stats().entries, 2);

        cache.clear_cache(Some("a.example"));
        assert_eq!(cache.cache_stats().entries, 1);

        cache.clear_cache(None);
        assert_eq!(cache.cache_stats().entries, 0);
        assert_eq!(cache.cache_stats().evictions, 2);
    }

    #[tokio::test]
    async fn test_query_string_participates_in_matching() {
        let cache = cache();
        seed(
            &cache,
            "https://example.com",
            Some("User-agent: *\nDisallow: /search?*\n"),
            None,
        );

        let denied = cache
            .can_scrape("https://example.com/search?q=golf", "CourseScrapeBot/0.3")
            .await;
        assert!(!denied.allowed);

        let allowed = cache
            .can_scrape("https://example.com/search-tips", "CourseScrapeBot/0.3")
            .await;
        assert!(allowed.allowed);
    }
}
