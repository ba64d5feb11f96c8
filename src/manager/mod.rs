//! Request manager
//!
//! The single entry point of the scraping core. A submitted target flows
//! through: robots gate → priority queue → per-host breaker fast-fail →
//! per-host politeness delay → backend dispatch → retry with backoff →
//! accounting. Multiple hosts dispatch in parallel; within one host,
//! dispatches are serialized and spaced by the effective crawl delay.

pub mod domain;
pub mod queue;

pub use domain::DomainStatsEntry;
pub use queue::{QueueGauges, RequestQueue, RequestSlot};

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use url::Url;

use crate::browser::{BrowserPool, BrowserPoolStats, DynamicFetcher, PoolConfig};
use crate::config::ScrapeConfig;
use crate::errors::{ErrorKind, ScrapeError, ScrapingError};
use crate::fetcher::{Fetcher, StaticFetcher};
use crate::resilience::{CircuitBreaker, FallbackRegistry};
use crate::robots::RobotsCache;
use crate::schema::{
    CourseBasicInfo, FetchMethod, ProcessingResult, ScrapingOptions, ScrapingTarget,
};
use crate::utils::constants::CLEANUP_GRACE;
use crate::utils::host_of;
use domain::DomainGate;

/// Gauge block inside [`ManagerStats`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueStatsView {
    pub queued: usize,
    pub deferred: usize,
    pub in_flight: usize,
}

/// Snapshot returned by [`RequestManager::get_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub queue_stats: QueueStatsView,
    pub domain_stats: HashMap<String, DomainStatsEntry>,
}

/// Owns the queue, the robots cache, the per-host state, and both fetcher
/// backends. Construct once and share via `Arc`.
pub struct RequestManager {
    config: ScrapeConfig,
    robots: Arc<RobotsCache>,
    static_fetcher: Arc<dyn Fetcher>,
    dynamic_fetcher: Arc<dyn Fetcher>,
    pool: Option<Arc<BrowserPool>>,
    queue: Arc<RequestQueue>,
    gate: Arc<DomainGate>,
    breaker: Arc<CircuitBreaker>,
    fallbacks: Arc<FallbackRegistry>,
    dispatch_slots: Arc<Semaphore>,
    accepting: AtomicBool,
    in_flight: Arc<AtomicUsize>,
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    dispatcher: parking_lot::Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
}

impl RequestManager {
    /// Build a manager with real backends: a pooled headless browser for
    /// `javascript` targets and plain HTTP for everything else.
    #[must_use]
    pub fn new(config: ScrapeConfig) -> Arc<Self> {
        let pool = BrowserPool::new(PoolConfig::from_config(&config));
        pool.start_sweeper();

        let static_fetcher: Arc<dyn Fetcher> = Arc::new(StaticFetcher::new(&config));
        let dynamic_fetcher: Arc<dyn Fetcher> =
            Arc::new(DynamicFetcher::new(&config, Arc::clone(&pool)));

        Self::build(config, static_fetcher, dynamic_fetcher, Some(pool))
    }

    /// Build a manager with injected backends. The seam tests use to
    /// drive the pipeline with fake fetchers.
    #[must_use]
    pub fn with_fetchers(
        config: ScrapeConfig,
        static_fetcher: Arc<dyn Fetcher>,
        dynamic_fetcher: Arc<dyn Fetcher>,
    ) -> Arc<Self> {
        Self::build(config, static_fetcher, dynamic_fetcher, None)
    }

    fn build(
        config: ScrapeConfig,
        static_fetcher: Arc<dyn Fetcher>,
        dynamic_fetcher: Arc<dyn Fetcher>,
        pool: Option<Arc<BrowserPool>>,
    ) -> Arc<Self> {
        let robots = Arc::new(RobotsCache::new(
            config.user_agent().to_string(),
            config.robots_default_delay_ms(),
            config.robots_cache_ttl(),
        ));
        robots.start_sweeper();

        let breaker = Arc::new(CircuitBreaker::new(
            config.breaker_threshold(),
            config.breaker_reset_timeout(),
        ));

        let manager = Arc::new(Self {
            dispatch_slots: Arc::new(Semaphore::new(config.max_concurrent())),
            config,
            robots,
            static_fetcher,
            dynamic_fetcher,
            pool,
            queue: Arc::new(RequestQueue::new()),
            gate: Arc::new(DomainGate::new()),
            breaker,
            fallbacks: Arc::new(FallbackRegistry::new()),
            accepting: AtomicBool::new(true),
            in_flight: Arc::new(AtomicUsize::new(0)),
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            dispatcher: parking_lot::Mutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
        });

        let loop_handle = tokio::spawn(Self::dispatcher_loop(Arc::clone(&manager)));
        *manager.dispatcher.lock() = Some(loop_handle);

        manager
    }

    /// Submit one target and wait for its result.
    ///
    /// Robots denial, invalid URLs, and a shut-down manager fail here
    /// without ever touching the queue or a backend.
    pub async fn add_request(
        &self,
        target: ScrapingTarget,
        options: Option<ScrapingOptions>,
    ) -> ProcessingResult {
        let options = options.unwrap_or_default();
        let method = method_for(&options);
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        if !self.accepting.load(Ordering::Relaxed) {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
            return ProcessingResult::failure(
                &target.url,
                method,
                ScrapeError::Validation {
                    message: "manager is no longer accepting requests".into(),
                }
                .into_scraping_error(&target.url),
                0,
            );
        }

        if !is_scrapable_url(&target.url) {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
            return ProcessingResult::failure(
                &target.url,
                method,
                ScrapeError::Validation {
                    message: format!("target URL is not an absolute http(s) URL: {}", target.url),
                }
                .into_scraping_error(&target.url),
                0,
            );
        }

        // Robots gate. A denial is terminal and never retried; robots
        // errors come back as permissive results, so nothing throws here.
        let agent = options
            .user_agent
            .clone()
            .unwrap_or_else(|| self.config.user_agent().to_string());
        let check = self.robots.can_scrape(&target.url, &agent).await;
        if !check.allowed {
            debug!("Robots gate denied {} ({:?})", target.url, check.reason);
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
            return ProcessingResult::failure(
                &target.url,
                method,
                ScrapingError::robots_denied(&target.url),
                0,
            );
        }

        let url = target.url.clone();
        let (responder, receiver) = oneshot::channel();
        self.queue.push_new(target, options, responder);

        match receiver.await {
            Ok(result) => result,
            Err(_) => {
                // The slot was dropped without responding; surface it
                self.failed_requests.fetch_add(1, Ordering::Relaxed);
                ProcessingResult::failure(
                    &url,
                    method,
                    ScrapeError::Processing {
                        message: "request dropped before completion".into(),
                        course_id: None,
                    }
                    .into_scraping_error(&url),
                    0,
                )
            }
        }
    }

    /// Pull dispatchable slots and fan them out under the concurrency cap.
    ///
    /// The permit is taken before the pop: priority is decided among the
    /// slots dispatchable at the moment capacity frees up, so a
    /// lower-priority slot cannot reserve its place while a higher one is
    /// still arriving.
    async fn dispatcher_loop(manager: Arc<Self>) {
        'outer: loop {
            if manager.shutdown.load(Ordering::Relaxed) {
                break;
            }

            let permit = match Arc::clone(&manager.dispatch_slots).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let slot = loop {
                if manager.shutdown.load(Ordering::Relaxed) {
                    break 'outer;
                }
                if let Some(slot) = manager.queue.pop_ready() {
                    break slot;
                }
                // Sleep until new work arrives or a deferral comes due
                match manager.queue.next_deadline() {
                    Some(deadline) => {
                        tokio::select! {
                            () = manager.queue.notified() => {}
                            () = tokio::time::sleep_until(deadline.into()) => {}
                        }
                    }
                    None => manager.queue.notified().await,
                }
            };

            manager.in_flight.fetch_add(1, Ordering::SeqCst);
            let worker = Arc::clone(&manager);
            tokio::spawn(async move {
                let _permit = permit;
                worker.dispatch_slot(slot).await;
                worker.in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }

    /// One pass through breaker, domain gate, backend, and retry logic.
    async fn dispatch_slot(&self, slot: RequestSlot) {
        let url = slot.target.url.clone();
        let method = method_for(&slot.options);

        let host = match host_of(&url) {
            Ok(host) => host,
            Err(err) => {
                self.failed_requests.fetch_add(1, Ordering::Relaxed);
                slot.respond(ProcessingResult::failure(
                    &url,
                    method,
                    ScrapeError::Validation {
                        message: format!("cannot derive host: {err:#}"),
                    }
                    .into_scraping_error(&url),
                    0,
                ));
                return;
            }
        };

        // Robots precedes every dispatch, cache hit included; the policy
        // may have flipped since submission or the previous attempt.
        let agent = slot
            .options
            .user_agent
            .clone()
            .unwrap_or_else(|| self.config.user_agent().to_string());
        let check = self.robots.can_scrape(&url, &agent).await;
        if !check.allowed {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
            slot.respond(ProcessingResult::failure(
                &url,
                method,
                ScrapingError::robots_denied(&url),
                0,
            ));
            return;
        }

        // Breaker fast-fail runs before the politeness sleep: an open
        // circuit must reject without burning the crawl delay.
        if !self.breaker.should_attempt(&host) {
            debug!("Circuit open, rejecting {url} without dispatch");
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
            self.gate.record(&host, false, 0);
            slot.respond(ProcessingResult::failure(
                &url,
                method,
                ScrapingError::new(
                    ErrorKind::Network,
                    "CIRCUIT_OPEN",
                    format!("circuit breaker open for {host}"),
                    &url,
                    false,
                ),
                0,
            ));
            return;
        }

        let required_delay =
            Duration::from_millis(check.crawl_delay_ms.max(self.config.robots_default_delay_ms()));

        // Exclusive per-host dispatch; the politeness clock runs under it
        let host_permit = self.gate.acquire(&host).await;
        self.gate.wait_turn(&host, required_delay).await;

        let backend = if slot.options.javascript {
            &self.dynamic_fetcher
        } else {
            &self.static_fetcher
        };

        info!(
            "Dispatch start [{}] {} (attempt {}/{})",
            backend.method(),
            url,
            slot.attempt + 1,
            self.config.retry_max_attempts()
        );
        let dispatch_start = Instant::now();
        let result = backend.fetch(&slot.target, &slot.options).await;
        let elapsed_ms = dispatch_start.elapsed().as_millis() as u64;
        drop(host_permit);

        info!(
            "Dispatch finish [{}] {} in {elapsed_ms}ms success={}",
            backend.method(),
            url,
            result.success
        );

        if result.success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
            self.gate.record(&host, true, elapsed_ms);
            self.breaker.record_success(&host);
            slot.respond(result);
            return;
        }

        let completed_attempts = slot.attempt + 1;
        if result.is_retryable_failure() && completed_attempts < self.config.retry_max_attempts() {
            let delay = self.config.retry_policy().jittered_delay(completed_attempts);
            warn!(
                "Attempt {completed_attempts}/{} failed for {url}, retrying in {delay:?}",
                self.config.retry_max_attempts()
            );
            let mut slot = slot;
            slot.attempt = completed_attempts;
            self.queue.push_retry(slot, Instant::now() + delay);
            return;
        }

        // Terminal: exhausted or never retryable
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.gate.record(&host, false, elapsed_ms);
        let message = result
            .terminal_error()
            .map_or_else(|| "unknown error".to_string(), |e| e.message.clone());
        self.breaker.record_failure(&host, &message);

        // Graceful degradation: a fallback registered for this host stands
        // in for the failed scrape. The host still counts as failed above,
        // but the caller gets a usable record with a warning.
        if let Some(value) = self.fallbacks.get(&host) {
            warn!("Serving registered fallback for {host} after terminal failure: {message}");
            let fallback_name = slot.target.name.clone();
            slot.respond(degrade_with_fallback(
                result,
                value,
                &message,
                &host,
                &fallback_name,
            ));
            return;
        }

        slot.respond(result);
    }

    /// Fallback values for hosts, consulted when a request fails
    /// terminally. Enrichment callers share the same registry through
    /// `execute_with_fallback`.
    #[must_use]
    pub fn fallbacks(&self) -> &Arc<FallbackRegistry> {
        &self.fallbacks
    }

    /// Counters, queue gauges, and per-host statistics.
    #[must_use]
    pub fn get_stats(&self) -> ManagerStats {
        let gauges = self.queue.gauges();
        ManagerStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            queue_stats: QueueStatsView {
                queued: gauges.queued,
                deferred: gauges.deferred,
                in_flight: self.in_flight.load(Ordering::SeqCst),
            },
            domain_stats: self.gate.snapshot(),
        }
    }

    /// Zero the statistics and clear the queue. In-flight dispatches are
    /// untouched; queued callers complete with a cancellation error
    /// rather than waiting forever.
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.successful_requests.store(0, Ordering::Relaxed);
        self.failed_requests.store(0, Ordering::Relaxed);
        self.gate.reset_stats();

        for slot in self.queue.drain() {
            let url = slot.target.url.clone();
            let method = method_for(&slot.options);
            slot.respond(ProcessingResult::failure(
                &url,
                method,
                ScrapeError::Validation {
                    message: "request cancelled by reset".into(),
                }
                .into_scraping_error(&url),
                0,
            ));
        }
    }

    /// Refuse new submissions, wait for in-flight work to drain (bounded
    /// by a grace window), then tear down the dispatcher, the robots
    /// sweeper, and every pooled browser session.
    pub async fn cleanup(&self) {
        info!("Request manager cleanup: refusing new submissions");
        self.accepting.store(false, Ordering::Relaxed);

        let deadline = Instant::now() + CLEANUP_GRACE;
        while (self.in_flight.load(Ordering::SeqCst) > 0 || !self.queue.is_empty())
            && Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }

        // Anything still queued after the grace window fails out
        for slot in self.queue.drain() {
            let url = slot.target.url.clone();
            let method = method_for(&slot.options);
            slot.respond(ProcessingResult::failure(
                &url,
                method,
                ScrapeError::Validation {
                    message: "manager shut down before dispatch".into(),
                }
                .into_scraping_error(&url),
                0,
            ));
        }

        self.robots.shutdown();
        if let Some(pool) = &self.pool {
            pool.cleanup().await;
        }
        info!("Request manager cleanup complete");
    }

    /// Pool counts, when this manager owns a real browser pool.
    pub async fn browser_stats(&self) -> Option<BrowserPoolStats> {
        match &self.pool {
            Some(pool) => Some(pool.stats().await),
            None => None,
        }
    }

    /// The robots cache, for operator queries (`get_robots_info`,
    /// `clear_cache`, `cache_stats`).
    #[must_use]
    pub fn robots(&self) -> &Arc<RobotsCache> {
        &self.robots
    }
}

/// Turn a terminal failure into a degraded success built from the host's
/// registered fallback value. The failure itself moves into `warnings`.
fn degrade_with_fallback(
    failed: ProcessingResult,
    value: serde_json::Value,
    failure_message: &str,
    host: &str,
    fallback_name: &str,
) -> ProcessingResult {
    let mut data: CourseBasicInfo = serde_json::from_value(value).unwrap_or_default();
    if data.name.is_none() && !fallback_name.is_empty() {
        data.name = Some(fallback_name.to_string());
    }

    let mut degraded = failed;
    degraded.success = true;
    degraded.errors.clear();
    degraded.warnings.push(format!(
        "Scrape failed ({failure_message}); served registered fallback for {host}"
    ));
    degraded.data = Some(data);
    degraded.confidence = 0;
    degraded
}

fn method_for(options: &ScrapingOptions) -> FetchMethod {
    if options.javascript {
        FetchMethod::Dynamic
    } else {
        FetchMethod::Static
    }
}

fn is_scrapable_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|parsed| matches!(parsed.scheme(), "http" | "https"))
}
