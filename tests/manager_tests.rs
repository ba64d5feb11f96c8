//! End-to-end pipeline tests for the request manager
//!
//! Backends are faked through the `Fetcher` seam; robots.txt is served by
//! mockito so the robots gate runs against real HTTP.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use coursescrape::errors::{ErrorKind, ScrapingError};
use coursescrape::fetcher::Fetcher;
use coursescrape::{
    FetchMethod, Priority, ProcessingResult, RequestManager, ScrapeConfig, ScrapingOptions,
    ScrapingTarget,
};
use tempfile::TempDir;

/// Scripted backend: calls the behavior with the 1-based invocation count.
struct FakeFetcher {
    method: FetchMethod,
    calls: AtomicU32,
    order: Mutex<Vec<String>>,
    delay: Duration,
    behavior: Box<dyn Fn(u32, &ScrapingTarget) -> ProcessingResult + Send + Sync>,
}

impl FakeFetcher {
    fn new(
        method: FetchMethod,
        delay: Duration,
        behavior: impl Fn(u32, &ScrapingTarget) -> ProcessingResult + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            method,
            calls: AtomicU32::new(0),
            order: Mutex::new(Vec::new()),
            delay,
            behavior: Box::new(behavior),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn order(&self) -> Vec<String> {
        self.order.lock().expect("order lock").clone()
    }
}

impl Fetcher for FakeFetcher {
    fn method(&self) -> FetchMethod {
        self.method
    }

    fn fetch<'a>(
        &'a self,
        target: &'a ScrapingTarget,
        _options: &'a ScrapingOptions,
    ) -> BoxFuture<'a, ProcessingResult> {
        async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.order
                .lock()
                .expect("order lock")
                .push(target.id.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.behavior)(call, target)
        }
        .boxed()
    }
}

fn success_result(target: &ScrapingTarget, method: FetchMethod) -> ProcessingResult {
    let mut result = ProcessingResult::failure(&target.url, method, placeholder_error(target), 5);
    result.success = true;
    result.errors.clear();
    result.confidence = 40;
    result
}

fn placeholder_error(target: &ScrapingTarget) -> ScrapingError {
    ScrapingError::new(
        ErrorKind::Unknown,
        "PLACEHOLDER",
        "placeholder",
        &target.url,
        false,
    )
}

fn retryable_timeout(target: &ScrapingTarget, method: FetchMethod) -> ProcessingResult {
    ProcessingResult::failure(
        &target.url,
        method,
        ScrapingError::new(
            ErrorKind::Timeout,
            "TIMEOUT",
            "Network timeout",
            &target.url,
            true,
        ),
        5,
    )
}

fn hard_404(target: &ScrapingTarget, method: FetchMethod) -> ProcessingResult {
    ProcessingResult::failure(
        &target.url,
        method,
        ScrapingError::new(ErrorKind::Network, "HTTP_404", "HTTP 404", &target.url, false)
            .with_status(404),
        5,
    )
}

struct Harness {
    server: mockito::ServerGuard,
    _robots_mock: mockito::Mock,
    _media: TempDir,
    config: ScrapeConfig,
}

/// Server with a permissive robots.txt (404) plus a tuned config.
async fn harness(domain_delay_ms: u64) -> Harness {
    let mut server = mockito::Server::new_async().await;
    let robots_mock = server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;

    let media = TempDir::new().expect("tempdir");
    let config = ScrapeConfig::builder()
        .media_dir(media.path().to_path_buf())
        .robots_default_delay_ms(domain_delay_ms)
        .retry_base_delay_ms(50)
        .retry_max_delay_ms(500)
        .build()
        .expect("config builds");

    Harness {
        server,
        _robots_mock: robots_mock,
        _media: media,
        config,
    }
}

fn target_on(server: &mockito::ServerGuard, id: &str, path: &str) -> ScrapingTarget {
    ScrapingTarget::new(id, format!("Course {id}"), format!("{}{path}", server.url()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_happy_path_static() {
    let harness = harness(0).await;
    let fake = FakeFetcher::new(FetchMethod::Static, Duration::ZERO, |_, t| {
        success_result(t, FetchMethod::Static)
    });
    let dynamic = FakeFetcher::new(FetchMethod::Dynamic, Duration::ZERO, |_, t| {
        success_result(t, FetchMethod::Dynamic)
    });
    let manager =
        RequestManager::with_fetchers(harness.config.clone(), fake.clone(), dynamic.clone());

    let result = manager
        .add_request(target_on(&harness.server, "c1", "/golf"), None)
        .await;

    assert!(result.success);
    assert_eq!(fake.calls(), 1);
    assert_eq!(dynamic.calls(), 0);

    let stats = manager.get_stats();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.successful_requests, 1);
    assert_eq!(stats.failed_requests, 0);
    let host_stats = stats.domain_stats.get("127.0.0.1").expect("host stats");
    assert_eq!(host_stats.success, 1);
    assert_eq!(host_stats.failure, 0);

    manager.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_javascript_option_routes_to_dynamic() {
    let harness = harness(0).await;
    let static_fake = FakeFetcher::new(FetchMethod::Static, Duration::ZERO, |_, t| {
        success_result(t, FetchMethod::Static)
    });
    let dynamic_fake = FakeFetcher::new(FetchMethod::Dynamic, Duration::ZERO, |_, t| {
        success_result(t, FetchMethod::Dynamic)
    });
    let manager = RequestManager::with_fetchers(
        harness.config.clone(),
        static_fake.clone(),
        dynamic_fake.clone(),
    );

    let options = ScrapingOptions {
        javascript: true,
        wait_for_selector: Some(".course-data".into()),
        ..ScrapingOptions::default()
    };
    let result = manager
        .add_request(target_on(&harness.server, "spa", "/app"), Some(options))
        .await;

    assert!(result.success);
    assert_eq!(result.metadata.method, FetchMethod::Dynamic);
    assert_eq!(dynamic_fake.calls(), 1);
    assert_eq!(static_fake.calls(), 0);

    manager.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_robots_denial_never_reaches_backend() {
    let mut server = mockito::Server::new_async().await;
    let _robots_mock = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /admin\n")
        .create_async()
        .await;

    let media = TempDir::new().expect("tempdir");
    let config = ScrapeConfig::builder()
        .media_dir(media.path().to_path_buf())
        .robots_default_delay_ms(0)
        .build()
        .expect("config builds");

    let fake = FakeFetcher::new(FetchMethod::Static, Duration::ZERO, |_, t| {
        success_result(t, FetchMethod::Static)
    });
    let manager = RequestManager::with_fetchers(config, fake.clone(), fake.clone());

    let result = manager
        .add_request(target_on(&server, "denied", "/admin/users"), None)
        .await;

    assert!(!result.success);
    let error = result.terminal_error().expect("terminal error");
    assert_eq!(error.kind, ErrorKind::Robots);
    assert!(!error.retryable);
    assert_eq!(error.message, "Robots.txt disallows scraping");
    assert_eq!(fake.calls(), 0);

    manager.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_transient_failure_then_success() {
    let harness = harness(0).await;
    let fake = FakeFetcher::new(FetchMethod::Static, Duration::ZERO, |call, t| {
        if call < 3 {
            retryable_timeout(t, FetchMethod::Static)
        } else {
            success_result(t, FetchMethod::Static)
        }
    });
    let manager = RequestManager::with_fetchers(harness.config.clone(), fake.clone(), fake.clone());

    let started = Instant::now();
    let result = manager
        .add_request(target_on(&harness.server, "flaky", "/course"), None)
        .await;

    assert!(result.success);
    assert_eq!(fake.calls(), 3);
    // Two backoff sleeps at base 50ms: >= 50ms and >= 100ms
    assert!(started.elapsed() >= Duration::from_millis(150));

    let stats = manager.get_stats();
    assert_eq!(stats.successful_requests, 1);
    assert_eq!(stats.failed_requests, 0);

    manager.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_http_404_single_attempt() {
    let harness = harness(0).await;
    let fake = FakeFetcher::new(FetchMethod::Static, Duration::ZERO, |_, t| {
        hard_404(t, FetchMethod::Static)
    });
    let manager = RequestManager::with_fetchers(harness.config.clone(), fake.clone(), fake.clone());

    let result = manager
        .add_request(target_on(&harness.server, "gone", "/gone"), None)
        .await;

    assert!(!result.success);
    assert_eq!(fake.calls(), 1);
    assert_eq!(manager.get_stats().failed_requests, 1);

    manager.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_registered_fallback_degrades_terminal_failure() {
    let harness = harness(0).await;
    let fake = FakeFetcher::new(FetchMethod::Static, Duration::ZERO, |_, t| {
        hard_404(t, FetchMethod::Static)
    });
    let manager = RequestManager::with_fetchers(harness.config.clone(), fake.clone(), fake.clone());

    manager.fallbacks().register(
        "127.0.0.1",
        serde_json::json!({
            "name": "Cached Pine Hollow",
            "description": "From the last directory import",
            "architect": null
        }),
    );

    let result = manager
        .add_request(target_on(&harness.server, "fb", "/gone"), None)
        .await;

    // The scrape failed, but the registered fallback stands in
    assert!(result.success);
    assert!(result.errors.is_empty());
    assert_eq!(
        result.data.expect("fallback data").name.as_deref(),
        Some("Cached Pine Hollow")
    );
    assert!(result.warnings.iter().any(|w| w.contains("fallback")));
    assert_eq!(result.confidence, 0);
    // Host health accounting still records the failure
    assert_eq!(manager.get_stats().failed_requests, 1);
    let stats = manager.get_stats();
    let host_stats = stats.domain_stats.get("127.0.0.1").expect("host stats");
    assert_eq!(host_stats.failure, 1);

    manager.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_retry_exhaustion_surfaces_last_error() {
    let harness = harness(0).await;
    let fake = FakeFetcher::new(FetchMethod::Static, Duration::ZERO, |_, t| {
        retryable_timeout(t, FetchMethod::Static)
    });
    let manager = RequestManager::with_fetchers(harness.config.clone(), fake.clone(), fake.clone());

    let result = manager
        .add_request(target_on(&harness.server, "dead", "/always-down"), None)
        .await;

    assert!(!result.success);
    assert_eq!(fake.calls(), 3);
    let error = result.terminal_error().expect("terminal error");
    assert_eq!(error.kind, ErrorKind::Timeout);
    assert!(error.retryable);

    manager.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_circuit_breaker_trips_and_fast_fails() {
    // A real politeness delay, to prove the sixth request skips it
    let harness = harness(300).await;
    let fake = FakeFetcher::new(FetchMethod::Static, Duration::ZERO, |_, t| {
        hard_404(t, FetchMethod::Static)
    });
    let manager = RequestManager::with_fetchers(harness.config.clone(), fake.clone(), fake.clone());

    for n in 0..5 {
        let result = manager
            .add_request(
                target_on(&harness.server, &format!("f{n}"), "/failing"),
                None,
            )
            .await;
        assert!(!result.success);
    }
    assert_eq!(fake.calls(), 5);

    let started = Instant::now();
    let result = manager
        .add_request(target_on(&harness.server, "f6", "/failing"), None)
        .await;

    assert!(!result.success);
    // Rejected before the domain gate: no 300ms politeness sleep
    assert!(started.elapsed() < Duration::from_millis(150));
    assert_eq!(fake.calls(), 5, "sixth request must not touch the backend");
    let error = result.terminal_error().expect("terminal error");
    assert_eq!(error.kind, ErrorKind::Network);
    assert!(!error.retryable);
    assert!(error.message.contains("circuit"));

    manager.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_domain_delay_spaces_dispatches() {
    let harness = harness(300).await;
    let fake = FakeFetcher::new(FetchMethod::Static, Duration::ZERO, |_, t| {
        success_result(t, FetchMethod::Static)
    });
    let manager = RequestManager::with_fetchers(harness.config.clone(), fake.clone(), fake.clone());

    let started = Instant::now();
    let (a, b, c) = tokio::join!(
        manager.add_request(target_on(&harness.server, "a", "/1"), None),
        manager.add_request(target_on(&harness.server, "b", "/2"), None),
        manager.add_request(target_on(&harness.server, "c", "/3"), None),
    );

    assert!(a.success && b.success && c.success);
    // Two inter-dispatch gaps of >= 300ms on one host
    assert!(started.elapsed() >= Duration::from_millis(600));

    let stats = manager.get_stats();
    let host_stats = stats.domain_stats.get("127.0.0.1").expect("host stats");
    assert_eq!(host_stats.success, 3);

    manager.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_priority_order_under_contention() {
    let harness = harness(0).await;
    let fake = FakeFetcher::new(FetchMethod::Static, Duration::from_millis(200), |_, t| {
        success_result(t, FetchMethod::Static)
    });
    let media = TempDir::new().expect("tempdir");
    let config = ScrapeConfig::builder()
        .media_dir(media.path().to_path_buf())
        .robots_default_delay_ms(0)
        .max_concurrent(1)
        .build()
        .expect("config builds");
    let manager = RequestManager::with_fetchers(config, fake.clone(), fake.clone());

    let m1 = Arc::clone(&manager);
    let low_target = target_on(&harness.server, "low", "/low");
    let low = tokio::spawn(async move {
        m1.add_request(low_target.with_priority(Priority::Low), None)
            .await
    });
    // Let "low" enter dispatch, then queue the other two behind it
    tokio::time::sleep(Duration::from_millis(80)).await;

    let m2 = Arc::clone(&manager);
    let medium_target = target_on(&harness.server, "medium", "/medium");
    let medium = tokio::spawn(async move {
        m2.add_request(medium_target.with_priority(Priority::Medium), None)
            .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let m3 = Arc::clone(&manager);
    let critical_target = target_on(&harness.server, "critical", "/critical");
    let critical = tokio::spawn(async move {
        m3.add_request(critical_target.with_priority(Priority::Critical), None)
            .await
    });

    let (low, medium, critical) = tokio::join!(low, medium, critical);
    assert!(low.expect("join").success);
    assert!(medium.expect("join").success);
    assert!(critical.expect("join").success);

    // Critical overtakes medium even though medium enqueued first
    assert_eq!(fake.order(), vec!["low", "critical", "medium"]);

    manager.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reset_cancels_queued_requests() {
    let harness = harness(0).await;
    let fake = FakeFetcher::new(FetchMethod::Static, Duration::from_millis(400), |_, t| {
        success_result(t, FetchMethod::Static)
    });
    let media = TempDir::new().expect("tempdir");
    let config = ScrapeConfig::builder()
        .media_dir(media.path().to_path_buf())
        .robots_default_delay_ms(0)
        .max_concurrent(1)
        .build()
        .expect("config builds");
    let manager = RequestManager::with_fetchers(config, fake.clone(), fake.clone());

    let m1 = Arc::clone(&manager);
    let first_target = target_on(&harness.server, "in-flight", "/1");
    let first = tokio::spawn(async move { m1.add_request(first_target, None).await });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let m2 = Arc::clone(&manager);
    let queued_target = target_on(&harness.server, "queued", "/2");
    let queued = tokio::spawn(async move { m2.add_request(queued_target, None).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    manager.reset();

    let queued = queued.await.expect("join");
    assert!(!queued.success);
    assert!(queued
        .terminal_error()
        .expect("terminal error")
        .message
        .contains("reset"));

    // In-flight work is untouched by reset
    let first = first.await.expect("join");
    assert!(first.success);

    manager.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cleanup_refuses_new_submissions() {
    let harness = harness(0).await;
    let fake = FakeFetcher::new(FetchMethod::Static, Duration::ZERO, |_, t| {
        success_result(t, FetchMethod::Static)
    });
    let manager = RequestManager::with_fetchers(harness.config.clone(), fake.clone(), fake.clone());

    manager.cleanup().await;

    let result = manager
        .add_request(target_on(&harness.server, "late", "/late"), None)
        .await;
    assert!(!result.success);
    assert!(result
        .terminal_error()
        .expect("terminal error")
        .message
        .contains("no longer accepting"));
    assert_eq!(fake.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invalid_url_rejected_without_dispatch() {
    let harness = harness(0).await;
    let fake = FakeFetcher::new(FetchMethod::Static, Duration::ZERO, |_, t| {
        success_result(t, FetchMethod::Static)
    });
    let manager = RequestManager::with_fetchers(harness.config.clone(), fake.clone(), fake.clone());

    let result = manager
        .add_request(ScrapingTarget::new("bad", "Bad", "not-a-url"), None)
        .await;

    assert!(!result.success);
    assert_eq!(fake.calls(), 0);
    assert_eq!(manager.get_stats().failed_requests, 1);

    manager.cleanup().await;
}
