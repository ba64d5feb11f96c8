//! Tests for the type-safe configuration builder pattern

use std::time::Duration;

use coursescrape::ScrapeConfig;
use tempfile::TempDir;

#[test]
fn test_builder_requires_media_dir() {
    // This should not compile if uncommented - testing compile-time guarantees
    // let config = ScrapeConfig::builder().build();

    // This SHOULD compile - the required field is provided
    let temp_dir = TempDir::new().expect("tempdir");
    let config = ScrapeConfig::builder()
        .media_dir(temp_dir.path().to_path_buf())
        .build()
        .expect("config builds");

    assert_eq!(config.media_dir(), temp_dir.path());
}

#[test]
fn test_defaults_match_documented_tunables() {
    let temp_dir = TempDir::new().expect("tempdir");
    let config = ScrapeConfig::builder()
        .media_dir(temp_dir.path().to_path_buf())
        .build()
        .expect("config builds");

    assert_eq!(config.robots_default_delay_ms(), 2_000);
    assert_eq!(config.robots_cache_ttl(), Duration::from_secs(24 * 60 * 60));
    assert_eq!(config.static_timeout(), Duration::from_secs(30));
    assert_eq!(config.page_timeout(), Duration::from_secs(30));
    assert_eq!(config.max_browsers(), 3);
    assert_eq!(config.max_pages_per_browser(), 5);
    assert_eq!(config.session_timeout(), Duration::from_secs(30 * 60));
    assert_eq!(config.max_requests_per_browser(), 50);
    assert_eq!(config.retry_max_attempts(), 3);
    assert_eq!(config.breaker_threshold(), 5);
    assert_eq!(config.breaker_reset_timeout(), Duration::from_secs(60));
    assert!(config.headless());
    assert!(config.browser_executable().is_none());

    let policy = config.retry_policy();
    assert_eq!(policy.base_delay, Duration::from_millis(1_000));
    assert_eq!(policy.max_delay, Duration::from_millis(10_000));
    assert!((policy.factor - 2.0).abs() < f64::EPSILON);
}

#[test]
fn test_builder_overrides() {
    let temp_dir = TempDir::new().expect("tempdir");
    let config = ScrapeConfig::builder()
        .media_dir(temp_dir.path().to_path_buf())
        .user_agent("TeeTimeBot/1.0")
        .robots_default_delay_ms(500)
        .max_browsers(1)
        .max_pages_per_browser(2)
        .retry_max_attempts(5)
        .breaker_threshold(2)
        .breaker_reset_timeout_secs(10)
        .max_concurrent(4)
        .headless(false)
        .browser_executable("/usr/bin/chromium")
        .build()
        .expect("config builds");

    assert_eq!(config.user_agent(), "TeeTimeBot/1.0");
    assert_eq!(config.robots_default_delay_ms(), 500);
    assert_eq!(config.max_browsers(), 1);
    assert_eq!(config.max_pages_per_browser(), 2);
    assert_eq!(config.retry_max_attempts(), 5);
    assert_eq!(config.breaker_threshold(), 2);
    assert_eq!(config.breaker_reset_timeout(), Duration::from_secs(10));
    assert_eq!(config.max_concurrent(), 4);
    assert!(!config.headless());
    assert_eq!(
        config.browser_executable().map(|p| p.display().to_string()),
        Some("/usr/bin/chromium".to_string())
    );
}

#[test]
fn test_validation_rejects_bad_ranges() {
    let temp_dir = TempDir::new().expect("tempdir");

    assert!(ScrapeConfig::builder()
        .media_dir(temp_dir.path().to_path_buf())
        .max_browsers(0)
        .build()
        .is_err());

    assert!(ScrapeConfig::builder()
        .media_dir(temp_dir.path().to_path_buf())
        .retry_factor(0.5)
        .build()
        .is_err());

    assert!(ScrapeConfig::builder()
        .media_dir(temp_dir.path().to_path_buf())
        .retry_base_delay_ms(5_000)
        .retry_max_delay_ms(1_000)
        .build()
        .is_err());

    assert!(ScrapeConfig::builder()
        .media_dir(temp_dir.path().to_path_buf())
        .user_agent("   ")
        .build()
        .is_err());
}
