//! coursescrape: polite, concurrent scraping core for golf-course data.
//!
//! A caller submits a [`ScrapingTarget`] to a [`RequestManager`]; the
//! manager consults the per-host robots policy cache, spaces dispatches by
//! the effective crawl delay, trips circuit breakers on repeat failures,
//! and hands the target to either the lightweight HTTP fetcher or the
//! pooled headless-browser fetcher. Either way the caller gets back one
//! [`ProcessingResult`].
//!
//! ```rust,no_run
//! use coursescrape::{RequestManager, ScrapeConfig, ScrapingTarget};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ScrapeConfig::builder().media_dir("./media").build()?;
//! let manager = RequestManager::new(config);
//!
//! let target = ScrapingTarget::new("c1", "Pine Hollow", "https://example.com/golf");
//! let result = manager.add_request(target, None).await;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//!
//! manager.cleanup().await;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod errors;
pub mod fetcher;
pub mod manager;
pub mod resilience;
pub mod robots;
pub mod schema;
pub mod utils;

pub use browser::{BrowserPool, BrowserPoolStats, DynamicFetcher, PoolConfig};
pub use config::{ScrapeConfig, ScrapeConfigBuilder};
pub use errors::{ErrorKind, ScrapeError, ScrapingError};
pub use fetcher::{Fetcher, StaticFetcher};
pub use manager::{ManagerStats, RequestManager};
pub use resilience::{retry_with_backoff, CircuitBreaker, CircuitState, FallbackRegistry, RetryPolicy};
pub use robots::{validate_robots_txt, RobotsCache, RobotsCheckResult, RobotsDirective};
pub use schema::{
    ContactInfo, CourseBasicInfo, CourseImages, FetchMethod, Priority, ProcessingResult,
    ResultMetadata, ScrapingOptions, ScrapingTarget, SourceType, Viewport,
};
