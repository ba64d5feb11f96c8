//! Headless-browser backend: executable discovery, the bounded session
//! pool, and the dynamic fetcher built on top of it.

pub mod dynamic;
pub mod js_scripts;
pub mod launch;
pub mod pool;

pub use dynamic::DynamicFetcher;
pub use launch::{download_managed_browser, find_browser_executable, launch_browser};
pub use pool::{BrowserPool, BrowserPoolStats, PageGuard, PoolConfig};
