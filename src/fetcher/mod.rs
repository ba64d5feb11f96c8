//! Fetcher backends
//!
//! The manager talks to backends through the [`Fetcher`] capability: one
//! operation, `fetch(target, options) -> ProcessingResult`. The static
//! HTTP backend lives here; the headless-browser backend lives in
//! [`crate::browser`] next to the pool it borrows pages from. A fake
//! implementation is all tests need to drive the manager.

pub mod extract;
pub mod static_fetcher;

pub use static_fetcher::StaticFetcher;

use futures::future::BoxFuture;

use crate::schema::{FetchMethod, ProcessingResult, ScrapingOptions, ScrapingTarget};

/// Capability exposed by the static and dynamic backends.
///
/// Implementations never fail at the type level: every outcome, including
/// errors, is carried inside the returned `ProcessingResult`.
pub trait Fetcher: Send + Sync {
    /// Which backend this is, for result metadata and dispatch logging.
    fn method(&self) -> FetchMethod;

    /// Fetch one target and extract a course record from it.
    fn fetch<'a>(
        &'a self,
        target: &'a ScrapingTarget,
        options: &'a ScrapingOptions,
    ) -> BoxFuture<'a, ProcessingResult>;
}
