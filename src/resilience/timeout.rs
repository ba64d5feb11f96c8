//! Timeout wrapper for network and browser operations
//!
//! Every outbound call in the core runs under a deadline; elapsing the
//! deadline produces a typed [`ScrapeError::Timeout`] instead of an
//! indefinite hang.

use std::future::Future;
use std::time::Duration;

use crate::errors::ScrapeError;

/// Run `operation` with a deadline.
///
/// `operation_name` is carried into the error for log and result context.
pub async fn with_timeout<T, Fut>(
    operation: Fut,
    timeout: Duration,
    operation_name: &str,
) -> Result<T, ScrapeError>
where
    Fut: Future<Output = Result<T, ScrapeError>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(ScrapeError::Timeout {
            operation: operation_name.to_string(),
            timeout,
        }),
    }
}
