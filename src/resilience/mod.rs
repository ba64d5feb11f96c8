//! Resilience primitives shared by the request manager and enrichment
//! callers: retry with backoff, circuit breaking, timeouts, and fallbacks.

pub mod circuit_breaker;
pub mod fallback;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{BreakerHealth, CircuitBreaker, CircuitState};
pub use fallback::FallbackRegistry;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use timeout::with_timeout;
