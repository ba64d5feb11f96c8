//! Error taxonomy shared by the request manager, the fetcher backends, and
//! enrichment callers.
//!
//! Two layers live here. [`ScrapeError`] is the internal, structured error
//! the components raise and match on. [`ScrapingError`] is the wire-level
//! classification carried inside a `ProcessingResult`, with a coarse
//! [`ErrorKind`] tag and a `retryable` flag that drives retry decisions;
//! retry logic keys off that flag, never off error identity.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Coarse classification tags carried in results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Network,
    Timeout,
    Parsing,
    Javascript,
    Browser,
    #[serde(rename = "ratelimit")]
    RateLimit,
    Robots,
    Unknown,
}

/// Classified error as surfaced in `ProcessingResult.errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapingError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    /// Short machine-readable code, e.g. `HTTP_404` or `NAV_TIMEOUT`.
    pub code: String,
    pub message: String,
    pub url: String,
    pub status_code: Option<u16>,
    pub retryable: bool,
}

impl ScrapingError {
    #[must_use]
    pub fn new(
        kind: ErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
        url: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            url: url.into(),
            status_code: None,
            retryable,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// The terminal robots-denial error.
    #[must_use]
    pub fn robots_denied(url: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Robots,
            "ROBOTS_DISALLOWED",
            "Robots.txt disallows scraping",
            url,
            false,
        )
    }
}

impl std::fmt::Display for ScrapingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} ({})", self.code, self.message, self.url)
    }
}

/// Structured error raised inside the scraping core and by enrichment
/// callers reusing the resilience primitives.
///
/// `is_operational` distinguishes expected runtime failures (network
/// flakiness, bad pages) from programmer errors; only operational errors
/// are candidates for retry or degradation.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("Network error: {message}")]
    Network {
        message: String,
        url: Option<String>,
        status: Option<u16>,
    },

    #[error("{operation} timeout after {}ms", timeout.as_millis())]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("Parse error: {message}")]
    Parse {
        message: String,
        url: Option<String>,
    },

    #[error("Rate limited (service={service:?}, retry_after={retry_after:?})")]
    RateLimit {
        retry_after: Option<Duration>,
        service: Option<String>,
    },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Filesystem error at {path}: {message}")]
    FileSystem { message: String, path: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Scraping error for {url}: {message}")]
    Scraping {
        message: String,
        url: String,
        course_id: Option<String>,
    },

    #[error("API error from {service}: {message}")]
    Api { service: String, message: String },

    #[error("Processing error: {message}")]
    Processing {
        message: String,
        course_id: Option<String>,
    },

    #[error("Browser error: {message}")]
    Browser { message: String },

    #[error("Robots policy for {url}: {message}")]
    Robots { url: String, message: String },
}

impl ScrapeError {
    /// Expected runtime failure, as opposed to a programmer error.
    ///
    /// Non-operational errors must not be retried and may, in production,
    /// escalate to process exit.
    #[must_use]
    pub const fn is_operational(&self) -> bool {
        !matches!(
            self,
            Self::Validation { .. } | Self::Configuration { .. } | Self::Processing { .. }
        )
    }

    /// Whether another attempt could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { status, .. } => !matches!(status, Some(403 | 404 | 410)),
            Self::Timeout { .. } | Self::RateLimit { .. } | Self::Browser { .. } => true,
            Self::Api { .. } | Self::Scraping { .. } => true,
            Self::Parse { .. }
            | Self::Validation { .. }
            | Self::FileSystem { .. }
            | Self::Configuration { .. }
            | Self::Processing { .. }
            | Self::Robots { .. } => false,
        }
    }

    /// The wire-level tag this error maps to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } | Self::RateLimit { .. } => ErrorKind::Network,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Parse { .. } => ErrorKind::Parsing,
            Self::Browser { .. } => ErrorKind::Browser,
            Self::Robots { .. } => ErrorKind::Robots,
            Self::Scraping { .. } | Self::Api { .. } => ErrorKind::Network,
            Self::Validation { .. }
            | Self::FileSystem { .. }
            | Self::Configuration { .. }
            | Self::Processing { .. } => ErrorKind::Unknown,
        }
    }

    /// Short machine-readable code for the wire error.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::Network {
                status: Some(status),
                ..
            } => format!("HTTP_{status}"),
            Self::Network { .. } => "NETWORK".into(),
            Self::Timeout { .. } => "TIMEOUT".into(),
            Self::Parse { .. } => "PARSE".into(),
            Self::RateLimit { .. } => "RATE_LIMIT".into(),
            Self::Validation { .. } => "VALIDATION".into(),
            Self::FileSystem { .. } => "FILESYSTEM".into(),
            Self::Configuration { .. } => "CONFIGURATION".into(),
            Self::Scraping { .. } => "SCRAPING".into(),
            Self::Api { .. } => "API".into(),
            Self::Processing { .. } => "PROCESSING".into(),
            Self::Browser { .. } => "BROWSER".into(),
            Self::Robots { .. } => "ROBOTS_DISALLOWED".into(),
        }
    }

    /// Convert into the wire-level classification for a given request URL.
    #[must_use]
    pub fn into_scraping_error(self, url: &str) -> ScrapingError {
        let retryable = self.is_retryable();
        let status = match &self {
            Self::Network { status, .. } => *status,
            _ => None,
        };
        let mut wire = ScrapingError::new(self.kind(), self.code(), self.to_string(), url, retryable);
        wire.status_code = status;
        wire
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                operation: "HTTP request".into(),
                timeout: Duration::ZERO,
            }
        } else {
            Self::Network {
                message: err.to_string(),
                url: err.url().map(|u| u.to_string()),
                status: err.status().map(|s| s.as_u16()),
            }
        }
    }
}

/// Classify an unstructured error into a wire tag from message patterns.
///
/// Used for exceptions escaping the backends that were not raised as
/// [`ScrapeError`], chromiumoxide and IPC errors mostly.
#[must_use]
pub fn classify_message(message: &str) -> ErrorKind {
    let msg = message.to_lowercase();

    if msg.contains("429") || msg.contains("too many requests") || msg.contains("rate limit") {
        return ErrorKind::RateLimit;
    }

    if msg.contains("timeout") || msg.contains("timed out") {
        return ErrorKind::Timeout;
    }

    if msg.contains("connection refused")
        || msg.contains("connection reset")
        || msg.contains("dns")
        || msg.contains("network")
        || msg.contains("unreachable")
        || msg.contains("eof")
    {
        return ErrorKind::Network;
    }

    if msg.contains("browser")
        || msg.contains("chrome")
        || msg.contains("cdp")
        || msg.contains("target")
        || msg.contains("session")
    {
        return ErrorKind::Browser;
    }

    if msg.contains("script") || msg.contains("evaluate") || msg.contains("javascript") {
        return ErrorKind::Javascript;
    }

    if msg.contains("parse") || msg.contains("selector") || msg.contains("html") {
        return ErrorKind::Parsing;
    }

    ErrorKind::Unknown
}

/// Wrap an uncategorized backend exception as a retryable wire error.
#[must_use]
pub fn classify_unexpected(err: &anyhow::Error, url: &str) -> ScrapingError {
    let message = format!("{err:#}");
    let kind = classify_message(&message);
    // Uncategorized exceptions are retried; only an explicit non-retryable
    // classification from a backend is terminal.
    ScrapingError::new(kind, "UNCLASSIFIED", message, url, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_hard_failures_not_retryable() {
        for status in [403u16, 404, 410] {
            let err = ScrapeError::Network {
                message: format!("HTTP {status}"),
                url: None,
                status: Some(status),
            };
            assert!(!err.is_retryable(), "HTTP {status} must not retry");
        }

        let err = ScrapeError::Network {
            message: "HTTP 500".into(),
            url: None,
            status: Some(500),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_robots_denial_terminal() {
        let wire = ScrapingError::robots_denied("https://example.com/admin");
        assert_eq!(wire.kind, ErrorKind::Robots);
        assert!(!wire.retryable);
        assert!(wire.message.contains("disallows"));
    }

    #[test]
    fn test_classify_message_patterns() {
        assert_eq!(classify_message("Navigation timeout after 30s"), ErrorKind::Timeout);
        assert_eq!(classify_message("connection refused"), ErrorKind::Network);
        assert_eq!(classify_message("chrome crashed"), ErrorKind::Browser);
        assert_eq!(classify_message("HTTP 429 Too Many Requests"), ErrorKind::RateLimit);
        assert_eq!(classify_message("invalid selector syntax"), ErrorKind::Parsing);
        assert_eq!(classify_message("something odd"), ErrorKind::Unknown);
    }

    #[test]
    fn test_wire_conversion_preserves_status() {
        let err = ScrapeError::Network {
            message: "HTTP 404 Not Found".into(),
            url: Some("https://example.com/gone".into()),
            status: Some(404),
        };
        let wire = err.into_scraping_error("https://example.com/gone");
        assert_eq!(wire.status_code, Some(404));
        assert_eq!(wire.code, "HTTP_404");
        assert!(!wire.retryable);
    }

    #[test]
    fn test_operational_flag() {
        assert!(ScrapeError::Network {
            message: "reset".into(),
            url: None,
            status: None
        }
        .is_operational());
        assert!(!ScrapeError::Validation {
            message: "bad target".into()
        }
        .is_operational());
    }

    #[test]
    fn test_error_kind_serde_tags() {
        let wire = ScrapingError::new(ErrorKind::RateLimit, "RATE_LIMIT", "slow down", "u", true);
        let json = serde_json::to_value(&wire).expect("serialize");
        assert_eq!(json["type"], "ratelimit");
    }
}
