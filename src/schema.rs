//! Core record types exchanged between the request manager, the fetcher
//! backends, and downstream consumers.
//!
//! Everything here is plain serde-serializable data: the manager owns all
//! mutable state, and callers only ever see these snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ScrapingError;

/// Dispatch priority for a scraping target.
///
/// Higher priorities dispatch first when several slots are simultaneously
/// dispatchable; within one priority the queue is FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Numeric weight used for queue ordering.
    #[must_use]
    pub const fn weight(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Where a target URL came from, for provenance tracking downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// The course's own website.
    Official,
    /// A course directory or aggregator listing.
    Directory,
    /// Municipal / parks department page.
    Municipal,
    /// Resort or club umbrella site.
    Resort,
    /// Anything else.
    Other,
}

impl Default for SourceType {
    fn default() -> Self {
        Self::Other
    }
}

/// An immutable scraping request descriptor.
///
/// `id` must be unique among in-flight requests of a single manager; `url`
/// must be an absolute http(s) URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingTarget {
    pub id: String,
    /// Display name, also the extraction fallback for the course name.
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub source_type: SourceType,
}

impl ScrapingTarget {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            priority: Priority::default(),
            source_type: SourceType::default(),
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }
}

/// Viewport dimensions for headless pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Per-request overrides. Every field is optional; the manager and the
/// backends fill in configured defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapingOptions {
    /// Overall fetch / navigation timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
    /// Force the headless-browser backend.
    #[serde(default)]
    pub javascript: bool,
    /// CSS selector to wait for before extracting (dynamic backend only).
    pub wait_for_selector: Option<String>,
    /// Settle time after navigation, milliseconds.
    pub wait_time_ms: Option<u64>,
    /// Capture a full-page screenshot into the media directory.
    #[serde(default)]
    pub screenshots: bool,
    pub viewport: Option<Viewport>,
}

/// Structured course facts pulled out of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseBasicInfo {
    pub name: Option<String>,
    pub description: Option<String>,
    pub architect: Option<String>,
}

/// Contact details for the course.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Image URLs grouped by role, all resolved to absolute URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseImages {
    pub hero: Vec<String>,
    pub gallery: Vec<String>,
    pub course_map: Vec<String>,
    pub aerial: Vec<String>,
    pub amenities: Vec<String>,
}

impl CourseImages {
    /// Total image URLs across all groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hero.len()
            + self.gallery.len()
            + self.course_map.len()
            + self.aerial.len()
            + self.amenities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which backend produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    Static,
    Dynamic,
}

impl fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Transport-level facts about how a result was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub method: FetchMethod,
    /// URL after redirects, if any were followed.
    pub final_url: Option<String>,
    /// Redirect chain in order, excluding the final URL.
    pub redirects: Vec<String>,
    /// Body size in bytes, when known.
    pub response_size: Option<usize>,
    /// Subresource count reported by the page, when known.
    pub resources_loaded: Option<usize>,
    /// Paths of screenshots written under the media directory.
    pub screenshots: Vec<String>,
}

impl ResultMetadata {
    #[must_use]
    pub fn for_method(method: FetchMethod) -> Self {
        Self {
            method,
            final_url: None,
            redirects: Vec::new(),
            response_size: None,
            resources_loaded: None,
            screenshots: Vec::new(),
        }
    }
}

/// The canonical output of a scraping request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub data: Option<CourseBasicInfo>,
    pub contact: ContactInfo,
    pub images: CourseImages,
    /// Ordered; `errors[0]` is the terminal error on failure.
    pub errors: Vec<ScrapingError>,
    pub warnings: Vec<String>,
    pub processing_time_ms: u64,
    /// Extraction completeness, 0–100.
    pub confidence: u8,
    /// The URL that was requested.
    pub source: String,
    pub metadata: ResultMetadata,
}

impl ProcessingResult {
    /// A failed result carrying a single terminal error.
    #[must_use]
    pub fn failure(
        source: impl Into<String>,
        method: FetchMethod,
        error: ScrapingError,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            success: false,
            data: None,
            contact: ContactInfo::default(),
            images: CourseImages::default(),
            errors: vec![error],
            warnings: Vec::new(),
            processing_time_ms,
            confidence: 0,
            source: source.into(),
            metadata: ResultMetadata::for_method(method),
        }
    }

    /// The terminal error, if this result failed.
    #[must_use]
    pub fn terminal_error(&self) -> Option<&ScrapingError> {
        self.errors.first()
    }

    /// Whether the terminal error is eligible for another attempt.
    #[must_use]
    pub fn is_retryable_failure(&self) -> bool {
        !self.success && self.terminal_error().is_some_and(|e| e.retryable)
    }
}
