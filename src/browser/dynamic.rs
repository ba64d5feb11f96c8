//! Headless-browser fetcher
//!
//! Borrows a page from the pool, navigates with a network-idle wait,
//! gives dynamic content a chance to render, then evaluates a single
//! self-contained extraction script in the page context. Extraction
//! failure after a successful navigation degrades to a partial result
//! with a warning, because the rendered document is often still useful.

use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EventResponseReceived, ResourceType, SetBlockedUrLsParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown,
};
use chromiumoxide::page::Page;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::pool::{BrowserPool, BrowserPoolStats, PageGuard};
use crate::config::ScrapeConfig;
use crate::errors::ScrapeError;
use crate::fetcher::extract::confidence_score;
use crate::fetcher::Fetcher;
use crate::resilience::with_timeout;
use crate::schema::{
    ContactInfo, CourseBasicInfo, CourseImages, FetchMethod, ProcessingResult, ResultMetadata,
    ScrapingOptions, ScrapingTarget, Viewport,
};
use crate::utils::constants::{
    DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH, DEFAULT_WAIT_TIME_MS, SELECTOR_POLL_INTERVAL,
    SELECTOR_WAIT,
};
use crate::utils::screenshot_path;

/// Resource extensions aborted during navigation to cut load time.
/// Stylesheets, fonts, and media contribute nothing to extraction.
const BLOCKED_URL_PATTERNS: &[&str] = &[
    "*.css", "*.woff", "*.woff2", "*.ttf", "*.otf", "*.mp4", "*.webm", "*.avi", "*.mp3", "*.ogg",
];

/// What the in-page script hands back.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawExtraction {
    name: Option<String>,
    description: Option<String>,
    architect: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    hero: Vec<String>,
    gallery: Vec<String>,
    resources_loaded: Option<usize>,
}

struct PageOutcome {
    data: CourseBasicInfo,
    contact: ContactInfo,
    images: CourseImages,
    confidence: u8,
    warnings: Vec<String>,
    final_url: Option<String>,
    response_size: Option<usize>,
    resources_loaded: Option<usize>,
    screenshots: Vec<String>,
}

/// The dynamic backend, owning the browser pool.
pub struct DynamicFetcher {
    pool: Arc<BrowserPool>,
    media_dir: PathBuf,
    user_agent: String,
    default_timeout: Duration,
}

impl DynamicFetcher {
    #[must_use]
    pub fn new(config: &ScrapeConfig, pool: Arc<BrowserPool>) -> Self {
        Self {
            pool,
            media_dir: config.media_dir().to_path_buf(),
            user_agent: config.user_agent().to_string(),
            default_timeout: config.page_timeout(),
        }
    }

    /// Close every pooled session.
    pub async fn cleanup(&self) {
        self.pool.cleanup().await;
    }

    /// `{active_sessions, total_sessions}` from the pool.
    pub async fn browser_stats(&self) -> BrowserPoolStats {
        self.pool.stats().await
    }

    async fn fetch_inner(
        &self,
        target: &ScrapingTarget,
        options: &ScrapingOptions,
    ) -> ProcessingResult {
        let started = Instant::now();
        debug!(target = %target.id, url = %target.url, "Dynamic fetch start");

        let guard = match self.pool.acquire().await {
            Ok(guard) => guard,
            Err(err) => {
                return ProcessingResult::failure(
                    &target.url,
                    FetchMethod::Dynamic,
                    err.into_scraping_error(&target.url),
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        let outcome = self.run_page(&guard, target, options).await;

        // The page goes back to the pool on every path, including timeouts
        guard.release().await;

        let processing_time_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(outcome) => {
                debug!(
                    target = %target.id,
                    confidence = outcome.confidence,
                    "Dynamic fetch done in {processing_time_ms}ms"
                );
                ProcessingResult {
                    success: true,
                    data: Some(outcome.data),
                    contact: outcome.contact,
                    images: outcome.images,
                    errors: Vec::new(),
                    warnings: outcome.warnings,
                    processing_time_ms,
                    confidence: outcome.confidence,
                    source: target.url.clone(),
                    metadata: ResultMetadata {
                        method: FetchMethod::Dynamic,
                        final_url: outcome.final_url,
                        redirects: Vec::new(),
                        response_size: outcome.response_size,
                        resources_loaded: outcome.resources_loaded,
                        screenshots: outcome.screenshots,
                    },
                }
            }
            Err(err) => {
                warn!(target = %target.id, "Dynamic fetch failed: {err}");
                ProcessingResult::failure(
                    &target.url,
                    FetchMethod::Dynamic,
                    err.into_scraping_error(&target.url),
                    processing_time_ms,
                )
            }
        }
    }

    async fn run_page(
        &self,
        guard: &PageGuard,
        target: &ScrapingTarget,
        options: &ScrapingOptions,
    ) -> Result<PageOutcome, ScrapeError> {
        let page = guard.page();
        let timeout = options
            .timeout_ms
            .map_or(self.default_timeout, Duration::from_millis);
        let mut warnings = Vec::new();

        self.configure_page(page, options).await?;
        let error_listener = spawn_page_error_listener(page, target.url.clone()).await;

        let response_size = match self.navigate(page, &target.url, timeout).await {
            Ok(size) => size,
            Err(err) => {
                if let Some(handle) = error_listener {
                    handle.abort();
                }
                return Err(err);
            }
        };

        // Content-ready ladder: selector, settle time, then best-effort idle
        if let Some(selector) = options.wait_for_selector.as_deref() {
            if !wait_for_selector(page, selector, SELECTOR_WAIT).await {
                warnings.push(format!(
                    "Selector '{selector}' did not appear within {}s",
                    SELECTOR_WAIT.as_secs()
                ));
            }
        }

        let wait_time = options.wait_time_ms.unwrap_or(DEFAULT_WAIT_TIME_MS);
        tokio::time::sleep(Duration::from_millis(wait_time)).await;

        if let Err(e) =
            tokio::time::timeout(Duration::from_secs(5), page.wait_for_navigation()).await
        {
            debug!(url = %target.url, "Post-settle idle wait elapsed: {e}");
        }

        // Extraction failure after successful navigation degrades: the
        // rendered page is often still worth a partial record.
        let (data, contact, images, confidence, resources_loaded) =
            match self.evaluate_extraction(page, timeout).await {
                Ok(raw) => {
                    let mut data = CourseBasicInfo {
                        name: raw.name,
                        description: raw.description,
                        architect: raw.architect,
                    };
                    let contact = ContactInfo {
                        phone: raw.phone,
                        email: raw.email,
                    };
                    let images = CourseImages {
                        hero: raw.hero,
                        gallery: raw.gallery,
                        ..CourseImages::default()
                    };
                    let confidence = confidence_score(&data, &contact, &images);
                    if data.name.is_none() && !target.name.is_empty() {
                        data.name = Some(target.name.clone());
                    }
                    (data, contact, images, confidence, raw.resources_loaded)
                }
                Err(err) => {
                    warnings.push(format!("In-page extraction failed: {err}"));
                    let data = CourseBasicInfo {
                        name: Some(target.name.clone()),
                        ..CourseBasicInfo::default()
                    };
                    (data, ContactInfo::default(), CourseImages::default(), 0, None)
                }
            };

        let mut screenshots = Vec::new();
        if options.screenshots {
            match self.capture_screenshot(page, &target.id).await {
                Ok(path) => {
                    info!(target = %target.id, path = %path, "Screenshot captured");
                    screenshots.push(path);
                }
                Err(err) => warnings.push(format!("Screenshot failed: {err}")),
            }
        }

        let final_url = page.url().await.ok().flatten();

        if let Some(handle) = error_listener {
            handle.abort();
        }

        Ok(PageOutcome {
            data,
            contact,
            images,
            confidence,
            warnings,
            final_url,
            response_size,
            resources_loaded,
            screenshots,
        })
    }

    /// User agent, viewport, default timeout, and resource blocking.
    async fn configure_page(
        &self,
        page: &Page,
        options: &ScrapingOptions,
    ) -> Result<(), ScrapeError> {
        let user_agent = options.user_agent.as_deref().unwrap_or(&self.user_agent);
        page.set_user_agent(user_agent)
            .await
            .map_err(|e| ScrapeError::Browser {
                message: format!("failed to set user agent: {e}"),
            })?;

        let viewport = options.viewport.unwrap_or(Viewport {
            width: DEFAULT_VIEWPORT_WIDTH,
            height: DEFAULT_VIEWPORT_HEIGHT,
        });
        page.execute(
            SetDeviceMetricsOverrideParams::builder()
                .width(i64::from(viewport.width))
                .height(i64::from(viewport.height))
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(|e| ScrapeError::Browser {
                    message: format!("invalid viewport params: {e}"),
                })?,
        )
        .await
        .map_err(|e| ScrapeError::Browser {
            message: format!("failed to set viewport: {e}"),
        })?;

        // Blocking is an optimization; losing it is not worth failing over
        let patterns: Vec<String> = BLOCKED_URL_PATTERNS
            .iter()
            .map(|p| (*p).to_string())
            .collect();
        if let Err(e) = page.execute(SetBlockedUrLsParams::new(patterns)).await {
            debug!("Failed to install resource blocking: {e}");
        }

        Ok(())
    }

    /// Navigate with a network-idle wait and verify the main document
    /// responded with a 2xx.
    ///
    /// The response listener is attached before `goto` so the document's
    /// `responseReceived` event is buffered even when navigation is fast.
    async fn navigate(
        &self,
        page: &Page,
        url: &str,
        timeout: Duration,
    ) -> Result<Option<usize>, ScrapeError> {
        let mut responses = match page.event_listener::<EventResponseReceived>().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                debug!("Could not attach response listener: {e}");
                None
            }
        };

        with_timeout(
            async {
                page.goto(url).await.map_err(|e| ScrapeError::Network {
                    message: format!("navigation failed: {e}"),
                    url: Some(url.to_string()),
                    status: None,
                })?;
                page.wait_for_navigation()
                    .await
                    .map_err(|e| ScrapeError::Network {
                        message: format!("page load failed: {e}"),
                        url: Some(url.to_string()),
                        status: None,
                    })?;
                Ok(())
            },
            timeout,
            "Page navigation",
        )
        .await?;

        // The main frame's Document response is the first Document event
        let Some(events) = responses.as_mut() else {
            return Ok(None);
        };
        let document = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(event) = events.next().await {
                if event.r#type == ResourceType::Document {
                    return Some((event.response.status, event.response.encoded_data_length));
                }
            }
            None
        })
        .await
        .unwrap_or(None);

        let Some((status, encoded_length)) = document else {
            return Err(ScrapeError::Network {
                message: "no response received for navigation".into(),
                url: Some(url.to_string()),
                status: None,
            });
        };

        let status = status as u16;
        if !(200..300).contains(&status) {
            return Err(ScrapeError::Network {
                message: format!("HTTP {status}"),
                url: Some(url.to_string()),
                status: Some(status),
            });
        }

        Ok((encoded_length > 0.0).then(|| encoded_length as usize))
    }

    async fn evaluate_extraction(
        &self,
        page: &Page,
        timeout: Duration,
    ) -> Result<RawExtraction, ScrapeError> {
        let value = with_timeout(
            async {
                page.evaluate(super::js_scripts::COURSE_EXTRACTION_SCRIPT)
                    .await
                    .map_err(|e| ScrapeError::Scraping {
                        message: format!("extraction script failed: {e}"),
                        url: String::new(),
                        course_id: None,
                    })?
                    .into_value::<serde_json::Value>()
                    .map_err(|e| ScrapeError::Parse {
                        message: format!("extraction result not decodable: {e}"),
                        url: None,
                    })
            },
            timeout,
            "In-page extraction",
        )
        .await?;

        serde_json::from_value(value).map_err(|e| ScrapeError::Parse {
            message: format!("extraction result schema mismatch: {e}"),
            url: None,
        })
    }

    /// Full-page PNG under the media directory, keyed by target id.
    async fn capture_screenshot(&self, page: &Page, target_id: &str) -> Result<String, ScrapeError> {
        let path = screenshot_path(&self.media_dir, target_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ScrapeError::FileSystem {
                    message: e.to_string(),
                    path: parent.display().to_string(),
                })?;
        }

        let params = CaptureScreenshotParams {
            format: Some(CaptureScreenshotFormat::Png),
            capture_beyond_viewport: Some(true),
            ..Default::default()
        };

        let bytes = page
            .screenshot(params)
            .await
            .map_err(|e| ScrapeError::Browser {
                message: format!("screenshot failed: {e}"),
            })?;

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ScrapeError::FileSystem {
                message: e.to_string(),
                path: path.display().to_string(),
            })?;

        Ok(path.display().to_string())
    }
}

impl Fetcher for DynamicFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Dynamic
    }

    fn fetch<'a>(
        &'a self,
        target: &'a ScrapingTarget,
        options: &'a ScrapingOptions,
    ) -> BoxFuture<'a, ProcessingResult> {
        self.fetch_inner(target, options).boxed()
    }
}

/// Poll for a selector until it appears or the wait elapses.
async fn wait_for_selector(page: &Page, selector: &str, wait: Duration) -> bool {
    let deadline = Instant::now() + wait;
    loop {
        if page.find_element(selector).await.is_ok() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
    }
}

/// Surface page JS exceptions and console errors as log warnings for the
/// duration of a fetch.
async fn spawn_page_error_listener(
    page: &Page,
    url: String,
) -> Option<tokio::task::JoinHandle<()>> {
    let exceptions = match page.event_listener::<EventExceptionThrown>().await {
        Ok(stream) => stream,
        Err(e) => {
            debug!("Could not attach page error listener: {e}");
            return None;
        }
    };
    let console = match page.event_listener::<EventConsoleApiCalled>().await {
        Ok(stream) => stream,
        Err(e) => {
            debug!("Could not attach console listener: {e}");
            return None;
        }
    };

    Some(tokio::spawn(async move {
        let mut exceptions = exceptions;
        let mut console = console;
        loop {
            tokio::select! {
                event = exceptions.next() => {
                    let Some(event) = event else { break };
                    warn!(url = %url, "Page exception: {}", event.exception_details.text);
                }
                event = console.next() => {
                    let Some(event) = event else { break };
                    if event.r#type == ConsoleApiCalledType::Error {
                        let message = event
                            .args
                            .iter()
                            .filter_map(|arg| arg.value.as_ref())
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(" ");
                        warn!(url = %url, "Console error: {message}");
                    }
                }
            }
        }
    }))
}
