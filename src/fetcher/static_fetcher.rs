//! Lightweight HTTP + HTML fetcher
//!
//! One GET per request, redirects followed manually so the chain can be
//! reported, body parsed with a permissive HTML parser, fields pulled via
//! the shared selector cascade.

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, warn};
use scraper::Html;
use std::time::{Duration, Instant};
use url::Url;

use super::extract::extract_course;
use super::Fetcher;
use crate::config::ScrapeConfig;
use crate::errors::ScrapeError;
use crate::schema::{
    FetchMethod, ProcessingResult, ResultMetadata, ScrapingOptions, ScrapingTarget,
};
use crate::utils::constants::MAX_REDIRECTS;

/// The static backend.
pub struct StaticFetcher {
    client: reqwest::Client,
    user_agent: String,
    default_timeout: Duration,
}

/// What the manual redirect loop produced.
struct FetchedDocument {
    body: String,
    final_url: Url,
    redirects: Vec<String>,
}

impl StaticFetcher {
    #[must_use]
    pub fn new(config: &ScrapeConfig) -> Self {
        // Redirects are followed by hand so the chain lands in metadata
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_default();

        Self {
            client,
            user_agent: config.user_agent().to_string(),
            default_timeout: config.static_timeout(),
        }
    }

    async fn get_with_redirects(
        &self,
        url: &str,
        options: &ScrapingOptions,
    ) -> Result<FetchedDocument, ScrapeError> {
        let timeout = options
            .timeout_ms
            .map_or(self.default_timeout, Duration::from_millis);
        let user_agent = options.user_agent.as_deref().unwrap_or(&self.user_agent);

        let mut current = Url::parse(url).map_err(|e| ScrapeError::Validation {
            message: format!("invalid target URL {url}: {e}"),
        })?;
        let mut redirects = Vec::new();

        loop {
            let response = self
                .client
                .get(current.clone())
                .header(reqwest::header::USER_AGENT, user_agent)
                .timeout(timeout)
                .send()
                .await
                .map_err(ScrapeError::from)?;

            let status = response.status();

            if status.is_redirection() {
                if redirects.len() >= MAX_REDIRECTS {
                    return Err(ScrapeError::Network {
                        message: format!("redirect chain exceeded {MAX_REDIRECTS} hops"),
                        url: Some(current.to_string()),
                        status: Some(status.as_u16()),
                    });
                }
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .ok_or_else(|| ScrapeError::Network {
                        message: format!("HTTP {status} without Location header"),
                        url: Some(current.to_string()),
                        status: Some(status.as_u16()),
                    })?;
                let next = current.join(location).map_err(|e| ScrapeError::Network {
                    message: format!("unresolvable redirect target {location}: {e}"),
                    url: Some(current.to_string()),
                    status: Some(status.as_u16()),
                })?;
                debug!("Following redirect {current} -> {next}");
                redirects.push(current.to_string());
                current = next;
                continue;
            }

            if !status.is_success() {
                // 403/404/410 become non-retryable through the status field
                return Err(ScrapeError::Network {
                    message: format!("HTTP {status}"),
                    url: Some(current.to_string()),
                    status: Some(status.as_u16()),
                });
            }

            let body = response.text().await.map_err(ScrapeError::from)?;
            return Ok(FetchedDocument {
                body,
                final_url: current,
                redirects,
            });
        }
    }

    async fn fetch_inner(
        &self,
        target: &ScrapingTarget,
        options: &ScrapingOptions,
    ) -> ProcessingResult {
        let started = Instant::now();
        debug!("Static fetch start: {} ({})", target.id, target.url);

        let fetched = match self.get_with_redirects(&target.url, options).await {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!("Static fetch failed for {}: {err}", target.url);
                return ProcessingResult::failure(
                    &target.url,
                    FetchMethod::Static,
                    err.into_scraping_error(&target.url),
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        let response_size = fetched.body.len();
        // Html is parse-and-drop within this block; it is not Send and
        // must not be held across an await.
        let extracted = {
            let document = Html::parse_document(&fetched.body);
            extract_course(&document, &fetched.final_url, &target.name)
        };

        let processing_time_ms = started.elapsed().as_millis() as u64;
        debug!(
            "Static fetch done: {} in {processing_time_ms}ms, confidence {}",
            target.id, extracted.confidence
        );

        ProcessingResult {
            success: true,
            data: Some(extracted.data),
            contact: extracted.contact,
            images: extracted.images,
            errors: Vec::new(),
            warnings: Vec::new(),
            processing_time_ms,
            confidence: extracted.confidence,
            source: target.url.clone(),
            metadata: ResultMetadata {
                method: FetchMethod::Static,
                final_url: Some(fetched.final_url.to_string()),
                redirects: fetched.redirects,
                response_size: Some(response_size),
                resources_loaded: None,
                screenshots: Vec::new(),
            },
        }
    }
}

impl Fetcher for StaticFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Static
    }

    fn fetch<'a>(
        &'a self,
        target: &'a ScrapingTarget,
        options: &'a ScrapingOptions,
    ) -> BoxFuture<'a, ProcessingResult> {
        self.fetch_inner(target, options).boxed()
    }
}
