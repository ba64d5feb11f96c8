//! URL and path manipulation utilities.
//!
//! This module provides functions for working with URLs and filesystem
//! paths in the context of polite scraping and screenshot storage.

use anyhow::Result;
use std::path::{Path, PathBuf};
use url::Url;

/// Extract the origin key (`scheme://host[:port]`) used by the robots
/// cache and the per-domain gate.
pub fn origin_of(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("URL has no host: {url}"))?;
    Ok(match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    })
}

/// Extract the origin key from a raw URL string.
pub fn origin_of_str(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| anyhow::anyhow!("Failed to parse URL {url}: {e}"))?;
    origin_of(&parsed)
}

/// Extract the host portion of a URL string.
pub fn host_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| anyhow::anyhow!("Failed to parse URL {url}: {e}"))?;
    parsed
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("URL has no host: {url}"))
}

/// Check if a URL is one we will scrape.
#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    // Skip data URLs, javascript URLs, and other non-http schemes
    if url.starts_with("data:") || url.starts_with("javascript:") || url.starts_with("mailto:") {
        return false;
    }

    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Resolve a possibly-relative reference against the page's final URL.
///
/// Returns `None` for references that do not produce an http(s) URL.
#[must_use]
pub fn resolve_url(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let joined = base.join(raw).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

/// Build the screenshot path for a target under the media directory.
///
/// Layout: `<media_dir>/<sanitized target id>/screenshot-<ISO timestamp>.png`.
/// The caller owns creating the directory; this only computes the path.
#[must_use]
pub fn screenshot_path(media_dir: &Path, target_id: &str) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ");
    media_dir
        .join(sanitize_filename::sanitize(target_id))
        .join(format!("screenshot-{stamp}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_of_str() {
        assert_eq!(
            origin_of_str("https://example.com/golf/courses").expect("origin"),
            "https://example.com"
        );
        assert_eq!(
            origin_of_str("http://example.com:8080/x?q=1").expect("origin"),
            "http://example.com:8080"
        );
        assert!(origin_of_str("not a url").is_err());
    }

    #[test]
    fn test_is_valid_url() {
        assert!(is_valid_url("https://example.com/golf"));
        assert!(!is_valid_url("mailto:pro@example.com"));
        assert!(!is_valid_url("javascript:void(0)"));
        assert!(!is_valid_url(""));
        assert!(!is_valid_url("ftp://example.com/file"));
    }

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/golf/courses/index.html").expect("base");
        assert_eq!(
            resolve_url(&base, "/images/hero.jpg").as_deref(),
            Some("https://example.com/images/hero.jpg")
        );
        assert_eq!(
            resolve_url(&base, "gallery/1.jpg").as_deref(),
            Some("https://example.com/golf/courses/gallery/1.jpg")
        );
        assert_eq!(resolve_url(&base, "data:image/png;base64,xyz"), None);
        assert_eq!(resolve_url(&base, "   "), None);
    }

    #[test]
    fn test_screenshot_path_sanitizes_id() {
        let path = screenshot_path(Path::new("/media"), "course/..//1");
        // The id collapses into a single component directly under media
        assert_eq!(
            path.parent().and_then(Path::parent),
            Some(Path::new("/media"))
        );
        assert!(path
            .file_name()
            .expect("file name")
            .to_string_lossy()
            .starts_with("screenshot-"));
    }
}
