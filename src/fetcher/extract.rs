//! Course record extraction from parsed HTML
//!
//! Both backends extract the same fields through the same selector
//! cascade: the static backend via `scraper` on the fetched document,
//! the dynamic backend via an equivalent script evaluated in-page. First
//! match wins per field; all URLs are resolved against the final URL of
//! the response.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::schema::{ContactInfo, CourseBasicInfo, CourseImages};
use crate::utils::resolve_url;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern compiles")
});

/// Selector cascades, first match wins.
const NAME_SELECTORS: &[&str] = &["h1", ".course-name", ".page-title", "title"];
const DESCRIPTION_SELECTORS: &[&str] = &[".course-description", ".about-course", ".description"];
const ARCHITECT_SELECTORS: &[&str] = &[".architect", ".designer"];
const PHONE_SELECTORS: &[&str] = &[".phone", ".contact-phone"];
const HERO_SELECTORS: &[&str] = &[".hero img", ".banner img", ".main-image img"];
const GALLERY_SELECTORS: &[&str] = &[".gallery img", ".photo-gallery img", ".course-photos img"];

/// Everything the cascade pulled out of one document.
#[derive(Debug, Clone, Default)]
pub struct ExtractedCourse {
    pub data: CourseBasicInfo,
    pub contact: ContactInfo,
    pub images: CourseImages,
    /// Extraction completeness, 0–100. A name filled from the fallback
    /// does not count toward the score.
    pub confidence: u8,
}

fn first_text(document: &Html, selectors: &[&str]) -> Option<String> {
    for raw in selectors {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = element.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn first_attr(document: &Html, raw_selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(raw_selector).ok()?;
    document
        .select(&selector)
        .find_map(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn image_urls(document: &Html, selectors: &[&str], base: &Url) -> Vec<String> {
    let mut seen = Vec::new();
    for raw in selectors {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        for element in document.select(&selector) {
            for attr in ["src", "data-src"] {
                if let Some(resolved) = element
                    .value()
                    .attr(attr)
                    .and_then(|value| resolve_url(base, value))
                {
                    if !seen.contains(&resolved) {
                        seen.push(resolved);
                    }
                }
            }
        }
    }
    seen
}

fn extract_description(document: &Html) -> Option<String> {
    first_text(document, DESCRIPTION_SELECTORS)
        .or_else(|| first_attr(document, r#"meta[name="description"]"#, "content"))
}

fn extract_phone(document: &Html) -> Option<String> {
    first_attr(document, r#"a[href^="tel:"]"#, "href")
        .map(|href| href.trim_start_matches("tel:").trim().to_string())
        .filter(|phone| !phone.is_empty())
        .or_else(|| first_text(document, PHONE_SELECTORS))
}

fn extract_email(document: &Html) -> Option<String> {
    if let Some(href) = first_attr(document, r#"a[href^="mailto:"]"#, "href") {
        let email = href.trim_start_matches("mailto:").trim();
        // Strip mailto query parameters like ?subject=
        let email = email.split('?').next().unwrap_or(email);
        if !email.is_empty() {
            return Some(email.to_string());
        }
    }

    let body_text = first_text(document, &["body"]).unwrap_or_default();
    EMAIL_RE
        .find(&body_text)
        .map(|matched| matched.as_str().to_string())
}

/// Additive completeness score, normalized to 0–100.
///
/// +10 each for name, description, architect, phone, email, at least one
/// hero image, and at least one gallery image; raw maximum 70.
#[must_use]
pub fn confidence_score(
    data: &CourseBasicInfo,
    contact: &ContactInfo,
    images: &CourseImages,
) -> u8 {
    let mut raw = 0u32;
    raw += u32::from(data.name.is_some()) * 10;
    raw += u32::from(data.description.is_some()) * 10;
    raw += u32::from(data.architect.is_some()) * 10;
    raw += u32::from(contact.phone.is_some()) * 10;
    raw += u32::from(contact.email.is_some()) * 10;
    raw += u32::from(!images.hero.is_empty()) * 10;
    raw += u32::from(!images.gallery.is_empty()) * 10;
    (raw * 100 / 70) as u8
}

/// Run the full cascade over a parsed document.
///
/// `base` is the final URL of the response; `fallback_name` (usually the
/// target's display name) fills in when no name is found on the page.
#[must_use]
pub fn extract_course(document: &Html, base: &Url, fallback_name: &str) -> ExtractedCourse {
    let mut data = CourseBasicInfo {
        name: first_text(document, NAME_SELECTORS),
        description: extract_description(document),
        architect: first_text(document, ARCHITECT_SELECTORS),
    };

    let contact = ContactInfo {
        phone: extract_phone(document),
        email: extract_email(document),
    };

    let images = CourseImages {
        hero: image_urls(document, HERO_SELECTORS, base),
        gallery: image_urls(document, GALLERY_SELECTORS, base),
        ..CourseImages::default()
    };

    let confidence = confidence_score(&data, &contact, &images);

    if data.name.is_none() && !fallback_name.is_empty() {
        data.name = Some(fallback_name.to_string());
    }

    ExtractedCourse {
        data,
        contact,
        images,
        confidence,
    }
}
