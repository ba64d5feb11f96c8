//! Path matching against robots.txt rule patterns
//!
//! Rules are prefix patterns with `*` wildcards. Precedence follows the
//! longest-match convention: a path matching a `Disallow` is still allowed
//! when a strictly longer `Allow` pattern also matches.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;

use super::parser::RobotsDirective;

/// Compiled-wildcard memo. Robots files repeat the same handful of
/// patterns across checks, so compilation is paid once per pattern.
static WILDCARD_CACHE: Lazy<Mutex<HashMap<String, Option<Regex>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Whether `path` matches a single rule `pattern`.
///
/// - `/` matches everything
/// - a trailing `*` makes the portion before it a prefix match
/// - `*` elsewhere turns the pattern into an anchored regex
/// - otherwise the pattern is a plain prefix
#[must_use]
pub fn path_matches(pattern: &str, path: &str) -> bool {
    if pattern == "/" {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix('*') {
        if !prefix.contains('*') {
            return path.starts_with(prefix);
        }
    }

    if pattern.contains('*') {
        return wildcard_matches(pattern, path);
    }

    path.starts_with(pattern)
}

fn wildcard_matches(pattern: &str, path: &str) -> bool {
    let mut cache = match WILDCARD_CACHE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let compiled = cache
        .entry(pattern.to_string())
        .or_insert_with(|| compile_wildcard(pattern));
    compiled.as_ref().is_some_and(|re| re.is_match(path))
}

/// `*` → `.*`, everything else escaped, anchored at the start.
fn compile_wildcard(pattern: &str) -> Option<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for segment in pattern.split('*') {
        if !source.ends_with('^') {
            source.push_str(".*");
        }
        source.push_str(&regex::escape(segment));
    }
    Regex::new(&source).ok()
}

/// Decide whether `path` is allowed under `directive`.
///
/// A matching `Allow` overrides a matching `Disallow` only when its
/// pattern is strictly longer than the longest matching `Disallow`.
#[must_use]
pub fn is_allowed(directive: &RobotsDirective, path: &str) -> bool {
    let longest_disallow = directive
        .disallowed
        .iter()
        .filter(|rule| path_matches(rule, path))
        .map(|rule| rule.len())
        .max();

    let Some(disallow_len) = longest_disallow else {
        return true;
    };

    directive
        .allowed
        .iter()
        .any(|rule| rule.len() > disallow_len && path_matches(rule, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directive(allowed: &[&str], disallowed: &[&str]) -> RobotsDirective {
        RobotsDirective {
            user_agent: "*".into(),
            allowed: allowed.iter().map(|s| (*s).to_string()).collect(),
            disallowed: disallowed.iter().map(|s| (*s).to_string()).collect(),
            crawl_delay_ms: None,
            sitemaps: Vec::new(),
            host: None,
        }
    }

    #[test]
    fn test_root_matches_everything() {
        assert!(path_matches("/", "/"));
        assert!(path_matches("/", "/golf/courses"));
    }

    #[test]
    fn test_plain_prefix() {
        assert!(path_matches("/admin", "/admin"));
        assert!(path_matches("/admin", "/admin/users"));
        // Prefix semantics: /admin2 shares the /admin prefix
        assert!(path_matches("/admin", "/admin2"));
        assert!(!path_matches("/admin", "/public"));
    }

    #[test]
    fn test_trailing_wildcard() {
        assert!(path_matches("/golf/*", "/golf/courses"));
        assert!(path_matches("/golf/*", "/golf/"));
        assert!(!path_matches("/golf/*", "/golfing"));
    }

    #[test]
    fn test_embedded_wildcard() {
        assert!(path_matches("/*/print", "/course/print"));
        assert!(path_matches("/search*results", "/search/all/results"));
        assert!(!path_matches("/*/print", "/print"));
        // Regex metacharacters in the pattern are literal
        assert!(path_matches("/page?id=*&view", "/page?id=7&view"));
        assert!(!path_matches("/page?id=*&view", "/pageXid=7&view"));
    }

    #[test]
    fn test_disallow_without_allow() {
        let d = directive(&[], &["/admin"]);
        assert!(!is_allowed(&d, "/admin"));
        assert!(!is_allowed(&d, "/admin/users"));
        assert!(!is_allowed(&d, "/admin2"));
        assert!(is_allowed(&d, "/public"));
    }

    #[test]
    fn test_specificity_longer_allow_wins() {
        let d = directive(&["/golf/courses"], &["/golf/*"]);
        assert!(!is_allowed(&d, "/golf/admin"));
        assert!(is_allowed(&d, "/golf/courses"));
        assert!(is_allowed(&d, "/golf/courses/pine-hollow"));
    }

    #[test]
    fn test_equal_length_allow_does_not_override() {
        let d = directive(&["/private"], &["/private"]);
        assert!(!is_allowed(&d, "/private/page"));
    }

    #[test]
    fn test_empty_directive_allows() {
        let d = directive(&[], &[]);
        assert!(is_allowed(&d, "/anything"));
    }
}
