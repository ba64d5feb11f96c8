//! robots.txt parsing, serialization, and syntactic validation

use serde::{Deserialize, Serialize};

/// Parsed per-host robots record, computed for one requesting agent.
///
/// Rules are the union of the `*` group, the configured bot-name group,
/// and groups exactly matching the requesting agent (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotsDirective {
    /// The agent this record was computed for.
    pub user_agent: String,
    pub allowed: Vec<String>,
    pub disallowed: Vec<String>,
    /// Crawl delay in milliseconds.
    pub crawl_delay_ms: Option<u64>,
    pub sitemaps: Vec<String>,
    pub host: Option<String>,
}

impl RobotsDirective {
    /// Render back into robots.txt syntax.
    ///
    /// `parse` of the output for the same agent reproduces this directive.
    #[must_use]
    pub fn to_robots_txt(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("User-agent: {}\n", self.user_agent));
        for rule in &self.allowed {
            out.push_str(&format!("Allow: {rule}\n"));
        }
        for rule in &self.disallowed {
            out.push_str(&format!("Disallow: {rule}\n"));
        }
        if let Some(ms) = self.crawl_delay_ms {
            if ms % 1_000 == 0 {
                out.push_str(&format!("Crawl-delay: {}\n", ms / 1_000));
            } else {
                out.push_str(&format!("Crawl-delay: {}\n", ms as f64 / 1_000.0));
            }
        }
        for sitemap in &self.sitemaps {
            out.push_str(&format!("Sitemap: {sitemap}\n"));
        }
        if let Some(host) = &self.host {
            out.push_str(&format!("Host: {host}\n"));
        }
        out
    }
}

/// Outcome of [`parse`]: the directive plus non-fatal parse warnings.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub directive: RobotsDirective,
    pub warnings: Vec<String>,
}

/// Result of [`validate_robots_txt`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotsValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Whether a user-agent group token applies to the requesting agent.
fn group_applies(token: &str, agent: &str, bot_name: &str) -> bool {
    token == "*"
        || token.eq_ignore_ascii_case(bot_name)
        || token.eq_ignore_ascii_case(agent)
}

/// Parse robots.txt content into the directive applying to `agent`.
///
/// Lines are grouped by `User-agent:` blocks; consecutive user-agent lines
/// share the following rules, per the de-facto format. Malformed lines are
/// skipped; unknown directives produce a warning.
#[must_use]
pub fn parse(content: &str, agent: &str, bot_name: &str) -> ParseOutcome {
    let mut directive = RobotsDirective {
        user_agent: agent.to_string(),
        allowed: Vec::new(),
        disallowed: Vec::new(),
        crawl_delay_ms: None,
        sitemaps: Vec::new(),
        host: None,
    };
    let mut warnings = Vec::new();

    // Whether the current group's rules apply to the requesting agent.
    let mut applies = false;
    // Consecutive User-agent lines extend the same group.
    let mut in_agent_run = false;

    for raw_line in content.lines() {
        // Strip inline comments and surrounding whitespace
        let line = match raw_line.split_once('#') {
            Some((before, _)) => before.trim(),
            None => raw_line.trim(),
        };
        if line.is_empty() {
            continue;
        }

        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let field = field.trim().to_lowercase();
        let value = value.trim();

        match field.as_str() {
            "user-agent" => {
                if in_agent_run {
                    applies = applies || group_applies(value, agent, bot_name);
                } else {
                    applies = group_applies(value, agent, bot_name);
                    in_agent_run = true;
                }
            }
            "allow" => {
                in_agent_run = false;
                if applies && !value.is_empty() {
                    directive.allowed.push(value.to_string());
                }
            }
            "disallow" => {
                in_agent_run = false;
                if applies && !value.is_empty() {
                    directive.disallowed.push(value.to_string());
                }
            }
            "crawl-delay" => {
                in_agent_run = false;
                if applies {
                    match value.parse::<f64>() {
                        Ok(seconds) if seconds >= 0.0 => {
                            directive.crawl_delay_ms = Some((seconds * 1_000.0) as u64);
                        }
                        _ => warnings.push(format!("Invalid Crawl-delay value: {value}")),
                    }
                }
            }
            "sitemap" => {
                // Sitemaps are global, not per-agent
                in_agent_run = false;
                if !value.is_empty() {
                    directive.sitemaps.push(value.to_string());
                }
            }
            "host" => {
                in_agent_run = false;
                if !value.is_empty() {
                    directive.host = Some(value.to_string());
                }
            }
            other => {
                in_agent_run = false;
                warnings.push(format!("Unknown directive: {other}"));
            }
        }
    }

    ParseOutcome {
        directive,
        warnings,
    }
}

/// Static syntactic check for operators.
///
/// Errors: rules before any user-agent, empty user-agent values, and
/// non-numeric crawl delays. Warnings: unknown directives and sitemap
/// values that are not http(s) URLs.
#[must_use]
pub fn validate_robots_txt(content: &str) -> RobotsValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut seen_user_agent = false;

    for (index, raw_line) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = match raw_line.split_once('#') {
            Some((before, _)) => before.trim(),
            None => raw_line.trim(),
        };
        if line.is_empty() {
            continue;
        }

        let Some((field, value)) = line.split_once(':') else {
            warnings.push(format!("Line {line_no}: not a 'field: value' pair"));
            continue;
        };
        let field = field.trim().to_lowercase();
        let value = value.trim();

        match field.as_str() {
            "user-agent" => {
                if value.is_empty() {
                    errors.push(format!("Line {line_no}: empty User-agent"));
                } else {
                    seen_user_agent = true;
                }
            }
            "allow" | "disallow" => {
                if !seen_user_agent {
                    errors.push(format!(
                        "Line {line_no}: {field} rule before any User-agent"
                    ));
                }
            }
            "crawl-delay" => {
                if !seen_user_agent {
                    errors.push(format!(
                        "Line {line_no}: crawl-delay before any User-agent"
                    ));
                }
                if value.parse::<f64>().map_or(true, |v| v < 0.0) {
                    errors.push(format!("Line {line_no}: non-numeric Crawl-delay: {value}"));
                }
            }
            "sitemap" => {
                if !value.starts_with("http://") && !value.starts_with("https://") {
                    warnings.push(format!("Line {line_no}: sitemap is not an http(s) URL"));
                }
            }
            "host" => {}
            other => {
                warnings.push(format!("Line {line_no}: unknown directive: {other}"));
            }
        }
    }

    RobotsValidation {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}
