//! Type-safe builder for `ScrapeConfig` using the typestate pattern
//!
//! The media directory is required at compile time; everything else has a
//! documented default. `build()` validates numeric ranges.

use anyhow::{anyhow, Result};
use std::marker::PhantomData;
use std::path::PathBuf;

use super::types::ScrapeConfig;

/// Type state: the media directory has been provided.
pub struct WithMediaDir;

pub struct ScrapeConfigBuilder<State = ()> {
    config: ScrapeConfig,
    _phantom: PhantomData<State>,
}

impl Default for ScrapeConfigBuilder<()> {
    fn default() -> Self {
        Self {
            config: ScrapeConfig::default(),
            _phantom: PhantomData,
        }
    }
}

impl ScrapeConfigBuilder<()> {
    /// Set the directory screenshots are written under (required).
    #[must_use]
    pub fn media_dir(mut self, dir: impl Into<PathBuf>) -> ScrapeConfigBuilder<WithMediaDir> {
        self.config.media_dir = dir.into();
        ScrapeConfigBuilder {
            config: self.config,
            _phantom: PhantomData,
        }
    }
}

impl<State> ScrapeConfigBuilder<State> {
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn robots_default_delay_ms(mut self, ms: u64) -> Self {
        self.config.robots_default_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn robots_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.robots_cache_ttl_secs = secs;
        self
    }

    #[must_use]
    pub fn static_timeout_secs(mut self, secs: u64) -> Self {
        self.config.static_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn page_timeout_secs(mut self, secs: u64) -> Self {
        self.config.page_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn max_browsers(mut self, count: usize) -> Self {
        self.config.max_browsers = count;
        self
    }

    #[must_use]
    pub fn max_pages_per_browser(mut self, count: usize) -> Self {
        self.config.max_pages_per_browser = count;
        self
    }

    #[must_use]
    pub fn session_timeout_secs(mut self, secs: u64) -> Self {
        self.config.session_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn max_requests_per_browser(mut self, count: u32) -> Self {
        self.config.max_requests_per_browser = count;
        self
    }

    #[must_use]
    pub fn retry_max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn retry_max_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_max_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn retry_factor(mut self, factor: f64) -> Self {
        self.config.retry_factor = factor;
        self
    }

    #[must_use]
    pub fn breaker_threshold(mut self, threshold: u32) -> Self {
        self.config.breaker_threshold = threshold;
        self
    }

    #[must_use]
    pub fn breaker_reset_timeout_secs(mut self, secs: u64) -> Self {
        self.config.breaker_reset_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn browser_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser_executable = Some(path.into());
        self
    }

    #[must_use]
    pub fn max_concurrent(mut self, count: usize) -> Self {
        self.config.max_concurrent = count;
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }
}

impl ScrapeConfigBuilder<WithMediaDir> {
    /// Validate and produce the configuration.
    pub fn build(self) -> Result<ScrapeConfig> {
        let config = self.config;

        if config.user_agent.trim().is_empty() {
            return Err(anyhow!("user_agent must not be empty"));
        }
        if config.max_browsers == 0 {
            return Err(anyhow!("max_browsers must be at least 1"));
        }
        if config.max_pages_per_browser == 0 {
            return Err(anyhow!("max_pages_per_browser must be at least 1"));
        }
        if config.max_concurrent == 0 {
            return Err(anyhow!("max_concurrent must be at least 1"));
        }
        if config.retry_max_attempts == 0 {
            return Err(anyhow!("retry_max_attempts must be at least 1"));
        }
        if config.retry_factor < 1.0 {
            return Err(anyhow!(
                "retry_factor must be >= 1.0, got {}",
                config.retry_factor
            ));
        }
        if config.retry_max_delay_ms < config.retry_base_delay_ms {
            return Err(anyhow!("retry_max_delay_ms must be >= retry_base_delay_ms"));
        }
        if config.breaker_threshold == 0 {
            return Err(anyhow!("breaker_threshold must be at least 1"));
        }

        Ok(config)
    }
}
