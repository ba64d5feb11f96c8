//! Graceful-degradation registry
//!
//! Enrichment calls (weather, maps, encyclopedia) register fallback values
//! keyed by service name; when a call fails, the registered value stands in
//! so a partially-enriched record still renders.

use dashmap::DashMap;
use log::warn;
use serde_json::Value;
use std::future::Future;

use crate::errors::ScrapeError;

/// Key → fallback value store with a fallback-aware execution helper.
#[derive(Default)]
pub struct FallbackRegistry {
    values: DashMap<String, Value>,
}

impl FallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the fallback value for `key`.
    pub fn register(&self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// The registered fallback for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.value().clone())
    }

    /// Run `operation`; on failure, fall back to `inline_fallback`, then to
    /// the registered value for `key`. The original error surfaces only
    /// when no fallback exists.
    pub async fn execute_with_fallback<Fut>(
        &self,
        key: &str,
        operation: Fut,
        inline_fallback: Option<Value>,
    ) -> Result<Value, ScrapeError>
    where
        Fut: Future<Output = Result<Value, ScrapeError>>,
    {
        match operation.await {
            Ok(value) => Ok(value),
            Err(err) => {
                let fallback = inline_fallback.or_else(|| self.get(key));
                match fallback {
                    Some(value) => {
                        warn!("Operation '{key}' failed, using fallback value: {err}");
                        Ok(value)
                    }
                    None => Err(err),
                }
            }
        }
    }
}
