//! FODMAP Classify — classifier strategies and selection.
//!
//! Three strategies implement the [`FodmapClassifier`] trait:
//! - `RuleClassifier`: deterministic keyword matching, no I/O;
//! - `GeminiClassifier`: external generative API with batching and rate
//!   limiting;
//! - `CachedClassifier`: TTL-cache decorator around either.
//!
//! [`create_classifier`] selects one at composition time from config; no
//! re-binding happens mid-run.

pub mod cache;
pub mod config;
pub mod gemini;
pub mod rate_limit;
pub mod rules;

pub use cache::{CachedClassifier, ClassificationCache};
pub use config::{ClassifierConfig, KeywordSet, RuleConfig, DEFAULT_GEMINI_MODEL, MAX_BATCH_SIZE};
pub use gemini::GeminiClassifier;
pub use rate_limit::{RateLimiter, RatePolicy};
pub use rules::RuleClassifier;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use fodmap_core::{Classification, Error, Product, Result};

/// Common interface for every classification strategy.
#[async_trait]
pub trait FodmapClassifier: Send + Sync {
    /// Classify a single product. Never fails: any per-item error is
    /// absorbed into an UNKNOWN result with an explanation.
    async fn classify(&self, product: &Product) -> Classification;

    /// Classify a batch, keyed by identity hash. Every input product
    /// appears in the output exactly once. Only transport-level failures
    /// of a whole external call propagate as errors; the caller must then
    /// apply its own fallback.
    async fn classify_batch(
        &self,
        products: &[Product],
    ) -> Result<HashMap<String, Classification>>;
}

/// Build the configured classifier strategy.
///
/// Validates the mode up front so a bad config fails at startup, not in
/// the middle of a scheduled run. The rate limiter is shared state; pass
/// the same instance to every classifier built for one deployment so the
/// job path and the request path draw from a single budget.
pub fn create_classifier(
    config: &ClassifierConfig,
    limiter: Arc<RateLimiter>,
) -> Result<Arc<dyn FodmapClassifier>> {
    match config.mode.as_str() {
        "rules" => {
            info!("Using rule-based classifier");
            Ok(Arc::new(RuleClassifier::new(&config.rules)?))
        }
        "ai" => {
            info!("Using Gemini classifier (model={})", config.model);
            Ok(Arc::new(GeminiClassifier::new(config, limiter)))
        }
        "cached-ai" => {
            info!(
                "Using cached Gemini classifier (model={}, ttl={}d)",
                config.model, config.cache_ttl_days
            );
            let cache = ClassificationCache::new(Duration::from_secs(
                config.cache_ttl_days * 24 * 60 * 60,
            ));
            Ok(Arc::new(CachedClassifier::new(
                Box::new(GeminiClassifier::new(config, limiter)),
                cache,
            )))
        }
        other => Err(Error::Config(format!(
            "unknown classifier mode '{}' (expected rules, ai, or cached-ai)",
            other
        ))),
    }
}

/// Build the shared rate limiter described by the config.
pub fn create_rate_limiter(config: &ClassifierConfig) -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(
        config.rate_limit_max_calls,
        Duration::from_secs(config.rate_limit_window_secs),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_classifier_modes() {
        let mut config = ClassifierConfig::default();
        for mode in ["rules", "ai", "cached-ai"] {
            config.mode = mode.to_string();
            let limiter = create_rate_limiter(&config);
            assert!(create_classifier(&config, limiter).is_ok(), "mode {}", mode);
        }
    }

    #[test]
    fn test_create_classifier_rejects_unknown_mode() {
        let mut config = ClassifierConfig::default();
        config.mode = "psychic".to_string();
        let limiter = create_rate_limiter(&config);
        assert!(create_classifier(&config, limiter).is_err());
    }
}
