//! TTL cache for classification results.
//!
//! FODMAP classification of a given (name, category) pair is stable, so
//! entries live for days by default. Eviction is time-based only, checked
//! on read. UNKNOWN results are never stored: an UNKNOWN may be transient
//! (rate limit, outage) and must not be memoized.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::FodmapClassifier;
use fodmap_core::{Classification, FodmapStatus, Product, Result};

struct CacheEntry {
    result: Classification,
    expires_at: Instant,
}

/// Thread-safe TTL cache keyed by normalized (name, category).
pub struct ClassificationCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl ClassificationCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Cache key: content hash over normalized name and category. Distinct
    /// from the product identity hash — cache correctness depends on the
    /// (name, category) pair, not record identity.
    pub fn cache_key(name: &str, category: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(name.trim().to_lowercase().as_bytes());
        hasher.update(b"|");
        hasher.update(category.trim().to_lowercase().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Get a cached result. Returns None on miss or expired entry.
    pub fn get(&self, name: &str, category: &str) -> Option<Classification> {
        let key = Self::cache_key(name, category);
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.result.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Insert a result with the default TTL. UNKNOWN (and PENDING) results
    /// are silently skipped.
    pub fn put(&self, name: &str, category: &str, result: &Classification) {
        self.put_with_ttl(name, category, result, self.default_ttl);
    }

    /// Insert a result with an explicit TTL.
    pub fn put_with_ttl(
        &self,
        name: &str,
        category: &str,
        result: &Classification,
        ttl: Duration,
    ) {
        if matches!(
            result.status,
            FodmapStatus::Unknown | FodmapStatus::Pending
        ) {
            return;
        }

        let key = Self::cache_key(name, category);
        self.entries.lock().insert(
            key,
            CacheEntry {
                result: result.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drop every entry. Blunt, whole-cache operation.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.lock();
        let dropped = entries.len();
        entries.clear();
        info!("Cleared classification cache ({} entries)", dropped);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Caching decorator around any classifier. Implements the same interface;
/// batch calls are partitioned into hits and misses so the inner classifier
/// only sees products the cache cannot answer.
pub struct CachedClassifier {
    inner: Box<dyn FodmapClassifier>,
    cache: ClassificationCache,
}

impl CachedClassifier {
    pub fn new(inner: Box<dyn FodmapClassifier>, cache: ClassificationCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }
}

#[async_trait]
impl FodmapClassifier for CachedClassifier {
    async fn classify(&self, product: &Product) -> Classification {
        if let Some(hit) = self.cache.get(&product.name, &product.category) {
            debug!(
                "Using cached classification for '{}': {}",
                product.name, hit.status
            );
            return hit;
        }

        let result = self.inner.classify(product).await;
        self.cache.put(&product.name, &product.category, &result);
        result
    }

    async fn classify_batch(
        &self,
        products: &[Product],
    ) -> Result<HashMap<String, Classification>> {
        let mut results = HashMap::with_capacity(products.len());
        let mut misses: Vec<Product> = Vec::new();

        for product in products {
            match self.cache.get(&product.name, &product.category) {
                Some(hit) => {
                    results.insert(product.identity_hash.clone(), hit);
                }
                None => misses.push(product.clone()),
            }
        }

        info!(
            "Batch classification cache stats: total={}, hits={}, misses={}",
            products.len(),
            results.len(),
            misses.len()
        );

        if !misses.is_empty() {
            let fresh = self.inner.classify_batch(&misses).await?;
            let by_identity: HashMap<&str, &Product> = misses
                .iter()
                .map(|p| (p.identity_hash.as_str(), p))
                .collect();

            for (identity, result) in fresh {
                if let Some(product) = by_identity.get(identity.as_str()) {
                    self.cache.put(&product.name, &product.category, &result);
                }
                results.insert(identity, result);
            }
        }

        Ok(results)
    }
}
