//! The background classification job.
//!
//! One pass: fetch a bounded batch of pending records oldest-first, run the
//! configured classifier over it, persist every result, and report how much
//! work remains. Continuation is the caller's decision — the job returns a
//! [`PassOutcome`] instead of rescheduling itself, so the scheduler stays
//! the single source of truth for when work runs.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use fodmap_classify::FodmapClassifier;
use fodmap_core::{now_millis, Classification, Result};
use fodmap_store::ProductStore;

/// Job tuning knobs. The defaults match the deployed schedule: batches of
/// 50, three attempts backing off 10s/30s/60s, 2s between continuation
/// passes.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Records fetched per pass.
    pub batch_size: usize,
    /// Attempts per invocation, including the first.
    pub max_attempts: u32,
    /// Delay before each retry attempt.
    pub backoff: Vec<Duration>,
    /// Pause between continuation passes, smoothing external call rate.
    pub inter_pass_delay: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_attempts: 3,
            backoff: vec![
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(60),
            ],
            inter_pass_delay: Duration::from_secs(2),
        }
    }
}

/// What one pass accomplished.
#[derive(Debug, Clone, Copy)]
pub struct PassOutcome {
    /// Records classified and persisted in this pass.
    pub processed: usize,
    /// Pending records left after the pass; the scheduler continues while
    /// this is positive.
    pub remaining: i64,
}

/// Orchestrates classification of pending products.
pub struct ClassificationJob {
    store: Arc<ProductStore>,
    classifier: Arc<dyn FodmapClassifier>,
    config: JobConfig,
}

impl ClassificationJob {
    pub fn new(
        store: Arc<ProductStore>,
        classifier: Arc<dyn FodmapClassifier>,
        config: JobConfig,
    ) -> Self {
        Self {
            store,
            classifier,
            config,
        }
    }

    /// Run a single classification pass.
    ///
    /// The pending query doubles as the idempotence recheck: records a
    /// concurrent run already classified are no longer PENDING and are not
    /// fetched again. On a batch-level classifier error, every fetched
    /// record is marked UNKNOWN with `processed_at` set — an attempted
    /// record is never left stuck in PENDING — and the error is re-raised
    /// for the retry layer.
    pub async fn run_pass(&self) -> Result<PassOutcome> {
        let products = self.store.find_pending_ordered_by_age(self.config.batch_size)?;
        if products.is_empty() {
            info!("No pending products to classify");
            return Ok(PassOutcome {
                processed: 0,
                remaining: 0,
            });
        }

        info!("Starting classification pass for {} products", products.len());

        match self.classifier.classify_batch(&products).await {
            Ok(mut results) => {
                let now = now_millis();
                for product in &products {
                    let classification = results.remove(&product.identity_hash).unwrap_or_else(|| {
                        // The batch contract guarantees total coverage, but a
                        // hole here must not strand the record in PENDING.
                        warn!(
                            "Classifier returned no result for {} ('{}')",
                            product.identity_hash, product.name
                        );
                        Classification::unknown("no classification result returned")
                    });

                    self.store
                        .update_classification(&product.identity_hash, &classification, now)?;
                    debug!(
                        "Classified {} ('{}'): {} → {}",
                        product.identity_hash, product.name, product.status, classification.status
                    );
                }

                let remaining = self.store.count_pending()?;
                info!(
                    "Classification pass complete: processed={}, remaining={}",
                    products.len(),
                    remaining
                );
                Ok(PassOutcome {
                    processed: products.len(),
                    remaining,
                })
            }
            Err(e) => {
                error!(
                    "Batch classification failed for {} products: {}",
                    products.len(),
                    e
                );

                let now = now_millis();
                let fallback = Classification::unknown(format!("batch classification failed: {}", e));
                for product in &products {
                    if let Err(update_err) =
                        self.store
                            .update_classification(&product.identity_hash, &fallback, now)
                    {
                        error!(
                            "Failed to record fallback for {}: {}",
                            product.identity_hash, update_err
                        );
                    }
                }

                Err(e)
            }
        }
    }

    /// Run a pass with the configured attempt/backoff schedule.
    pub async fn run_with_retries(&self) -> Result<PassOutcome> {
        let mut attempt = 0;
        loop {
            match self.run_pass().await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.config.max_attempts {
                        error!("Classification failed after {} attempts: {}", attempt, e);
                        return Err(e);
                    }
                    let delay = self
                        .config
                        .backoff
                        .get((attempt - 1) as usize)
                        .copied()
                        .unwrap_or(Duration::from_secs(60));
                    warn!(
                        "Classification attempt {} failed: {}; retrying in {:?}",
                        attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use fodmap_core::{product_identity_hash, Error, FodmapStatus, NewProduct, Product};

    fn test_store() -> (Arc<ProductStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ProductStore::open(dir.path()).unwrap());
        (store, dir)
    }

    fn seed(store: &ProductStore, names: &[&str]) {
        let products: Vec<NewProduct> = names
            .iter()
            .map(|name| NewProduct {
                identity_hash: product_identity_hash(name),
                name: name.to_string(),
                category: "Test".to_string(),
            })
            .collect();
        store.insert_pending(&products).unwrap();
    }

    fn quick_config() -> JobConfig {
        JobConfig {
            batch_size: 50,
            max_attempts: 3,
            backoff: vec![Duration::from_millis(1); 3],
            inter_pass_delay: Duration::from_millis(1),
        }
    }

    /// Returns a fixed status for every product.
    struct FixedClassifier {
        status: FodmapStatus,
        calls: AtomicUsize,
    }

    impl FixedClassifier {
        fn new(status: FodmapStatus) -> Self {
            Self {
                status,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FodmapClassifier for FixedClassifier {
        async fn classify(&self, _product: &Product) -> Classification {
            Classification::from_status(self.status)
        }

        async fn classify_batch(
            &self,
            products: &[Product],
        ) -> Result<HashMap<String, Classification>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(products
                .iter()
                .map(|p| (p.identity_hash.clone(), Classification::from_status(self.status)))
                .collect())
        }
    }

    /// Always fails at the transport level.
    struct FailingClassifier;

    #[async_trait]
    impl FodmapClassifier for FailingClassifier {
        async fn classify(&self, _product: &Product) -> Classification {
            Classification::unknown("transport failure")
        }

        async fn classify_batch(
            &self,
            _products: &[Product],
        ) -> Result<HashMap<String, Classification>> {
            Err(Error::Http("connection refused".into()))
        }
    }

    /// Drops one product from its response map.
    struct PartialClassifier {
        dropped: String,
    }

    #[async_trait]
    impl FodmapClassifier for PartialClassifier {
        async fn classify(&self, _product: &Product) -> Classification {
            Classification::from_status(FodmapStatus::Low)
        }

        async fn classify_batch(
            &self,
            products: &[Product],
        ) -> Result<HashMap<String, Classification>> {
            Ok(products
                .iter()
                .filter(|p| p.identity_hash != self.dropped)
                .map(|p| (p.identity_hash.clone(), Classification::from_status(FodmapStatus::Low)))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_empty_queue_is_noop() {
        let (store, _dir) = test_store();
        let job = ClassificationJob::new(
            store,
            Arc::new(FixedClassifier::new(FodmapStatus::Low)),
            quick_config(),
        );

        let outcome = job.run_pass().await.unwrap();
        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.remaining, 0);
    }

    #[tokio::test]
    async fn test_successful_pass_persists_results() {
        let (store, _dir) = test_store();
        seed(&store, &["Banana", "Hleb"]);

        let job = ClassificationJob::new(
            store.clone(),
            Arc::new(FixedClassifier::new(FodmapStatus::Low)),
            quick_config(),
        );

        let outcome = job.run_pass().await.unwrap();
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.remaining, 0);

        for name in ["Banana", "Hleb"] {
            let product = store
                .find_by_identity(&product_identity_hash(name))
                .unwrap()
                .unwrap();
            assert_eq!(product.status, FodmapStatus::Low);
            assert!(product.processed_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_batch_failure_marks_all_unknown() {
        let (store, _dir) = test_store();
        seed(&store, &["A", "B", "C"]);

        let job = ClassificationJob::new(store.clone(), Arc::new(FailingClassifier), quick_config());

        assert!(job.run_pass().await.is_err());

        for name in ["A", "B", "C"] {
            let product = store
                .find_by_identity(&product_identity_hash(name))
                .unwrap()
                .unwrap();
            assert_eq!(product.status, FodmapStatus::Unknown);
            assert!(product.processed_at.is_some());
            assert!(product
                .explanation
                .unwrap()
                .contains("batch classification failed"));
        }
        assert_eq!(store.count_pending().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_map_entry_filled_unknown() {
        let (store, _dir) = test_store();
        seed(&store, &["kept", "dropped"]);

        let job = ClassificationJob::new(
            store.clone(),
            Arc::new(PartialClassifier {
                dropped: product_identity_hash("dropped"),
            }),
            quick_config(),
        );

        let outcome = job.run_pass().await.unwrap();
        assert_eq!(outcome.processed, 2);

        let kept = store
            .find_by_identity(&product_identity_hash("kept"))
            .unwrap()
            .unwrap();
        assert_eq!(kept.status, FodmapStatus::Low);

        let dropped = store
            .find_by_identity(&product_identity_hash("dropped"))
            .unwrap()
            .unwrap();
        assert_eq!(dropped.status, FodmapStatus::Unknown);
        assert!(dropped.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_batch_size_bounds_pass() {
        let (store, _dir) = test_store();
        seed(&store, &["a", "b", "c", "d", "e"]);

        let config = JobConfig {
            batch_size: 2,
            ..quick_config()
        };
        let classifier = Arc::new(FixedClassifier::new(FodmapStatus::Low));
        let job = ClassificationJob::new(store.clone(), classifier.clone(), config);

        let outcome = job.run_pass().await.unwrap();
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.remaining, 3);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pending_invariant_holds_after_runs() {
        let (store, _dir) = test_store();
        seed(&store, &["x", "y"]);

        let job = ClassificationJob::new(
            store.clone(),
            Arc::new(FixedClassifier::new(FodmapStatus::High)),
            quick_config(),
        );
        job.run_pass().await.unwrap();

        // status == PENDING iff processed_at is NULL, for every record.
        let all = store
            .find_by_identities(&[product_identity_hash("x"), product_identity_hash("y")])
            .unwrap();
        for product in all {
            assert_eq!(
                product.status == FodmapStatus::Pending,
                product.processed_at.is_none()
            );
        }
    }

    #[tokio::test]
    async fn test_retry_after_batch_failure_drains_cleanly() {
        let (store, _dir) = test_store();
        seed(&store, &["a"]);

        let job = ClassificationJob::new(store.clone(), Arc::new(FailingClassifier), quick_config());

        // The failing attempt marks the record UNKNOWN, so the retry finds
        // an empty queue and the invocation ends clean.
        let result = job.run_with_retries().await;
        assert!(result.is_ok());
        assert_eq!(store.count_pending().unwrap(), 0);

        let product = store
            .find_by_identity(&product_identity_hash("a"))
            .unwrap()
            .unwrap();
        assert_eq!(product.status, FodmapStatus::Unknown);
    }
}
