//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use fodmap_classify::{ClassifierConfig, FodmapClassifier};
use fodmap_core::AppConfig;
use fodmap_job::{ClassificationJob, JobConfig, OverlapLock};
use fodmap_store::ProductStore;

/// TTL of the scheduled-run overlap lock. Caps worst-case run duration.
const OVERLAP_LOCK_TTL: Duration = Duration::from_secs(300);

/// Shared application state accessible from all route handlers and the
/// scheduler.
pub struct AppState {
    pub config: AppConfig,
    pub classifier_config: ClassifierConfig,
    pub store: Arc<ProductStore>,
    pub classifier: Arc<dyn FodmapClassifier>,
    pub job: ClassificationJob,
    pub overlap_lock: OverlapLock,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        classifier_config: ClassifierConfig,
        store: Arc<ProductStore>,
        classifier: Arc<dyn FodmapClassifier>,
    ) -> Self {
        let job = ClassificationJob::new(store.clone(), classifier.clone(), JobConfig::default());

        Self {
            config,
            classifier_config,
            store,
            classifier,
            job,
            overlap_lock: OverlapLock::new(OVERLAP_LOCK_TTL),
        }
    }
}
