//! Configuration and data directory management.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Paths to the service's data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Product database directory (`data/db/`).
    pub db: PathBuf,
    /// Classifier configuration (`data/classifier-config.json`).
    pub classifier_config_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            db: root.join("db"),
            classifier_config_file: root.join("classifier-config.json"),
            root,
        };
        std::fs::create_dir_all(&paths.db)?;
        Ok(paths)
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server port.
    pub port: u16,
    /// Interval between scheduled classification triggers, in seconds.
    pub schedule_interval_secs: u64,
    /// Data directory paths.
    pub data_paths: DataPaths,
}

impl AppConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3010);

        let schedule_interval_secs = std::env::var("FODMAP_SCHEDULE_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self {
            port,
            schedule_interval_secs,
            data_paths,
        })
    }
}
