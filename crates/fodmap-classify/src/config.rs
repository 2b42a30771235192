//! Classifier configuration persistence and defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";

/// Hard ceiling on products per external call, protecting API quotas.
pub const MAX_BATCH_SIZE: usize = 50;

/// One side of the rule table: canonical keywords plus synonym → canonical
/// expansions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordSet {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub synonyms: HashMap<String, String>,
}

/// Keyword data for the rule-based classifier. The defaults are the Serbian
/// grocery vocabulary the service was deployed with; deployments can replace
/// them wholesale through the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default = "default_low_set")]
    pub low: KeywordSet,
    #[serde(default = "default_high_set")]
    pub high: KeywordSet,
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            low: default_low_set(),
            high: default_high_set(),
            ignore: Vec::new(),
        }
    }
}

fn default_low_set() -> KeywordSet {
    KeywordSet {
        keywords: [
            "piletina",
            "ćuretina",
            "junetina",
            "riba",
            "jaja",
            "pirinač",
            "krompir",
            "šargarepa",
            "krastavac",
            "paradajz",
            "paprika",
            "tikvica",
            "spanać",
            "blitva",
            "banana",
            "borovnica",
            "jagoda",
            "kivi",
            "limun",
            "badem",
            "orah",
            "bez laktoze",
            "gauda",
            "kukuruz",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        synonyms: [
            ("riža", "pirinač"),
            ("mrkva", "šargarepa"),
            ("narandža", "pomorandža"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
    }
}

fn default_high_set() -> KeywordSet {
    KeywordSet {
        keywords: [
            "pšenica",
            "raž",
            "ječam",
            "hleb",
            "testenina",
            "luk",
            "beli luk",
            "crni luk",
            "pasulj",
            "grašak",
            "leblebija",
            "sočivo",
            "jabuka",
            "kruška",
            "mango",
            "med",
            "fruktozni sirup",
            "mleko",
            "jogurt",
            "sladoled",
            "inulin",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        synonyms: [
            ("pavlaka", "mleko"),
            ("slatko mleko", "mleko"),
            ("kiselo mleko", "jogurt"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
    }
}

/// Stored classifier configuration (persisted to classifier-config.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Active strategy: "rules", "ai", or "cached-ai".
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Products per external call; clamped to [`MAX_BATCH_SIZE`].
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_rate_limit_max_calls")]
    pub rate_limit_max_calls: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    /// "reject" drops to UNKNOWN immediately; "wait" polls until budget
    /// frees up, bounded by the attempt count below.
    #[serde(default = "default_rate_limit_policy")]
    pub rate_limit_policy: String,
    #[serde(default = "default_rate_limit_wait_attempts")]
    pub rate_limit_wait_attempts: u32,
    #[serde(default = "default_rate_limit_poll_interval_ms")]
    pub rate_limit_poll_interval_ms: u64,
    #[serde(default = "default_cache_ttl_days")]
    pub cache_ttl_days: u64,
    /// Pause between successive external calls when an oversized input is
    /// chunked, to smooth the call rate.
    #[serde(default = "default_inter_chunk_delay_secs")]
    pub inter_chunk_delay_secs: u64,
    #[serde(default)]
    pub rules: RuleConfig,
    /// Path to config file for saving.
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_mode() -> String {
    "cached-ai".into()
}
fn default_model() -> String {
    DEFAULT_GEMINI_MODEL.into()
}
fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}
fn default_rate_limit_max_calls() -> u32 {
    15
}
fn default_rate_limit_window_secs() -> u64 {
    60
}
fn default_rate_limit_policy() -> String {
    "reject".into()
}
fn default_rate_limit_wait_attempts() -> u32 {
    10
}
fn default_rate_limit_poll_interval_ms() -> u64 {
    1000
}
fn default_cache_ttl_days() -> u64 {
    30
}
fn default_inter_chunk_delay_secs() -> u64 {
    2
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            api_key: None,
            model: default_model(),
            batch_size: default_batch_size(),
            rate_limit_max_calls: default_rate_limit_max_calls(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            rate_limit_policy: default_rate_limit_policy(),
            rate_limit_wait_attempts: default_rate_limit_wait_attempts(),
            rate_limit_poll_interval_ms: default_rate_limit_poll_interval_ms(),
            cache_ttl_days: default_cache_ttl_days(),
            inter_chunk_delay_secs: default_inter_chunk_delay_secs(),
            rules: RuleConfig::default(),
            config_path: PathBuf::new(),
        }
    }
}

impl ClassifierConfig {
    /// Load config from file, falling back to env vars and defaults.
    pub fn load(config_path: &Path) -> Self {
        let mut config: ClassifierConfig = std::fs::read_to_string(config_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        config.config_path = config_path.to_path_buf();

        // Env var as fallback for the API key
        if config.api_key.is_none() {
            config.api_key = std::env::var("GEMINI_API_KEY").ok();
        }

        config
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(&self.config_path, json)?;
        info!("Saved classifier config to {}", self.config_path.display());
        Ok(())
    }

    /// Batch size with the hard ceiling applied.
    pub fn effective_batch_size(&self) -> usize {
        if self.batch_size == 0 {
            return 1;
        }
        if self.batch_size > MAX_BATCH_SIZE {
            warn!(
                "Configured batch size {} exceeds the {} ceiling, clamping",
                self.batch_size, MAX_BATCH_SIZE
            );
            return MAX_BATCH_SIZE;
        }
        self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClassifierConfig::default();
        assert_eq!(config.mode, "cached-ai");
        assert_eq!(config.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.rate_limit_max_calls, 15);
        assert_eq!(config.rate_limit_window_secs, 60);
        assert!(!config.rules.low.keywords.is_empty());
        assert!(!config.rules.high.keywords.is_empty());
    }

    #[test]
    fn test_effective_batch_size_clamped() {
        let mut config = ClassifierConfig::default();
        config.batch_size = 500;
        assert_eq!(config.effective_batch_size(), MAX_BATCH_SIZE);
        config.batch_size = 0;
        assert_eq!(config.effective_batch_size(), 1);
        config.batch_size = 10;
        assert_eq!(config.effective_batch_size(), 10);
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier-config.json");
        std::fs::write(&path, r#"{"mode": "rules", "batch_size": 5}"#).unwrap();

        let config = ClassifierConfig::load(&path);
        assert_eq!(config.mode, "rules");
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.rate_limit_max_calls, 15);
        assert!(!config.rules.high.keywords.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier-config.json");

        let mut config = ClassifierConfig::default();
        config.config_path = path.clone();
        config.mode = "ai".to_string();
        config.save().unwrap();

        let reloaded = ClassifierConfig::load(&path);
        assert_eq!(reloaded.mode, "ai");
    }
}
