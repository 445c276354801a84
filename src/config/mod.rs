//! Configuration tree.
//!
//! Every section is `#[serde(default)]`, so partial JSON documents load and
//! fill the gaps from the defaults below. Call [`BatchConfig::validate`] before
//! handing sections to the components; the loaders do this for you.

use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::processing::batch::BatchSizeConfig;
use crate::telemetry::{DEFAULT_DANGER_THRESHOLD, DEFAULT_INTERVAL_MS, DEFAULT_WARNING_THRESHOLD};
use crate::utils::{
    validate_batch_size, validate_bounds, validate_ratio, BatchError, BatchResult, ValidationError,
};

// =============================================================================
// Defaults
// =============================================================================

pub const DEFAULT_MEMORY_THRESHOLD: f64 = 0.7;
pub const DEFAULT_CPU_THRESHOLD: f64 = 0.8;
/// Self-tuning cadence (30 seconds).
pub const DEFAULT_TUNING_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

pub const DEFAULT_EXECUTOR_BATCH_SIZE: usize = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

pub const DEFAULT_STREAM_BATCH_SIZE: usize = 100;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    pub interval_ms: u64,
    pub warning_threshold: f64,
    pub danger_threshold: f64,
    /// Coarse installed-memory hint used when no precise reading exists
    pub device_memory_hint_gb: Option<f64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            danger_threshold: DEFAULT_DANGER_THRESHOLD,
            device_memory_hint_gb: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommenderConfig {
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    /// Returned (bounded) when telemetry input is missing
    pub default_batch_size: usize,
    pub memory_threshold: f64,
    pub cpu_threshold: f64,
    pub tuning_interval_ms: u64,
    pub history_capacity: usize,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        let bounds = BatchSizeConfig::default();
        Self {
            min_batch_size: bounds.min_size,
            max_batch_size: bounds.max_size,
            default_batch_size: bounds.default_size,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            cpu_threshold: DEFAULT_CPU_THRESHOLD,
            tuning_interval_ms: DEFAULT_TUNING_INTERVAL_MS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl RecommenderConfig {
    pub fn bounds(&self) -> BatchSizeConfig {
        BatchSizeConfig {
            min_size: self.min_batch_size,
            max_size: self.max_batch_size,
            default_size: self.default_batch_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub batch_delay_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_EXECUTOR_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            batch_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamConfig {
    pub batch_size: usize,
    pub delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_STREAM_BATCH_SIZE,
            delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// =============================================================================
// Root
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchConfig {
    pub monitor: MonitorConfig,
    pub recommender: RecommenderConfig,
    pub executor: ExecutorConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

impl BatchConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> BatchResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON config file. A missing file is an error.
    pub fn load(path: impl AsRef<Path>) -> BatchResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| BatchError::config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_json_str(&contents)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Like [`Self::load`], but falls back to defaults when the file is absent
    /// or unusable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_ratio("monitor.warningThreshold", self.monitor.warning_threshold)?;
        validate_ratio("monitor.dangerThreshold", self.monitor.danger_threshold)?;
        if self.monitor.warning_threshold > self.monitor.danger_threshold {
            return Err(ValidationError::settings(format!(
                "monitor.warningThreshold ({}) exceeds monitor.dangerThreshold ({})",
                self.monitor.warning_threshold, self.monitor.danger_threshold
            )));
        }
        if self.monitor.interval_ms == 0 {
            return Err(ValidationError::settings("monitor.intervalMs must be positive"));
        }

        self.recommender.bounds().validate()?;
        validate_ratio("recommender.memoryThreshold", self.recommender.memory_threshold)?;
        validate_ratio("recommender.cpuThreshold", self.recommender.cpu_threshold)?;
        if self.recommender.tuning_interval_ms == 0 {
            return Err(ValidationError::settings("recommender.tuningIntervalMs must be positive"));
        }
        if self.recommender.history_capacity == 0 {
            return Err(ValidationError::settings("recommender.historyCapacity must be positive"));
        }

        validate_batch_size(self.executor.batch_size)?;
        validate_batch_size(self.stream.batch_size)?;
        Ok(())
    }
}

impl BatchSizeConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_bounds(self.min_size, self.max_size)?;
        validate_batch_size(self.default_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = BatchConfig::default();
        assert_eq!(config.monitor.interval_ms, 10_000);
        assert_eq!(config.monitor.warning_threshold, 0.70);
        assert_eq!(config.monitor.danger_threshold, 0.85);
        assert_eq!(config.recommender.min_batch_size, 5);
        assert_eq!(config.recommender.max_batch_size, 50);
        assert_eq!(config.executor.max_retries, 3);
        assert_eq!(config.executor.retry_delay_ms, 1_000);
        assert_eq!(config.stream.batch_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let config = BatchConfig::from_json_str(
            r#"{"executor": {"batchSize": 25}, "logging": {"level": "debug"}}"#,
        )
        .unwrap();
        assert_eq!(config.executor.batch_size, 25);
        assert_eq!(config.executor.max_retries, 3);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.recommender, RecommenderConfig::default());
    }

    #[test]
    fn invalid_documents_are_rejected() {
        let inverted = BatchConfig::from_json_str(
            r#"{"recommender": {"minBatchSize": 60, "maxBatchSize": 50}}"#,
        );
        assert!(matches!(
            inverted,
            Err(BatchError::Validation(ValidationError::Bounds { min: 60, max: 50 }))
        ));

        let threshold = BatchConfig::from_json_str(r#"{"monitor": {"dangerThreshold": 1.5}}"#);
        assert!(matches!(threshold, Err(BatchError::Validation(ValidationError::Threshold { .. }))));

        assert!(BatchConfig::from_json_str("{ not json").is_err());
    }

    #[test]
    fn loads_from_disk_and_falls_back_when_missing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"stream": {{"batchSize": 40, "delayMs": 5}}}}"#).unwrap();

        let config = BatchConfig::load(file.path()).unwrap();
        assert_eq!(config.stream.batch_size, 40);
        assert_eq!(config.stream.delay_ms, 5);

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(BatchConfig::load(&missing), Err(BatchError::Config(_))));
        assert_eq!(BatchConfig::load_or_default(&missing), BatchConfig::default());
    }
}
