//! Pipeline tuning loaded from an optional YAML file.
//!
//! Every field has a default, so a config file only needs the keys it wants
//! to change:
//!
//! ```yaml
//! workers: 4
//! rate_limit_budget: 3
//! record_queue_capacity: 500
//! ```
//!
//! Command-line flags are applied on top of the file (see `Cli::settings`).

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_RATE_LIMIT_BUDGET: u32 = 5;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_FLUSH_EVERY: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = concat!("press_harvest/", env!("CARGO_PKG_VERSION"));

/// Knobs for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    /// Number of concurrent fetch workers.
    pub workers: usize,
    /// How many HTTP 429 answers the run tolerates before workers stop.
    pub rate_limit_budget: u32,
    /// Capacity of the search → fetch queue.
    pub search_queue_capacity: usize,
    /// Capacity of the fetch → persist queue.
    pub record_queue_capacity: usize,
    /// The store rewrites its file after this many writes.
    pub flush_every: usize,
    /// Per-request timeout applied by the site adapters.
    pub request_timeout_secs: u64,
    /// User agent sent by the site adapters.
    pub user_agent: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            rate_limit_budget: DEFAULT_RATE_LIMIT_BUDGET,
            search_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            record_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            flush_every: DEFAULT_FLUSH_EVERY,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl PipelineSettings {
    /// Load settings from a YAML file, falling back to defaults for missing keys.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let settings = Self::from_yaml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        info!(?settings, "Loaded pipeline settings");
        Ok(settings)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Reject settings that would stall or disable the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("workers", self.workers == 0),
            ("rate_limit_budget", self.rate_limit_budget == 0),
            ("search_queue_capacity", self.search_queue_capacity == 0),
            ("record_queue_capacity", self.record_queue_capacity == 0),
            ("flush_every", self.flush_every == 0),
            ("request_timeout_secs", self.request_timeout_secs == 0),
        ];
        for (name, is_zero) in zero {
            if is_zero {
                return Err(ConfigError::InvalidSetting {
                    name,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "user_agent",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.workers, 10);
        assert_eq!(settings.rate_limit_budget, 5);
        assert_eq!(settings.flush_every, 10);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let settings = PipelineSettings::from_yaml_str("workers: 4\nrate_limit_budget: 2\n").unwrap();
        assert_eq!(settings.workers, 4);
        assert_eq!(settings.rate_limit_budget, 2);
        assert_eq!(settings.record_queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(settings.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(
            PipelineSettings::from_yaml_str("\n").unwrap(),
            PipelineSettings::default()
        );
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(PipelineSettings::from_yaml_str("wrokers: 3\n").is_err());
    }

    #[test]
    fn test_zero_workers_is_invalid() {
        let settings = PipelineSettings {
            workers: 0,
            ..PipelineSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { name: "workers", .. }));
    }

    #[test]
    fn test_zero_rate_limit_budget_is_invalid() {
        let settings = PipelineSettings::from_yaml_str("rate_limit_budget: 0\n").unwrap();
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { name: "rate_limit_budget", .. }));
    }

    #[test]
    fn test_large_timeout_is_valid() {
        let settings = PipelineSettings {
            request_timeout_secs: 1 << 32,
            ..PipelineSettings::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = PipelineSettings::from_yaml_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_from_yaml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pipeline.yaml");
        std::fs::write(&path, "flush_every: 1\nuser_agent: test-agent\n").unwrap();

        let settings = PipelineSettings::from_yaml_file(&path).unwrap();
        assert_eq!(settings.flush_every, 1);
        assert_eq!(settings.user_agent, "test-agent");
    }
}
