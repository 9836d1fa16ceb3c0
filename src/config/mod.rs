//! Configuration module for benchmark runs.
//!
//! A `BenchConfig` describes one benchmark session: the task, how long each
//! run lasts, which loads to run and how the probe, the failure policy and
//! logging are set up. It is stored as JSON; see `loader` for file handling.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::TaskDescriptor;
use crate::system::performance::{FailurePolicy, HiccupConfig, RunnerOptions, WorkloadKind};

pub use loader::{create_default_config, load_config_from_file, save_config_to_file, validate_config_path};

/// Hiccup probe settings as stored on disk
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct HiccupSettings {
    /// Probe cycle length in microseconds
    pub resolution_us: u64,
    pub allocate_objects: bool,
}

impl Default for HiccupSettings {
    fn default() -> Self {
        HiccupSettings {
            resolution_us: 1000,
            allocate_objects: true,
        }
    }
}

impl HiccupSettings {
    pub fn to_hiccup_config(&self) -> HiccupConfig {
        HiccupConfig {
            resolution: Duration::from_micros(self.resolution_us),
            allocate_objects: self.allocate_objects,
        }
    }
}

/// Full configuration of a benchmark session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BenchConfig {
    pub task: TaskDescriptor,
    /// Length of every measured run
    pub run_duration_ms: u64,
    /// Perform one discarded run before measuring
    pub warmup: bool,
    /// Loads to measure, in order. Empty means the task's initial workload.
    pub loads: Vec<u32>,
    pub hiccup: HiccupSettings,
    pub failure_policy: FailurePolicy,
    pub workload: WorkloadKind,
    /// Where run summaries go; `None` selects the per-user data directory
    pub results_dir: Option<PathBuf>,
    /// One of error, warn, info, debug, trace
    pub log_level: String,
    /// Also append log output to this file
    pub log_file: Option<PathBuf>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            task: TaskDescriptor::new("Control", Duration::from_millis(10), Duration::from_millis(5), 1),
            run_duration_ms: 10_000,
            warmup: true,
            loads: Vec::new(),
            hiccup: HiccupSettings::default(),
            failure_policy: FailurePolicy::default(),
            workload: WorkloadKind::default(),
            results_dir: None,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl BenchConfig {
    pub fn run_duration(&self) -> Duration {
        Duration::from_millis(self.run_duration_ms)
    }

    /// Loads to run, falling back to the task's initial workload
    pub fn effective_loads(&self) -> Vec<u32> {
        if self.loads.is_empty() {
            vec![self.task.initial_workload()]
        } else {
            self.loads.clone()
        }
    }

    pub fn level_filter(&self) -> Result<log::LevelFilter, ConfigError> {
        log::LevelFilter::from_str(&self.log_level).map_err(|_| {
            ConfigError::ValidationFailed(format!("Unknown log level '{}'", self.log_level))
        })
    }

    /// Runner options derived from this config (no cancellation flag)
    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            hiccup: self.hiccup.to_hiccup_config(),
            failure_policy: self.failure_policy,
            cancel_flag: None,
        }
    }

    /// Check the values serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run_duration_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "run_duration_ms must be greater than zero".to_string(),
            ));
        }

        if self.hiccup.resolution_us == 0 {
            return Err(ConfigError::ValidationFailed(
                "hiccup.resolution_us must be greater than zero".to_string(),
            ));
        }

        let ratio = self.failure_policy.max_failure_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::ValidationFailed(format!(
                "failure_policy.max_failure_ratio must be within 0..=1, got {}",
                ratio
            )));
        }

        self.level_filter()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BenchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.run_duration(), Duration::from_secs(10));
        assert_eq!(config.effective_loads(), vec![1]);
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        let config = BenchConfig {
            run_duration_ms: 0,
            ..BenchConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ValidationFailed(_))));
    }

    #[test]
    fn test_validate_rejects_bad_ratio_and_level() {
        let mut config = BenchConfig::default();
        config.failure_policy.max_failure_ratio = 1.5;
        assert!(config.validate().is_err());

        let config = BenchConfig {
            log_level: "loud".to_string(),
            ..BenchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BenchConfig = serde_json::from_str(
            r#"{"task": {"name": "Fast", "period_ms": 1, "deadline_ms": 1, "initial_workload": 2}, "loads": [1, 2, 4]}"#,
        )
        .unwrap();
        assert_eq!(config.task.name(), "Fast");
        assert_eq!(config.run_duration_ms, 10_000);
        assert_eq!(config.effective_loads(), vec![1, 2, 4]);
        assert_eq!(config.hiccup.to_hiccup_config(), HiccupConfig::default());
    }
}
