//! hiccup_bench
//!
//! Measures how faithfully a periodic task meets its period and deadline on
//! the current host. Each run drives a workload at a fixed cadence and
//! records three latency distributions, all corrected for coordinated
//! omission:
//! - **deadline**: how long each iteration took
//! - **period**: how far apart iteration starts were
//! - **hiccup**: host-induced stalls seen by an independent background probe
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Task descriptor and run result
//! - **config**: JSON benchmark configuration
//! - **logger**: `log` facade backend
//! - **system**: Host status snapshots and the measurement core

pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod system;

// Re-export the log crate for macro usage
pub use log;

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use config::BenchConfig;
pub use error::{BenchError, ConfigError, Result, RunPhase, WorkloadError};
pub use models::{RunResult, TaskDescriptor};
pub use system::performance::{
    FailurePolicy, HiccupConfig, HiccupProbe, LoadGenerator, MetricRecorder, RunSummary, RunnerOptions,
    TaskRunner,
};
pub use system::{HostStatus, StatusSource, SysinfoStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[test]
    fn test_error_reexport() {
        let _: Result<i32> = Ok(42);
    }

    #[test]
    fn test_models_reexport() {
        let task = TaskDescriptor::continuous();
        assert!(task.is_unbounded());
    }
}
