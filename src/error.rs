//! Unified error type hierarchy for hiccup_bench
//!
//! Provides structured error handling with BenchError, ConfigError and
//! WorkloadError. Run-level failures carry the phase that failed.

use std::fmt;
use std::io;
use thiserror::Error;

/// Phase of a single benchmark run in which a fatal failure occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    /// Spawning the hiccup probe thread
    ProbeStart,
    /// The foreground period/deadline loop
    MeasurementLoop,
    /// Stopping and joining the hiccup probe
    ProbeDrain,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::ProbeStart => write!(f, "probe start"),
            RunPhase::MeasurementLoop => write!(f, "measurement loop"),
            RunPhase::ProbeDrain => write!(f, "probe drain"),
        }
    }
}

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Failure reported by a workload for a single invocation.
///
/// Workload failures are never fatal by themselves; the runner counts them
/// against its [`FailurePolicy`](crate::system::performance::FailurePolicy).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkloadError {
    #[error("workload failed: {0}")]
    Failed(String),

    #[error("workload panicked: {0}")]
    Panicked(String),
}

/// Global error type for the measurement core.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Task descriptor rejected at construction
    #[error("Invalid task descriptor: {0}")]
    InvalidTask(String),

    /// Latency histogram could not be created
    #[error("Histogram creation failed: {0}")]
    Histogram(String),

    /// A sample could not be recorded into a histogram
    #[error("Failed to record sample: {0}")]
    Record(String),

    /// Clock or suspension primitive failed
    #[error("Timing primitive failed: {0}")]
    Timing(String),

    /// Fatal failure of one run, tagged with the phase that failed
    #[error("Run failed during {phase}: {reason}")]
    Run { phase: RunPhase, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BenchError {
    /// Shorthand for a run-level failure.
    pub fn run(phase: RunPhase, reason: impl Into<String>) -> Self {
        BenchError::Run {
            phase,
            reason: reason.into(),
        }
    }

    /// Tag a failure with the run phase it happened in. Errors that already
    /// carry a phase keep it.
    pub fn in_phase(self, phase: RunPhase) -> Self {
        match self {
            BenchError::Run { .. } => self,
            other => BenchError::run(phase, other.to_string()),
        }
    }

    /// Phase of the run that failed, if this is a run-level failure.
    pub fn phase(&self) -> Option<RunPhase> {
        match self {
            BenchError::Run { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Get a user-facing error message suitable for terminal output
    pub fn user_message(&self) -> String {
        match self {
            BenchError::InvalidTask(msg) => format!("The task definition is invalid: {}", msg),
            BenchError::Histogram(msg) | BenchError::Record(msg) => {
                format!("Latency recording failed: {}", msg)
            }
            BenchError::Timing(msg) => format!("The host clock could not be used: {}", msg),
            BenchError::Run { phase, reason } => {
                format!("Benchmark run aborted during {}: {}", phase, reason)
            }
            BenchError::Config(e) => format!("Configuration error: {}", e),
            BenchError::Io(e) => format!("File operation failed: {}", e),
            BenchError::Serialization(e) => format!("Could not encode results: {}", e),
        }
    }
}

/// Top-level result type for fallible core operations.
pub type Result<T> = std::result::Result<T, BenchError>;
