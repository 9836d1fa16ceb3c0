//! High-Precision Performance Measurement Module
//!
//! Measures how faithfully a periodic task meets its period and deadline on
//! this host, and how much of any slowness the host itself caused.
//!
//! ## Architecture
//! - **Clock**: CLOCK_MONOTONIC nanosecond reads and timed suspension
//! - **Recorder**: HDR histogram with coordinated-omission backfill
//! - **Hiccup**: background probe sampling host-induced stalls
//! - **Runner**: periodic task driver producing deadline/period distributions
//! - **Workload**: built-in load generators
//! - **Diagnostic Buffer**: non-blocking logging from timing loops
//! - **History**: run summaries persisted as JSON

pub mod clock;
pub mod diagnostic_buffer;
pub mod hiccup;
pub mod history;
pub mod recorder;
pub mod runner;
pub mod workload;

pub use diagnostic_buffer::{flush_global_buffer, init_global_buffer, send_diagnostic, DiagnosticBuffer};
pub use hiccup::{HiccupConfig, HiccupProbe};
pub use history::{DistributionSummary, RunRecordManager, RunSummary};
pub use recorder::MetricRecorder;
pub use runner::{DriverState, FailurePolicy, LoadGenerator, RunnerOptions, TaskRunner};
pub use workload::{FixedDurationWorkload, MemoryWorkload, SpinWorkload, WorkloadKind};
