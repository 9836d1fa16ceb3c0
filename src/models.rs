//! Core data structures: the task descriptor a run is configured with and the
//! result a run produces.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::BenchError;
use crate::system::status::HostStatus;

const NANOS_PER_MILLI: u64 = 1_000_000;

/// Workload used by the continuous task
const CONTINUOUS_INITIAL_WORKLOAD: u32 = 1;

/// A periodic task: how often an iteration should start (period), how long
/// one iteration may take (deadline) and how much work to request initially.
///
/// A zero period denotes an unbounded (continuous) task: iterations run back
/// to back and no coordinated-omission correction applies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TaskDescriptorFile", into = "TaskDescriptorFile")]
pub struct TaskDescriptor {
    name: String,
    period: Duration,
    deadline: Duration,
    initial_workload: u32,
}

impl TaskDescriptor {
    pub fn new(name: impl Into<String>, period: Duration, deadline: Duration, initial_workload: u32) -> Self {
        TaskDescriptor {
            name: name.into(),
            period,
            deadline,
            initial_workload,
        }
    }

    /// Build a task from millisecond values, rejecting negative or
    /// out-of-range inputs.
    pub fn from_millis(
        name: impl Into<String>,
        period_ms: i64,
        deadline_ms: i64,
        initial_workload: u32,
    ) -> Result<Self, BenchError> {
        let period = millis_to_duration("period", period_ms)?;
        let deadline = millis_to_duration("deadline", deadline_ms)?;
        Ok(Self::new(name, period, deadline, initial_workload))
    }

    /// Task with no period and no deadline: iterate as fast as possible.
    pub fn continuous() -> Self {
        Self::new(
            "ContinuousCycle",
            Duration::ZERO,
            Duration::ZERO,
            CONTINUOUS_INITIAL_WORKLOAD,
        )
    }

    /// True when the task has no enforced cadence
    pub fn is_unbounded(&self) -> bool {
        self.period.is_zero()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn initial_workload(&self) -> u32 {
        self.initial_workload
    }

    pub fn period_ns(&self) -> u64 {
        crate::system::performance::clock::duration_to_ns(self.period)
    }

    pub fn deadline_ns(&self) -> u64 {
        crate::system::performance::clock::duration_to_ns(self.deadline)
    }
}

impl fmt::Display for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [period={}, deadline={}]",
            self.name,
            DisplayMillis(self.period),
            DisplayMillis(self.deadline)
        )
    }
}

/// `100ms` for whole milliseconds, `0.5ms` otherwise
struct DisplayMillis(Duration);

impl fmt::Display for DisplayMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = crate::system::performance::clock::duration_to_ns(self.0);
        if ns % NANOS_PER_MILLI == 0 {
            write!(f, "{}ms", ns / NANOS_PER_MILLI)
        } else {
            write!(f, "{}ms", ns as f64 / NANOS_PER_MILLI as f64)
        }
    }
}

fn millis_to_duration(field: &str, ms: i64) -> Result<Duration, BenchError> {
    if ms < 0 {
        return Err(BenchError::InvalidTask(format!(
            "{} must not be negative (got {} ms)",
            field, ms
        )));
    }
    let ms = ms as u64;
    if ms.checked_mul(NANOS_PER_MILLI).is_none() {
        return Err(BenchError::InvalidTask(format!(
            "{} of {} ms does not fit in nanoseconds",
            field, ms
        )));
    }
    Ok(Duration::from_millis(ms))
}

/// On-disk shape of a task descriptor.
///
/// Times are written as `period_ms`/`deadline_ms` when they are whole
/// milliseconds and as `period_ns`/`deadline_ns` otherwise. Exactly one of
/// each pair must be present when reading.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
struct TaskDescriptorFile {
    #[serde(default = "default_task_name")]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    period_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    period_ns: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deadline_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deadline_ns: Option<u64>,
    initial_workload: u32,
}

fn default_task_name() -> String {
    "Task".to_string()
}

fn read_time(field: &str, ms: Option<i64>, ns: Option<u64>) -> Result<Duration, BenchError> {
    match (ms, ns) {
        (Some(ms), None) => millis_to_duration(field, ms),
        (None, Some(ns)) => Ok(Duration::from_nanos(ns)),
        (Some(_), Some(_)) => Err(BenchError::InvalidTask(format!(
            "give either {0}_ms or {0}_ns, not both",
            field
        ))),
        (None, None) => Err(BenchError::InvalidTask(format!("missing {0}_ms", field))),
    }
}

/// Whole milliseconds as `(Some(ms), None)`, anything finer as `(None, Some(ns))`
fn write_time(d: Duration) -> (Option<i64>, Option<u64>) {
    let ns = crate::system::performance::clock::duration_to_ns(d);
    if ns % NANOS_PER_MILLI == 0 {
        (Some((ns / NANOS_PER_MILLI) as i64), None)
    } else {
        (None, Some(ns))
    }
}

impl TryFrom<TaskDescriptorFile> for TaskDescriptor {
    type Error = BenchError;

    fn try_from(file: TaskDescriptorFile) -> Result<Self, Self::Error> {
        let period = read_time("period", file.period_ms, file.period_ns)?;
        let deadline = read_time("deadline", file.deadline_ms, file.deadline_ns)?;
        Ok(TaskDescriptor::new(file.name, period, deadline, file.initial_workload))
    }
}

impl From<TaskDescriptor> for TaskDescriptorFile {
    fn from(task: TaskDescriptor) -> Self {
        let (period_ms, period_ns) = write_time(task.period);
        let (deadline_ms, deadline_ns) = write_time(task.deadline);
        TaskDescriptorFile {
            name: task.name,
            period_ms,
            period_ns,
            deadline_ms,
            deadline_ns,
            initial_workload: task.initial_workload,
        }
    }
}

/// Everything one `TaskRunner::run` produced. All histograms hold
/// nanosecond values.
#[derive(Clone, Debug)]
pub struct RunResult {
    /// Load passed to the workload on every iteration
    pub load: u32,
    pub status_before: HostStatus,
    pub status_after: HostStatus,
    /// Iteration execution times, corrected against the deadline
    pub deadline: Histogram<u64>,
    /// Spacing between iteration starts, corrected against the period
    pub period: Histogram<u64>,
    /// Host hiccups sampled by the probe during the run
    pub hiccup: Histogram<u64>,
    /// Workload invocations attempted
    pub iterations: u64,
    /// Invocations that failed (error or panic) and contributed no deadline sample
    pub failed_iterations: u64,
    /// Successful invocations that ran longer than a non-zero deadline
    pub deadline_misses: u64,
    /// Wall-clock time of the measurement loop
    pub elapsed: Duration,
    /// The run ended early because its cancellation flag was set
    pub cancelled: bool,
}

impl RunResult {
    /// Fraction of attempted iterations that failed
    pub fn failure_ratio(&self) -> f64 {
        if self.iterations == 0 {
            return 0.0;
        }
        self.failed_iterations as f64 / self.iterations as f64
    }
}
