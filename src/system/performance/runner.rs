//! Periodic Task Driver
//!
//! Drives a workload at a task's target period and measures two things per
//! run, both corrected for coordinated omission:
//! - **Deadline**: how long each invocation took, against the task deadline
//! - **Period**: the spacing between invocation starts, against the task period
//!
//! A hiccup probe runs alongside every measurement so host stalls can be told
//! apart from workload slowness.
//!
//! ## Windowing
//! A bounded task (non-zero period) gets one invocation at the start of each
//! window, then the driver busy-polls the clock until the window ends. An
//! invocation that overruns its window starts the next window immediately;
//! the period recorder's backfill accounts for the starts that were missed.
//! An unbounded task (zero period) is invoked back to back.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hdrhistogram::Histogram;
use log::Level;
use serde::{Deserialize, Serialize};

use super::clock::{self, duration_to_ns};
use super::diagnostic_buffer::send_diagnostic_at;
use super::hiccup::{HiccupConfig, HiccupProbe, SleepFn};
use super::recorder::MetricRecorder;
use crate::error::{BenchError, RunPhase, WorkloadError};
use crate::models::{RunResult, TaskDescriptor};
use crate::system::status::{StatusSource, SysinfoStatus};

/// An externally supplied unit of work, invoked once per iteration.
///
/// `load` is an opaque amount of work chosen by the caller; the driver passes
/// it through unchanged.
pub trait LoadGenerator {
    fn generate_load(&mut self, load: u32) -> Result<(), WorkloadError>;
}

impl<G: LoadGenerator + ?Sized> LoadGenerator for Box<G> {
    fn generate_load(&mut self, load: u32) -> Result<(), WorkloadError> {
        (**self).generate_load(load)
    }
}

impl<G: LoadGenerator + ?Sized> LoadGenerator for &mut G {
    fn generate_load(&mut self, load: u32) -> Result<(), WorkloadError> {
        (**self).generate_load(load)
    }
}

/// How many failed invocations a run tolerates before it is aborted.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct FailurePolicy {
    /// Abort once failed/attempted exceeds this ratio (0.0..=1.0)
    pub max_failure_ratio: f64,
    /// The ratio is only evaluated after this many invocations
    pub min_iterations: u64,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy {
            max_failure_ratio: 0.10,
            min_iterations: 20,
        }
    }
}

impl FailurePolicy {
    /// Never abort: every failure is reported and the run continues.
    pub fn tolerate_all() -> Self {
        FailurePolicy {
            max_failure_ratio: 1.0,
            min_iterations: u64::MAX,
        }
    }

    /// Err when `failures` out of `iterations` breaches the policy.
    pub fn check(&self, iterations: u64, failures: u64) -> Result<(), BenchError> {
        if failures == 0 || iterations < self.min_iterations {
            return Ok(());
        }

        let ratio = failures as f64 / iterations as f64;
        if ratio > self.max_failure_ratio {
            return Err(BenchError::run(
                RunPhase::MeasurementLoop,
                format!(
                    "{} of {} workload invocations failed ({:.1}% > {:.1}% allowed)",
                    failures,
                    iterations,
                    ratio * 100.0,
                    self.max_failure_ratio * 100.0
                ),
            ));
        }
        Ok(())
    }
}

/// Per-runner knobs that are not part of the task itself.
#[derive(Clone, Debug, Default)]
pub struct RunnerOptions {
    pub hiccup: HiccupConfig,
    pub failure_policy: FailurePolicy,
    /// Checked at every window boundary; setting it ends the run early
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

/// Lifecycle of one `run()` call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Measuring,
    Draining,
    Complete,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverState::Idle => write!(f, "Idle"),
            DriverState::Measuring => write!(f, "Measuring"),
            DriverState::Draining => write!(f, "Draining"),
            DriverState::Complete => write!(f, "Complete"),
        }
    }
}

/// Counters accumulated by the measurement loop
#[derive(Debug, Default)]
struct LoopStats {
    iterations: u64,
    failed_iterations: u64,
    deadline_misses: u64,
    elapsed_ns: u64,
    cancelled: bool,
}

/// The probe as seen from the measurement loop. A probe whose thread exited
/// on its own is joined at the next window boundary and its distribution
/// parked in `early`.
struct ProbeSlot {
    probe: Option<HiccupProbe>,
    early: Option<Histogram<u64>>,
}

impl ProbeSlot {
    fn new(probe: HiccupProbe) -> Self {
        ProbeSlot {
            probe: Some(probe),
            early: None,
        }
    }

    /// Join the probe now if its thread has already exited.
    fn check_health(&mut self) -> Result<(), BenchError> {
        if !self.probe.as_ref().map_or(false, |p| p.has_exited()) {
            return Ok(());
        }

        if let Some(probe) = self.probe.take() {
            let histogram = probe.terminate().map_err(|e| e.in_phase(RunPhase::ProbeDrain))?;
            send_diagnostic_at(
                Level::Warn,
                &format!("[RUNNER] Hiccup probe exited early after {} samples", histogram.len()),
            );
            self.early = Some(histogram);
        }
        Ok(())
    }

    fn drain(self) -> Result<Histogram<u64>, BenchError> {
        match (self.probe, self.early) {
            (Some(probe), _) => probe.terminate(),
            (None, Some(histogram)) => Ok(histogram),
            (None, None) => Err(BenchError::run(RunPhase::ProbeDrain, "hiccup probe failed before drain")),
        }
    }
}

/// Drives one task against one workload.
pub struct TaskRunner<G, S = SysinfoStatus> {
    task: TaskDescriptor,
    generator: G,
    status: S,
    run_duration: Duration,
    options: RunnerOptions,
    state: DriverState,
    probe_sleep: SleepFn,
}

impl<G: LoadGenerator> TaskRunner<G, SysinfoStatus> {
    /// Runner that snapshots host status through sysinfo.
    pub fn new(task: TaskDescriptor, generator: G, run_duration: Duration) -> Self {
        Self::with_status_source(task, generator, SysinfoStatus::new(), run_duration)
    }
}

impl<G: LoadGenerator, S: StatusSource> TaskRunner<G, S> {
    pub fn with_status_source(task: TaskDescriptor, generator: G, status: S, run_duration: Duration) -> Self {
        TaskRunner {
            task,
            generator,
            status,
            run_duration,
            options: RunnerOptions::default(),
            state: DriverState::Idle,
            probe_sleep: clock::sleep_ns,
        }
    }

    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    #[cfg(test)]
    fn with_probe_sleep(mut self, sleep: SleepFn) -> Self {
        self.probe_sleep = sleep;
        self
    }

    pub fn task(&self) -> &TaskDescriptor {
        &self.task
    }

    pub fn run_duration(&self) -> Duration {
        self.run_duration
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// State reached by the most recent `run()` call
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Run the workload for the configured duration and return the three
    /// distributions.
    ///
    /// On a fatal failure the probe is still stopped and joined before the
    /// error is returned. Partial results are discarded.
    pub fn run(&mut self, load: u32) -> Result<RunResult, BenchError> {
        self.transition(DriverState::Idle);

        let status_before = self.status.capture_status();

        let mut deadline_recorder = MetricRecorder::new().map_err(|e| e.in_phase(RunPhase::ProbeStart))?;
        let mut period_recorder = MetricRecorder::new().map_err(|e| e.in_phase(RunPhase::ProbeStart))?;
        let probe = HiccupProbe::start_with_sleep(self.options.hiccup.clone(), self.probe_sleep)
            .map_err(|e| e.in_phase(RunPhase::ProbeStart))?;
        let mut probe = ProbeSlot::new(probe);

        self.transition(DriverState::Measuring);
        let measured = self
            .measure(load, &mut deadline_recorder, &mut period_recorder, &mut probe)
            .map_err(|e| e.in_phase(RunPhase::MeasurementLoop));

        self.transition(DriverState::Draining);
        let drained = probe.drain().map_err(|e| e.in_phase(RunPhase::ProbeDrain));

        let stats = measured?;
        let hiccup = drained?;

        let status_after = self.status.capture_status();
        self.transition(DriverState::Complete);

        log::info!(
            "[RUNNER] {} load={}: {} iterations, {} failed, {} deadline misses in {:?}{}",
            self.task,
            load,
            stats.iterations,
            stats.failed_iterations,
            stats.deadline_misses,
            Duration::from_nanos(stats.elapsed_ns),
            if stats.cancelled { " (cancelled)" } else { "" }
        );

        Ok(RunResult {
            load,
            status_before,
            status_after,
            deadline: deadline_recorder.into_histogram(),
            period: period_recorder.into_histogram(),
            hiccup,
            iterations: stats.iterations,
            failed_iterations: stats.failed_iterations,
            deadline_misses: stats.deadline_misses,
            elapsed: Duration::from_nanos(stats.elapsed_ns),
            cancelled: stats.cancelled,
        })
    }

    /// Full run whose result is discarded, to bring caches, the allocator and
    /// the CPU frequency governor into steady state. Returns how long it took.
    pub fn warmup(&mut self, load: u32) -> Result<Duration, BenchError> {
        let started_ns = clock::now_ns();
        self.run(load)?;
        let took = Duration::from_nanos(clock::now_ns().saturating_sub(started_ns));
        log::debug!("[RUNNER] Warm-up of {} finished in {:?}", self.task, took);
        Ok(took)
    }

    fn transition(&mut self, next: DriverState) {
        log::debug!("[RUNNER] {}: {} -> {}", self.task.name(), self.state, next);
        self.state = next;
    }

    fn cancel_requested(&self) -> bool {
        self.options
            .cancel_flag
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Acquire))
    }

    /// The measurement loop. Never logs directly; diagnostics go through the
    /// non-blocking buffer.
    fn measure(
        &mut self,
        load: u32,
        deadline_recorder: &mut MetricRecorder,
        period_recorder: &mut MetricRecorder,
        probe: &mut ProbeSlot,
    ) -> Result<LoopStats, BenchError> {
        let period_ns = self.task.period_ns();
        let deadline_ns = self.task.deadline_ns();
        let policy = self.options.failure_policy;

        let mut stats = LoopStats::default();
        let mut previous_start_ns: Option<u64> = None;

        let loop_start_ns = clock::now_ns();
        let stop_ns = loop_start_ns.saturating_add(duration_to_ns(self.run_duration));

        loop {
            let window_start_ns = clock::now_ns();
            if window_start_ns >= stop_ns {
                break;
            }

            if self.cancel_requested() {
                stats.cancelled = true;
                send_diagnostic_at(
                    Level::Info,
                    &format!("[RUNNER] Cancelled after {} iterations", stats.iterations),
                );
                break;
            }

            probe.check_health()?;

            let invocation_start_ns = clock::now_ns();
            let outcome = invoke(&mut self.generator, load);
            let elapsed_ns = clock::now_ns().saturating_sub(invocation_start_ns);
            stats.iterations += 1;

            match outcome {
                Ok(()) => {
                    deadline_recorder.record(elapsed_ns, deadline_ns)?;
                    if deadline_ns > 0 && elapsed_ns > deadline_ns {
                        stats.deadline_misses += 1;
                    }
                }
                Err(e) => {
                    stats.failed_iterations += 1;
                    send_diagnostic_at(
                        Level::Warn,
                        &format!("[RUNNER] Iteration {} failed: {}", stats.iterations, e),
                    );
                }
            }

            if let Some(previous_ns) = previous_start_ns {
                period_recorder.record(invocation_start_ns.saturating_sub(previous_ns), period_ns)?;
            }
            previous_start_ns = Some(invocation_start_ns);

            policy.check(stats.iterations, stats.failed_iterations)?;

            if period_ns > 0 {
                let window_end_ns = window_start_ns.saturating_add(period_ns);
                clock::spin_until(window_end_ns.min(stop_ns));
            }
        }

        stats.elapsed_ns = clock::now_ns().saturating_sub(loop_start_ns);
        Ok(stats)
    }
}

/// One workload invocation with panics turned into `WorkloadError::Panicked`.
fn invoke<G: LoadGenerator>(generator: &mut G, load: u32) -> Result<(), WorkloadError> {
    match panic::catch_unwind(AssertUnwindSafe(|| generator.generate_load(load))) {
        Ok(result) => result,
        Err(panic_info) => {
            let reason = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            Err(WorkloadError::Panicked(reason))
        }
    }
}
