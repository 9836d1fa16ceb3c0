//! Hiccup Probe
//!
//! Background thread that measures host-induced stalls (scheduler jitter,
//! allocator stalls, paging) independently of the measured workload. Each
//! cycle sleeps for a fixed resolution, optionally allocates a small object,
//! and records how long the cycle really took against the resolution it was
//! supposed to take.
//!
//! The probe owns its `MetricRecorder` for its whole life. The recorder is
//! returned to the controller through `JoinHandle::join`, so the distribution
//! handed out by `terminate()` can never race with an in-flight sample.

use hdrhistogram::Histogram;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::clock::{self, duration_to_ns, SleepOutcome};
use super::diagnostic_buffer::{send_diagnostic, send_diagnostic_at};
use super::recorder::MetricRecorder;
use crate::error::{BenchError, RunPhase};

/// Default polling resolution of the probe
pub const DEFAULT_RESOLUTION: Duration = Duration::from_millis(1);

/// Configuration for the hiccup probe
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HiccupConfig {
    /// Suspension time of one probe cycle
    pub resolution: Duration,
    /// Allocate a fresh object every cycle to expose allocator stalls
    pub allocate_objects: bool,
}

impl Default for HiccupConfig {
    fn default() -> Self {
        HiccupConfig {
            resolution: DEFAULT_RESOLUTION,
            allocate_objects: true,
        }
    }
}

/// Timed suspension used by the probe loop
pub(crate) type SleepFn = fn(u64) -> std::io::Result<SleepOutcome>;

/// Object allocated once per cycle. It must not be zero-sized: `Box` of a
/// zero-sized type never reaches the allocator.
#[derive(Debug)]
struct SleepMarker {
    _cycle_start_ns: u64,
}

/// A running hiccup probe.
///
/// `terminate()` consumes the probe, so its distribution can be read exactly
/// once and only after the thread has been joined.
pub struct HiccupProbe {
    config: HiccupConfig,
    active: Arc<AtomicBool>,
    samples: Arc<AtomicU64>,
    handle: Option<JoinHandle<Result<MetricRecorder, BenchError>>>,
}

impl HiccupProbe {
    /// Spawn the probe thread and start sampling.
    pub fn start(config: HiccupConfig) -> Result<Self, BenchError> {
        Self::start_with_sleep(config, clock::sleep_ns)
    }

    /// `start()` with the suspension primitive swapped out.
    pub(crate) fn start_with_sleep(config: HiccupConfig, sleep: SleepFn) -> Result<Self, BenchError> {
        if config.resolution.is_zero() {
            return Err(BenchError::run(
                RunPhase::ProbeStart,
                "hiccup resolution must be greater than zero",
            ));
        }

        // Created here so a histogram failure surfaces before a thread exists
        let recorder = MetricRecorder::new().map_err(|e| e.in_phase(RunPhase::ProbeStart))?;

        let active = Arc::new(AtomicBool::new(true));
        let samples = Arc::new(AtomicU64::new(0));

        let thread_active = Arc::clone(&active);
        let thread_samples = Arc::clone(&samples);
        let thread_config = config.clone();

        let handle = thread::Builder::new()
            .name("hiccup-probe".to_string())
            .spawn(move || probe_loop(recorder, &thread_config, sleep, &thread_active, &thread_samples))
            .map_err(|e| {
                BenchError::run(
                    RunPhase::ProbeStart,
                    format!("failed to spawn hiccup probe thread: {}", e),
                )
            })?;

        log::debug!(
            "Hiccup probe started: resolution={:?}, allocate_objects={}",
            config.resolution,
            config.allocate_objects
        );

        Ok(HiccupProbe {
            config,
            active,
            samples,
            handle: Some(handle),
        })
    }

    /// Whether stop has not yet been requested
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Whether the probe thread has already exited (stopped or failed)
    pub fn has_exited(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Number of cycles recorded so far (direct samples only)
    pub fn sample_count(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &HiccupConfig {
        &self.config
    }

    /// Request stop, wait for the probe thread to exit and return its
    /// distribution.
    pub fn terminate(mut self) -> Result<Histogram<u64>, BenchError> {
        self.active.store(false, Ordering::Release);

        let handle = self
            .handle
            .take()
            .ok_or_else(|| BenchError::run(RunPhase::ProbeDrain, "hiccup probe already drained"))?;

        let recorder = match handle.join() {
            Ok(result) => result.map_err(|e| e.in_phase(RunPhase::ProbeDrain))?,
            Err(panic_info) => {
                let reason = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    format!("hiccup probe panicked: {}", s)
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    format!("hiccup probe panicked: {}", s)
                } else {
                    "hiccup probe panicked".to_string()
                };
                return Err(BenchError::run(RunPhase::ProbeDrain, reason));
            }
        };

        log::debug!(
            "Hiccup probe drained: {} cycles, {} synthetic samples",
            recorder.direct_count(),
            recorder.synthetic_count()
        );

        Ok(recorder.into_histogram())
    }
}

impl Drop for HiccupProbe {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.active.store(false, Ordering::Release);
            let _ = handle.join();
        }
    }
}

/// Body of the probe thread.
fn probe_loop(
    mut recorder: MetricRecorder,
    config: &HiccupConfig,
    sleep: SleepFn,
    active: &AtomicBool,
    samples: &AtomicU64,
) -> Result<MetricRecorder, BenchError> {
    let resolution_ns = duration_to_ns(config.resolution);
    let mut last_marker: Option<Box<SleepMarker>> = None;

    while active.load(Ordering::Acquire) {
        let cycle_start_ns = clock::now_ns();

        match sleep(resolution_ns) {
            Ok(SleepOutcome::Completed) => {}
            Ok(SleepOutcome::Interrupted) => {
                send_diagnostic("[HICCUP] Probe interrupted, terminating");
                break;
            }
            Err(e) => {
                send_diagnostic_at(log::Level::Error, &format!("[HICCUP] Suspension failed: {}", e));
                return Err(BenchError::Timing(format!(
                    "hiccup probe could not sleep for {} ns: {}",
                    resolution_ns, e
                )));
            }
        }

        if config.allocate_objects {
            // black_box keeps the optimizer from proving the allocation dead
            last_marker = Some(std::hint::black_box(Box::new(SleepMarker {
                _cycle_start_ns: cycle_start_ns,
            })));
        }

        let hiccup_ns = clock::now_ns().saturating_sub(cycle_start_ns);
        recorder.record(hiccup_ns, resolution_ns)?;
        samples.fetch_add(1, Ordering::Relaxed);
    }

    std::hint::black_box(last_marker);
    Ok(recorder)
}
