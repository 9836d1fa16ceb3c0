//! Coordinated-Omission Corrected Metric Recorder
//!
//! Owns one HDR histogram of nanosecond samples. Every `record()` call stores
//! the measured value, and when the measurement overran its expected interval
//! also stores the samples that the stall kept from being taken:
//!
//! ```text
//! record(350, 100)  ->  350 (direct) + 250, 150, 50 (synthetic)
//! record(350, 0)    ->  350 (direct)
//! ```
//!
//! A recorder has exactly one writer. It is moved into the thread that fills
//! it and moved back out when that thread is joined; it is never shared.

use hdrhistogram::Histogram;
use std::time::Duration;

use super::clock::duration_to_ns;
use crate::error::BenchError;

/// Significant figures kept by every latency histogram
pub const HISTOGRAM_SIGFIG: u8 = 3;

pub struct MetricRecorder {
    /// Auto-resizing histogram of nanosecond values
    histogram: Histogram<u64>,
    /// Samples recorded as measured
    direct_count: u64,
    /// Samples reconstructed by the backfill
    synthetic_count: u64,
}

impl MetricRecorder {
    /// Create a recorder with an empty, auto-resizing histogram.
    pub fn new() -> Result<Self, BenchError> {
        let histogram = Histogram::<u64>::new(HISTOGRAM_SIGFIG)
            .map_err(|e| BenchError::Histogram(e.to_string()))?;

        Ok(MetricRecorder {
            histogram,
            direct_count: 0,
            synthetic_count: 0,
        })
    }

    /// Record `actual_ns` and backfill the samples a stall suppressed.
    ///
    /// With `expected_ns == 0` (unbounded tasks) no backfill happens. Otherwise
    /// `actual_ns - k * expected_ns` is recorded for k = 1, 2, … while the
    /// value stays strictly positive.
    pub fn record(&mut self, actual_ns: u64, expected_ns: u64) -> Result<(), BenchError> {
        self.record_value(actual_ns)?;
        self.direct_count += 1;

        if expected_ns == 0 || actual_ns <= expected_ns {
            return Ok(());
        }

        let mut missing_ns = actual_ns - expected_ns;
        loop {
            self.record_value(missing_ns)?;
            self.synthetic_count += 1;

            if missing_ns <= expected_ns {
                break;
            }
            missing_ns -= expected_ns;
        }

        Ok(())
    }

    /// `record()` for callers holding Durations.
    pub fn record_duration(&mut self, actual: Duration, expected: Duration) -> Result<(), BenchError> {
        self.record(duration_to_ns(actual), duration_to_ns(expected))
    }

    fn record_value(&mut self, value_ns: u64) -> Result<(), BenchError> {
        self.histogram
            .record(value_ns)
            .map_err(|e| BenchError::Record(format!("{} ns: {:?}", value_ns, e)))
    }

    /// Snapshot of the accumulated distribution. Does not reset the recorder.
    pub fn histogram(&self) -> Histogram<u64> {
        self.histogram.clone()
    }

    /// Consume the recorder and hand back its distribution.
    pub fn into_histogram(self) -> Histogram<u64> {
        self.histogram
    }

    pub fn direct_count(&self) -> u64 {
        self.direct_count
    }

    pub fn synthetic_count(&self) -> u64 {
        self.synthetic_count
    }

    /// Total samples in the histogram (direct + synthetic)
    pub fn total_count(&self) -> u64 {
        self.direct_count + self.synthetic_count
    }
}

impl std::fmt::Debug for MetricRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRecorder")
            .field("direct_count", &self.direct_count)
            .field("synthetic_count", &self.synthetic_count)
            .field("max_ns", &self.histogram.max())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Collect every recorded value (with multiplicity) at full precision.
    fn recorded_values(hist: &Histogram<u64>) -> Vec<(u64, u64)> {
        hist.iter_recorded()
            .map(|v| (hist.highest_equivalent(v.value_iterated_to()), v.count_at_value()))
            .collect()
    }

    #[test]
    fn test_backfill_for_overrun() {
        let mut recorder = MetricRecorder::new().unwrap();
        recorder.record(350, 100).unwrap();

        let hist = recorder.histogram();
        assert_eq!(hist.len(), 4);
        assert_eq!(recorded_values(&hist), vec![(50, 1), (150, 1), (250, 1), (350, 1)]);
        assert_eq!(recorder.direct_count(), 1);
        assert_eq!(recorder.synthetic_count(), 3);
    }

    #[test]
    fn test_exact_multiple_never_records_zero() {
        let mut recorder = MetricRecorder::new().unwrap();
        recorder.record(300, 100).unwrap();

        let hist = recorder.histogram();
        assert_eq!(recorded_values(&hist), vec![(100, 1), (200, 1), (300, 1)]);
        assert_eq!(hist.count_at(0), 0);
    }

    #[test]
    fn test_no_backfill_for_unbounded_interval() {
        let mut recorder = MetricRecorder::new().unwrap();
        recorder.record(1_000_000_000, 0).unwrap();

        assert_eq!(recorder.total_count(), 1);
        assert_eq!(recorder.histogram().len(), 1);
    }

    #[test]
    fn test_no_backfill_within_interval() {
        let mut recorder = MetricRecorder::new().unwrap();
        recorder.record(100, 100).unwrap();
        recorder.record(40, 100).unwrap();

        assert_eq!(recorder.synthetic_count(), 0);
        assert_eq!(recorder.histogram().len(), 2);
    }

    #[test]
    fn test_snapshot_does_not_reset() {
        let mut recorder = MetricRecorder::new().unwrap();
        recorder.record(10, 0).unwrap();
        let first = recorder.histogram();
        recorder.record(20, 0).unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(recorder.histogram().len(), 2);
        assert_eq!(recorder.into_histogram().len(), 2);
    }

    #[test]
    fn test_large_values_are_accepted() {
        let mut recorder = MetricRecorder::new().unwrap();
        // one hour in nanoseconds, well above the initial histogram range
        recorder.record(3_600_000_000_000, 0).unwrap();
        assert!(recorder.histogram().max() >= 3_599_000_000_000);
    }

    #[test]
    fn test_record_duration_matches_ns() {
        let mut recorder = MetricRecorder::new().unwrap();
        recorder
            .record_duration(Duration::from_millis(35), Duration::from_millis(10))
            .unwrap();
        assert_eq!(recorder.total_count(), 4);
    }
}
