//! Run summaries and their persistence
//!
//! A `RunSummary` is the serializable digest of one `RunResult`: percentile
//! tables for the three distributions plus the run counters and host status.
//! `RunRecordManager` stores summaries as timestamped JSON files so runs can
//! be compared later.

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::BenchError;
use crate::models::{RunResult, TaskDescriptor};
use crate::system::status::HostStatus;

const RECORD_PREFIX: &str = "run_";
const RECORD_SUFFIX: &str = ".json";

/// Percentile table of one latency distribution, in microseconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DistributionSummary {
    pub count: u64,
    pub min_us: f64,
    pub max_us: f64,
    pub mean_us: f64,
    pub stdev_us: f64,
    pub p50_us: f64,
    pub p90_us: f64,
    pub p99_us: f64,
    pub p99_9_us: f64,
    pub p99_99_us: f64,
}

impl DistributionSummary {
    /// Summarize a nanosecond histogram. An empty histogram yields all zeros.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.is_empty() {
            return DistributionSummary::default();
        }

        let us = |ns: u64| ns as f64 / 1000.0;
        DistributionSummary {
            count: hist.len(),
            min_us: us(hist.min()),
            max_us: us(hist.max()),
            mean_us: hist.mean() / 1000.0,
            stdev_us: hist.stdev() / 1000.0,
            p50_us: us(hist.value_at_quantile(0.50)),
            p90_us: us(hist.value_at_quantile(0.90)),
            p99_us: us(hist.value_at_quantile(0.99)),
            p99_9_us: us(hist.value_at_quantile(0.999)),
            p99_99_us: us(hist.value_at_quantile(0.9999)),
        }
    }
}

/// Serializable digest of one run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunSummary {
    pub task: TaskDescriptor,
    /// Human-readable task line, e.g. `Control [period=100ms, deadline=50ms]`
    pub task_description: String,
    pub load: u32,
    pub timestamp: DateTime<Utc>,
    pub iterations: u64,
    pub failed_iterations: u64,
    pub deadline_misses: u64,
    pub elapsed_ms: f64,
    pub cancelled: bool,
    pub deadline: DistributionSummary,
    pub period: DistributionSummary,
    pub hiccup: DistributionSummary,
    pub status_before: HostStatus,
    pub status_after: HostStatus,
}

impl RunSummary {
    pub fn from_result(task: &TaskDescriptor, result: &RunResult) -> Self {
        RunSummary {
            task: task.clone(),
            task_description: task.to_string(),
            load: result.load,
            timestamp: Utc::now(),
            iterations: result.iterations,
            failed_iterations: result.failed_iterations,
            deadline_misses: result.deadline_misses,
            elapsed_ms: result.elapsed.as_secs_f64() * 1000.0,
            cancelled: result.cancelled,
            deadline: DistributionSummary::from_histogram(&result.deadline),
            period: DistributionSummary::from_histogram(&result.period),
            hiccup: DistributionSummary::from_histogram(&result.hiccup),
            status_before: result.status_before.clone(),
            status_after: result.status_after.clone(),
        }
    }
}

/// Stores run summaries as `run_<unix-millis>_load<load>.json` files.
pub struct RunRecordManager {
    records_dir: PathBuf,
}

impl RunRecordManager {
    /// Manager rooted at `dir`, or at the default records directory when
    /// `dir` is `None`. The directory is created if missing.
    pub fn new(dir: Option<&Path>) -> Result<Self, BenchError> {
        let records_dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => Self::default_records_dir(),
        };
        fs::create_dir_all(&records_dir)?;
        Ok(RunRecordManager { records_dir })
    }

    /// `<data_local_dir>/hiccup-bench/runs`, falling back to /tmp
    pub fn default_records_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("hiccup-bench")
            .join("runs")
    }

    pub fn records_dir(&self) -> &Path {
        &self.records_dir
    }

    fn generate_filename(millis: u128, load: u32) -> String {
        format!("{}{}_load{}{}", RECORD_PREFIX, millis, load, RECORD_SUFFIX)
    }

    /// Write `summary` to disk and return the record id (its filename).
    pub fn save(&self, summary: &RunSummary) -> Result<String, BenchError> {
        let mut millis = summary.timestamp.timestamp_millis().max(0) as u128;
        let mut filename = Self::generate_filename(millis, summary.load);
        // Two runs of the same load in one millisecond would collide
        while self.records_dir.join(&filename).exists() {
            millis += 1;
            filename = Self::generate_filename(millis, summary.load);
        }

        let filepath = self.records_dir.join(&filename);
        let json = serde_json::to_string_pretty(summary)?;
        fs::write(&filepath, &json)?;

        log::info!("[HISTORY] Run summary saved: {}", filepath.display());
        Ok(filename)
    }

    /// Record ids, newest first.
    pub fn list(&self) -> Result<Vec<String>, BenchError> {
        let mut records = Vec::new();

        if !self.records_dir.exists() {
            return Ok(records);
        }

        for entry in fs::read_dir(&self.records_dir)? {
            let path = entry?.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if is_record_id(name) {
                    records.push(name.to_string());
                }
            }
        }

        // Newest first; ids share a prefix so sort on the embedded timestamp
        records.sort_by_key(|name| std::cmp::Reverse(record_millis(name)));
        Ok(records)
    }

    /// Read the summary stored under `id`, as returned by `save` or `list`.
    ///
    /// Anything that is not a bare record filename is rejected, so an id can
    /// never name a file outside the records directory.
    pub fn load(&self, id: &str) -> Result<RunSummary, BenchError> {
        if !is_record_id(id) {
            return Err(BenchError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a run record id: {:?}", id),
            )));
        }
        let json = fs::read_to_string(self.records_dir.join(id))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// `run_*.json` with no directory components
fn is_record_id(id: &str) -> bool {
    id.len() > RECORD_PREFIX.len() + RECORD_SUFFIX.len()
        && id.starts_with(RECORD_PREFIX)
        && id.ends_with(RECORD_SUFFIX)
        && !id.contains(['/', '\\'])
        && Path::new(id).file_name().and_then(|n| n.to_str()) == Some(id)
}

/// Timestamp embedded in a record id
fn record_millis(id: &str) -> u128 {
    id.strip_prefix(RECORD_PREFIX)
        .and_then(|rest| rest.split('_').next())
        .and_then(|millis| millis.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_result() -> RunResult {
        let mut deadline = Histogram::<u64>::new(3).unwrap();
        for v in [1_000u64, 2_000, 3_000, 10_000] {
            deadline.record(v).unwrap();
        }
        RunResult {
            load: 4,
            status_before: HostStatus::default(),
            status_after: HostStatus::default(),
            deadline,
            period: Histogram::<u64>::new(3).unwrap(),
            hiccup: Histogram::<u64>::new(3).unwrap(),
            iterations: 4,
            failed_iterations: 0,
            deadline_misses: 1,
            elapsed: Duration::from_millis(40),
            cancelled: false,
        }
    }

    #[test]
    fn test_distribution_summary_units() {
        let result = sample_result();
        let summary = DistributionSummary::from_histogram(&result.deadline);
        assert_eq!(summary.count, 4);
        assert!((summary.min_us - 1.0).abs() < 0.01);
        assert!((summary.max_us - 10.0).abs() < 0.01);
        assert!((summary.mean_us - 4.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_distribution_is_zero() {
        let summary = DistributionSummary::from_histogram(&Histogram::<u64>::new(3).unwrap());
        assert_eq!(summary, DistributionSummary::default());
    }

    #[test]
    fn test_run_summary_from_result() {
        let task = TaskDescriptor::from_millis("Control", 10, 5, 4).unwrap();
        let summary = RunSummary::from_result(&task, &sample_result());
        assert_eq!(summary.task_description, "Control [period=10ms, deadline=5ms]");
        assert_eq!(summary.deadline_misses, 1);
        assert!((summary.elapsed_ms - 40.0).abs() < f64::EPSILON);
        assert_eq!(summary.period.count, 0);
    }

    #[test]
    fn test_load_rejects_ids_outside_records_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let records = temp_dir.path().join("runs");
        let manager = RunRecordManager::new(Some(&records)).unwrap();

        // A valid summary one level up must stay unreachable
        let task = TaskDescriptor::from_millis("Control", 10, 5, 4).unwrap();
        let json = serde_json::to_string(&RunSummary::from_result(&task, &sample_result())).unwrap();
        fs::write(temp_dir.path().join("run_1_load4.json"), json).unwrap();

        for id in [
            "../run_1_load4.json",
            "run_../../run_1_load4.json",
            "/etc/passwd",
            "other.json",
            "run_.json",
            "run_1_load4.json/..",
        ] {
            let err = manager.load(id).unwrap_err();
            assert!(
                matches!(err, BenchError::Io(ref e) if e.kind() == io::ErrorKind::InvalidInput),
                "{} gave {:?}",
                id,
                err
            );
        }
    }

    #[test]
    fn test_record_ids() {
        assert!(is_record_id("run_1700000000123_load4.json"));
        assert!(!is_record_id("run_1700000000123_load4.json.bak"));
        assert!(!is_record_id("sub\\run_1_load1.json"));
    }

    #[test]
    fn test_record_millis() {
        assert_eq!(record_millis("run_1700000000123_load4.json"), 1_700_000_000_123);
        assert_eq!(record_millis("garbage.json"), 0);
    }
}
