//! Host status snapshots
//!
//! Captured immediately before and after every benchmark run. The runner
//! treats the snapshot as opaque payload; it only ends up in the run result
//! and the persisted summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{ProcessesToUpdate, System};

/// 1/5/15 minute load averages
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Point-in-time view of the host
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HostStatus {
    pub captured_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub load_average: LoadAverage,
    pub total_memory_bytes: u64,
    pub used_memory_bytes: u64,
    pub total_swap_bytes: u64,
    pub used_swap_bytes: u64,
    /// Logical CPUs
    pub cpu_count: usize,
    /// Global CPU usage in percent since the previous capture
    pub global_cpu_usage: f32,
    pub process_count: usize,
}

impl Default for HostStatus {
    fn default() -> Self {
        HostStatus {
            captured_at: Utc::now(),
            uptime_secs: 0,
            load_average: LoadAverage::default(),
            total_memory_bytes: 0,
            used_memory_bytes: 0,
            total_swap_bytes: 0,
            used_swap_bytes: 0,
            cpu_count: 0,
            global_cpu_usage: 0.0,
            process_count: 0,
        }
    }
}

impl HostStatus {
    /// Fraction of physical memory in use (0.0..=1.0)
    pub fn memory_pressure(&self) -> f64 {
        if self.total_memory_bytes == 0 {
            return 0.0;
        }
        self.used_memory_bytes as f64 / self.total_memory_bytes as f64
    }
}

/// Source of host status snapshots. Called exactly twice per run.
pub trait StatusSource {
    fn capture_status(&mut self) -> HostStatus;
}

/// `StatusSource` backed by the sysinfo crate.
///
/// One `System` is kept across captures so that CPU usage reported by the
/// "after" snapshot covers the run itself.
pub struct SysinfoStatus {
    sys: System,
}

impl SysinfoStatus {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        SysinfoStatus { sys }
    }
}

impl Default for SysinfoStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSource for SysinfoStatus {
    fn capture_status(&mut self) -> HostStatus {
        self.sys.refresh_memory();
        self.sys.refresh_cpu_usage();
        self.sys.refresh_processes(ProcessesToUpdate::All, true);

        let load = System::load_average();

        HostStatus {
            captured_at: Utc::now(),
            uptime_secs: System::uptime(),
            load_average: LoadAverage {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            },
            total_memory_bytes: self.sys.total_memory(),
            used_memory_bytes: self.sys.used_memory(),
            total_swap_bytes: self.sys.total_swap(),
            used_swap_bytes: self.sys.used_swap(),
            cpu_count: num_cpus::get(),
            global_cpu_usage: self.sys.global_cpu_usage(),
            process_count: self.sys.processes().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysinfo_status_capture() {
        let mut source = SysinfoStatus::new();
        let status = source.capture_status();
        assert!(status.cpu_count >= 1);
        assert!(status.total_memory_bytes > 0);
        assert!(status.used_memory_bytes <= status.total_memory_bytes);
    }

    #[test]
    fn test_memory_pressure_bounds() {
        let mut status = HostStatus::default();
        assert_eq!(status.memory_pressure(), 0.0);
        status.total_memory_bytes = 1000;
        status.used_memory_bytes = 250;
        assert!((status.memory_pressure() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_host_status_serializes() {
        let status = HostStatus::default();
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"load_average\""));
        let back: HostStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}
