//! Built-in workloads
//!
//! Ready-made `LoadGenerator` implementations used by the binaries and the
//! tests. `load` scales the work linearly in all of them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::clock::{self, duration_to_ns};
use super::runner::LoadGenerator;
use crate::error::WorkloadError;

/// Default edge length of the spin workload's matrices
pub const DEFAULT_MATRIX_SIZE: usize = 32;

/// Default buffer size of the memory workload (KiB)
pub const DEFAULT_BUFFER_KIB: usize = 4096;

/// Writes performed per unit of load by `MemoryWorkload`
const WRITES_PER_LOAD: usize = 1024;

/// CPU-bound workload: `load` rounds of a square matrix multiply.
pub struct SpinWorkload {
    size: usize,
    a: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
}

impl SpinWorkload {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let mut a = vec![0.0; size * size];
        let mut b = vec![0.0; size * size];

        for i in 0..size {
            for j in 0..size {
                a[i * size + j] = (i as f64) * (j as f64) * 0.001;
                b[i * size + j] = (i as f64 + j as f64) * 0.001;
            }
        }

        SpinWorkload {
            size,
            a,
            b,
            c: vec![0.0; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl LoadGenerator for SpinWorkload {
    fn generate_load(&mut self, load: u32) -> Result<(), WorkloadError> {
        let n = self.size;
        for _ in 0..load {
            for i in 0..n {
                for j in 0..n {
                    let mut sum = 0.0;
                    for k in 0..n {
                        sum += self.a[i * n + k] * self.b[k * n + j];
                    }
                    // Volatile write to prevent the multiply being optimized out
                    unsafe {
                        std::ptr::write_volatile(&mut self.c[i * n + j], sum);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Memory-bound workload: `load × 1024` pseudo-random volatile writes into a
/// buffer, to thrash the caches.
pub struct MemoryWorkload {
    buffer: Vec<u8>,
    seed: u64,
}

impl MemoryWorkload {
    const MULTIPLIER: u64 = 6364136223846793005;
    const INCREMENT: u64 = 1442695040888963407;

    pub fn new(buffer_kib: usize) -> Self {
        MemoryWorkload {
            buffer: vec![0u8; buffer_kib.max(1) * 1024],
            seed: 0xdeadbeef,
        }
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

impl LoadGenerator for MemoryWorkload {
    fn generate_load(&mut self, load: u32) -> Result<(), WorkloadError> {
        let len = self.buffer.len();
        let writes = (load as usize).saturating_mul(WRITES_PER_LOAD);

        for _ in 0..writes {
            self.seed = self.seed.wrapping_mul(Self::MULTIPLIER).wrapping_add(Self::INCREMENT);
            let index = ((self.seed >> 32) as usize) % len;
            unsafe {
                std::ptr::write_volatile(&mut self.buffer[index], (self.seed & 0xFF) as u8);
            }
        }
        Ok(())
    }
}

/// Takes `unit × load`, either spinning on the clock or sleeping.
///
/// Mostly useful for tests that need an exactly known invocation time.
#[derive(Clone, Debug)]
pub struct FixedDurationWorkload {
    unit: Duration,
    sleep: bool,
}

impl FixedDurationWorkload {
    pub fn spinning(unit: Duration) -> Self {
        FixedDurationWorkload { unit, sleep: false }
    }

    pub fn sleeping(unit: Duration) -> Self {
        FixedDurationWorkload { unit, sleep: true }
    }

    pub fn unit(&self) -> Duration {
        self.unit
    }
}

impl LoadGenerator for FixedDurationWorkload {
    fn generate_load(&mut self, load: u32) -> Result<(), WorkloadError> {
        let total_ns = duration_to_ns(self.unit).saturating_mul(load as u64);
        if total_ns == 0 {
            return Ok(());
        }

        if self.sleep {
            std::thread::sleep(Duration::from_nanos(total_ns));
        } else {
            clock::spin_until(clock::now_ns().saturating_add(total_ns));
        }
        Ok(())
    }
}

/// Adapts a closure into a `LoadGenerator`.
pub struct FnWorkload<F>(F);

/// Wrap `f` so it can be driven by a `TaskRunner`.
pub fn from_fn<F>(f: F) -> FnWorkload<F>
where
    F: FnMut(u32) -> Result<(), WorkloadError>,
{
    FnWorkload(f)
}

impl<F> LoadGenerator for FnWorkload<F>
where
    F: FnMut(u32) -> Result<(), WorkloadError>,
{
    fn generate_load(&mut self, load: u32) -> Result<(), WorkloadError> {
        (self.0)(load)
    }
}

/// Workload selection as it appears in configuration files
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkloadKind {
    Spin {
        #[serde(default = "default_matrix_size")]
        matrix_size: usize,
    },
    Memory {
        #[serde(default = "default_buffer_kib")]
        buffer_kib: usize,
    },
    FixedDuration {
        unit_us: u64,
        #[serde(default)]
        sleep: bool,
    },
}

fn default_matrix_size() -> usize {
    DEFAULT_MATRIX_SIZE
}

fn default_buffer_kib() -> usize {
    DEFAULT_BUFFER_KIB
}

impl Default for WorkloadKind {
    fn default() -> Self {
        WorkloadKind::Spin {
            matrix_size: DEFAULT_MATRIX_SIZE,
        }
    }
}

impl WorkloadKind {
    /// Instantiate the selected workload.
    pub fn build(&self) -> Box<dyn LoadGenerator + Send> {
        match self {
            WorkloadKind::Spin { matrix_size } => Box::new(SpinWorkload::new(*matrix_size)),
            WorkloadKind::Memory { buffer_kib } => Box::new(MemoryWorkload::new(*buffer_kib)),
            WorkloadKind::FixedDuration { unit_us, sleep } => {
                let unit = Duration::from_micros(*unit_us);
                if *sleep {
                    Box::new(FixedDurationWorkload::sleeping(unit))
                } else {
                    Box::new(FixedDurationWorkload::spinning(unit))
                }
            }
        }
    }
}
