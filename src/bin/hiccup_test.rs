//! Standalone Hiccup Sanity Test
//!
//! Runs the hiccup probe on its own, with no workload in the foreground, and
//! prints the distribution of probe cycle times. On a quiet host every cycle
//! should take barely more than the 1ms resolution.
//!
//! Usage: cargo run --bin hiccup_test [seconds]
//!
//! Configuration:
//! - Duration: 10 seconds (or the first argument)
//! - Resolution: 1ms
//! - Allocation per cycle: enabled

use hiccup_bench::system::performance::diagnostic_buffer::{flush_global_buffer, init_global_buffer};
use hiccup_bench::{HiccupConfig, HiccupProbe};
use std::time::{Duration, Instant};

/// Cycles slower than `threshold_ns`
fn count_above(hist: &hdrhistogram::Histogram<u64>, threshold_ns: u64) -> u64 {
    hist.len() - hist.count_between(0, threshold_ns)
}

fn main() {
    let seconds: u64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(10);

    println!("=== Hiccup Probe Sanity Test ===");
    println!("Duration: {} seconds", seconds);
    println!("Resolution: 1ms");
    println!("Primitives: libc::clock_gettime, libc::clock_nanosleep");
    println!();

    let _ = init_global_buffer(1024);

    let probe = match HiccupProbe::start(HiccupConfig::default()) {
        Ok(probe) => probe,
        Err(e) => {
            eprintln!("Failed to start hiccup probe: {}", e.user_message());
            std::process::exit(1);
        }
    };

    println!("Test running...");
    let start_time = Instant::now();
    std::thread::sleep(Duration::from_secs(seconds));

    let hist = match probe.terminate() {
        Ok(hist) => hist,
        Err(e) => {
            eprintln!("Hiccup probe failed: {}", e.user_message());
            flush_global_buffer(Duration::from_secs(1));
            std::process::exit(1);
        }
    };
    let elapsed = start_time.elapsed();
    flush_global_buffer(Duration::from_secs(1));

    println!();
    println!("=== Test Complete ===");
    println!("Elapsed time: {:.3} seconds", elapsed.as_secs_f64());
    println!();
    println!("=== Cycle Time Statistics ===");
    println!("Samples recorded:  {}", hist.len());
    println!("Min cycle:         {} ns ({:.3} µs)", hist.min(), hist.min() as f64 / 1000.0);
    println!("Max cycle:         {} ns ({:.3} µs)", hist.max(), hist.max() as f64 / 1000.0);
    println!("Avg cycle:         {:.0} ns ({:.3} µs)", hist.mean(), hist.mean() / 1000.0);

    let p99 = hist.value_at_quantile(0.99);
    let p999 = hist.value_at_quantile(0.999);
    println!("P99 cycle:         {} ns ({:.3} µs)", p99, p99 as f64 / 1000.0);
    println!("P99.9 cycle:       {} ns ({:.3} µs)", p999, p999 as f64 / 1000.0);
    println!();

    println!("=== Diagnostics ===");
    println!("Cycles > 10ms (outliers): {}", count_above(&hist, 10_000_000));
    println!("Cycles > 2ms:             {}", count_above(&hist, 2_000_000));
    println!("Cycles > 1.5ms:           {}", count_above(&hist, 1_500_000));

    println!();
    println!("Test completed successfully!");
}
