use anyhow::Context;
use std::path::PathBuf;

use hiccup_bench::config::{create_default_config, load_config_from_file};
use hiccup_bench::logger::init_logging;
use hiccup_bench::system::performance::diagnostic_buffer::{flush_global_buffer, init_global_buffer};
use std::time::Duration;
use hiccup_bench::system::performance::{DistributionSummary, RunRecordManager, RunSummary, TaskRunner};
use hiccup_bench::BenchConfig;

/// Upper bound on waiting for queued diagnostics at exit
const DIAGNOSTIC_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> anyhow::Result<()> {
    let outcome = run();

    // Error paths too: a failed run's last diagnostics explain the failure
    flush_global_buffer(DIAGNOSTIC_FLUSH_TIMEOUT);
    log::logger().flush();
    outcome
}

fn run() -> anyhow::Result<()> {
    // =========================================================================
    // CONFIGURATION
    // =========================================================================
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => load_config_from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => create_default_config(),
    };
    config.validate()?;

    // =========================================================================
    // LOGGING INITIALIZATION
    // =========================================================================
    if let Err(e) = init_logging(config.level_filter()?, config.log_file.as_deref()) {
        eprintln!("[Main] WARNING: {}", e);
    }

    // Must exist before the probe thread sends its first diagnostic
    let _ = init_global_buffer(4096);

    log::info!("hiccup_bench {} starting", hiccup_bench::VERSION);
    log::info!("Task: {}", config.task);
    log::info!(
        "Run duration: {:?}, loads: {:?}, workload: {:?}",
        config.run_duration(),
        config.effective_loads(),
        config.workload
    );

    let summaries = run_benchmark(&config)?;
    print_summary_table(&summaries);

    let manager = RunRecordManager::new(config.results_dir.as_deref())
        .context("Failed to prepare the results directory")?;
    for summary in &summaries {
        let id = manager.save(summary)?;
        println!("Saved {}", manager.records_dir().join(id).display());
    }

    Ok(())
}

fn run_benchmark(config: &BenchConfig) -> anyhow::Result<Vec<RunSummary>> {
    let mut runner = TaskRunner::new(config.task.clone(), config.workload.build(), config.run_duration())
        .with_options(config.runner_options());

    let loads = config.effective_loads();

    if config.warmup {
        let load = loads.first().copied().unwrap_or(config.task.initial_workload());
        log::info!("Warming up at load {}", load);
        let took = runner.warmup(load).map_err(|e| anyhow::anyhow!(e.user_message()))?;
        log::info!("Warm-up finished in {:.3}s", took.as_secs_f64());
    }

    let mut summaries = Vec::with_capacity(loads.len());
    for load in loads {
        log::info!("Measuring load {}", load);
        let result = runner.run(load).map_err(|e| anyhow::anyhow!(e.user_message()))?;
        summaries.push(RunSummary::from_result(&config.task, &result));
    }

    Ok(summaries)
}

fn print_summary_table(summaries: &[RunSummary]) {
    println!();
    println!(
        "{:<10} {:<8} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8} {:>8}",
        "load", "metric", "count", "p50 µs", "p99 µs", "p99.9 µs", "max µs", "misses", "failed"
    );

    for summary in summaries {
        let rows: [(&str, &DistributionSummary); 3] = [
            ("deadline", &summary.deadline),
            ("period", &summary.period),
            ("hiccup", &summary.hiccup),
        ];
        for (i, (metric, dist)) in rows.iter().enumerate() {
            let (load, misses, failed) = if i == 0 {
                (
                    summary.load.to_string(),
                    summary.deadline_misses.to_string(),
                    summary.failed_iterations.to_string(),
                )
            } else {
                (String::new(), String::new(), String::new())
            };
            println!(
                "{:<10} {:<8} {:>10} {:>10.1} {:>10.1} {:>10.1} {:>10.1} {:>8} {:>8}",
                load, metric, dist.count, dist.p50_us, dist.p99_us, dist.p99_9_us, dist.max_us, misses, failed
            );
        }
    }
    println!();
}
