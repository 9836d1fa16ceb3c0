//! Configuration round trip and rejection tests

use hiccup_bench::config::{create_default_config, load_config_from_file, save_config_to_file};
use hiccup_bench::system::performance::WorkloadKind;
use hiccup_bench::{ConfigError, TaskDescriptor};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_save_and_load_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("bench.json");

    let mut original = create_default_config();
    original.task = TaskDescriptor::from_millis("Sensor", 20, 5, 3).unwrap();
    original.run_duration_ms = 2_500;
    original.warmup = false;
    original.loads = vec![1, 2, 8];
    original.hiccup.resolution_us = 500;
    original.workload = WorkloadKind::FixedDuration {
        unit_us: 250,
        sleep: true,
    };
    original.results_dir = Some(temp_dir.path().join("runs"));
    original.log_level = "debug".to_string();

    save_config_to_file(&original, &config_path).expect("Failed to save config");
    assert!(config_path.exists(), "Config file should exist after save");

    let loaded = load_config_from_file(&config_path).expect("Failed to load config");
    assert_eq!(loaded, original);
    assert_eq!(loaded.task.period(), Duration::from_millis(20));
    assert_eq!(loaded.hiccup.to_hiccup_config().resolution, Duration::from_micros(500));
    println!("[TEST] ✓ Config survived a save/load round trip");
}

#[test]
fn test_negative_period_rejected_at_load() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("negative.json");
    fs::write(
        &config_path,
        r#"{"task": {"name": "Broken", "period_ms": -100, "deadline_ms": 50, "initial_workload": 1}}"#,
    )
    .unwrap();

    match load_config_from_file(&config_path) {
        Err(ConfigError::InvalidJson(e)) => {
            assert!(e.to_string().contains("negative"), "unexpected message: {}", e);
        }
        other => panic!("expected InvalidJson, got {:?}", other),
    }
}

#[test]
fn test_wrong_extension_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("bench.yaml");
    let result = save_config_to_file(&create_default_config(), &config_path);
    assert!(matches!(result, Err(ConfigError::ValidationFailed(_))));
    assert!(!config_path.exists());
}

#[test]
fn test_empty_loads_fall_back_to_initial_workload() {
    let mut config = create_default_config();
    config.task = TaskDescriptor::from_millis("Heavy", 10, 10, 6).unwrap();
    assert_eq!(config.effective_loads(), vec![6]);
}
