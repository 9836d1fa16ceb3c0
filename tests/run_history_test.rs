//! Run summary persistence tests

use hiccup_bench::system::performance::workload::FixedDurationWorkload;
use hiccup_bench::system::performance::{RunRecordManager, RunSummary};
use hiccup_bench::{HostStatus, StatusSource, TaskDescriptor, TaskRunner};
use std::time::Duration;
use tempfile::TempDir;

struct StaticStatus;

impl StatusSource for StaticStatus {
    fn capture_status(&mut self) -> HostStatus {
        HostStatus::default()
    }
}

#[test]
fn test_save_list_load_summaries() {
    let temp_dir = TempDir::new().unwrap();
    let manager = RunRecordManager::new(Some(temp_dir.path())).unwrap();
    assert!(manager.list().unwrap().is_empty());

    let task = TaskDescriptor::from_millis("Persisted", 5, 5, 1).unwrap();
    let mut runner = TaskRunner::with_status_source(
        task.clone(),
        FixedDurationWorkload::spinning(Duration::from_millis(1)),
        StaticStatus,
        Duration::from_millis(50),
    );

    let mut ids = Vec::new();
    for load in [1, 2] {
        let result = runner.run(load).unwrap();
        let summary = RunSummary::from_result(&task, &result);
        ids.push(manager.save(&summary).unwrap());
    }

    let listed = manager.list().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(ids.iter().all(|id| listed.contains(id)));
    assert!(ids[1].ends_with("_load2.json"));

    let loaded = manager.load(&ids[1]).unwrap();
    assert_eq!(loaded.load, 2);
    assert_eq!(loaded.task, task);
    assert!(loaded.deadline.count > 0);
    println!("[TEST] ✓ {} summaries persisted and reloaded", listed.len());
}

#[test]
fn test_same_millisecond_saves_do_not_collide() {
    let temp_dir = TempDir::new().unwrap();
    let manager = RunRecordManager::new(Some(temp_dir.path())).unwrap();

    let task = TaskDescriptor::continuous();
    let mut runner = TaskRunner::with_status_source(
        task.clone(),
        FixedDurationWorkload::spinning(Duration::from_micros(100)),
        StaticStatus,
        Duration::from_millis(5),
    );
    let summary = RunSummary::from_result(&task, &runner.run(1).unwrap());

    let first = manager.save(&summary).unwrap();
    let second = manager.save(&summary).unwrap();
    assert_ne!(first, second);
    assert_eq!(manager.list().unwrap().len(), 2);
}
