//! Configuration-to-execution integration tests.
//!
//! Tests that load a YAML file from disk, build tasks against the in-memory
//! volume manager and run them.

use crate::common::{day, home};
use backuptasks::testing::{InMemoryVolumeManager, StaticDriveMonitor, VolumeOp};
use backuptasks::{ConfigError, LogicalVolume, RunStatus, Scheduler, TaskId, VolumeManager, load_tasks};
use chrono::TimeDelta;
use std::io::Write;
use std::sync::Arc;

const CONFIG: &str = r#"
timezone: UTC
tasks:
  home:
    actions: snapshot
    period: 1d
    drives: [/dev/sdb]
    lvm_vg_name: vg0
    lvm_lv_name: home
    lvm_snapshot_size: 20G
    lvm_snapshot_chunksize: 256K
    lvm_snapshot_nb: 2
  var:
    actions: [snapshot]
    period: 12h
    lvm_vg_name: vg0
    lvm_lv_name: var
    lvm_snapshot_size: 5G
    lvm_snapshot_nb: 1
"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_config_file_drives_rotation() {
    let file = write_config(CONFIG);
    let volumes = Arc::new(InMemoryVolumeManager::new());
    let shared: Arc<dyn VolumeManager> = volumes.clone();

    let (config, tasks) = load_tasks(file.path(), shared, false).unwrap();
    let mut scheduler = Scheduler::new(tasks, Arc::new(StaticDriveMonitor::new()))
        .with_max_tick(config.max_tick().unwrap());
    assert_eq!(scheduler.tick().unwrap().as_secs(), 12 * 3600);

    let start = day(2024, 3, 1);
    for half_day in 0..6 {
        scheduler.run_tick(start + TimeDelta::hours(12 * half_day)).await;
    }

    let var = LogicalVolume::new("vg0", "var");
    assert_eq!(
        volumes.snapshot_names(&home()),
        vec!["home-bt-20240302", "home-bt-20240303"]
    );
    // Twice a day, but one snapshot per date: the second run of each day is skipped.
    assert_eq!(volumes.snapshot_names(&var), vec!["var-bt-20240303"]);

    let requests = volumes.create_requests();
    assert!(requests
        .iter()
        .filter(|r| r.name.starts_with("home-"))
        .all(|r| r.chunk_size.as_deref() == Some("256K")));
}

#[tokio::test]
async fn test_dry_run_flag_reaches_volume_manager() {
    let file = write_config(CONFIG);
    let volumes = Arc::new(InMemoryVolumeManager::new());
    let shared: Arc<dyn VolumeManager> = volumes.clone();

    let (_, tasks) = load_tasks(file.path(), shared, true).unwrap();
    let mut scheduler = Scheduler::new(tasks, Arc::new(StaticDriveMonitor::new()));

    let reports = scheduler.run_tick(day(2024, 3, 1)).await;
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.status() == RunStatus::Success));

    assert!(volumes.snapshot_names(&home()).is_empty());
    assert!(volumes.operations().iter().all(|op| match op {
        VolumeOp::Create { dry_run, .. } | VolumeOp::Remove { dry_run, .. } => *dry_run,
        VolumeOp::List { .. } => true,
    }));
}

#[tokio::test]
async fn test_trigger_honors_sleeping_drive() {
    let file = write_config(CONFIG);
    let volumes = Arc::new(InMemoryVolumeManager::new());
    let shared: Arc<dyn VolumeManager> = volumes.clone();

    let (_, tasks) = load_tasks(file.path(), shared, false).unwrap();
    let drives = Arc::new(StaticDriveMonitor::new().with_asleep("/dev/sdb"));
    let mut scheduler = Scheduler::new(tasks, drives);

    let reports = scheduler
        .trigger(&TaskId::new("home"), day(2024, 3, 1))
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status(), RunStatus::Skipped);
    assert!(volumes.operations().is_empty());
}

#[test]
fn test_invalid_config_files_are_rejected() {
    let volumes: Arc<dyn VolumeManager> = Arc::new(InMemoryVolumeManager::new());

    let missing_key = write_config(
        r#"
tasks:
  home:
    actions: snapshot
    period: 1d
    lvm_vg_name: vg0
    lvm_lv_name: home
    lvm_snapshot_nb: 2
"#,
    );
    match load_tasks(missing_key.path(), volumes.clone(), false) {
        Err(ConfigError::MissingField(field)) => assert_eq!(field, "home.lvm_snapshot_size"),
        other => panic!("Expected MissingField, got {:?}", other.map(|(_, t)| t.len())),
    }

    let bad_period = write_config(
        r#"
tasks:
  home:
    actions: snapshot
    period: 1y
"#,
    );
    assert!(matches!(
        load_tasks(bad_period.path(), volumes, false),
        Err(ConfigError::InvalidPeriod { .. })
    ));
}
