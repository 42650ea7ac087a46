//! Snapshot rotation integration tests.
//!
//! Tests that drive a snapshot task day after day against the in-memory
//! volume manager and check the retention domain after each run.

use crate::common::{daily_home_task, day, home};
use backuptasks::testing::{InMemoryVolumeManager, VolumeOp};
use backuptasks::volume::snapshot::retention_domain;
use backuptasks::{LogicalVolume, SkipReason, TaskError, TaskOutcome, VolumeManager};
use chrono::TimeDelta;
use std::sync::Arc;

async fn managed_names(volumes: &InMemoryVolumeManager, volume: &LogicalVolume) -> Vec<String> {
    let listed = volumes.list_snapshots(volume).await.unwrap();
    let mut names: Vec<String> = retention_domain(volume.name(), &listed)
        .into_iter()
        .map(|s| s.name)
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_three_day_rotation_with_capacity_two() {
    let volumes = Arc::new(InMemoryVolumeManager::new());
    let mut task = daily_home_task(&volumes, 2, false);

    assert_eq!(task.run(day(2024, 3, 1)).await.unwrap(), TaskOutcome::Completed);
    assert_eq!(volumes.snapshot_names(&home()), vec!["home-bt-20240301"]);

    task.run(day(2024, 3, 2)).await.unwrap();
    assert_eq!(
        volumes.snapshot_names(&home()),
        vec!["home-bt-20240301", "home-bt-20240302"]
    );

    task.run(day(2024, 3, 3)).await.unwrap();
    assert_eq!(
        volumes.snapshot_names(&home()),
        vec!["home-bt-20240302", "home-bt-20240303"]
    );

    let removed: Vec<String> = volumes
        .operations()
        .into_iter()
        .filter_map(|op| match op {
            VolumeOp::Remove { name, .. } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(removed, vec!["home-bt-20240301"]);
}

#[tokio::test]
async fn test_domain_never_exceeds_capacity() {
    let volumes = Arc::new(InMemoryVolumeManager::new());
    let keep = 5;
    let mut task = daily_home_task(&volumes, keep, false);

    let mut previous = 0;
    let start = day(2024, 1, 25);
    for offset in 0..20 {
        task.run(start + TimeDelta::days(offset)).await.unwrap();

        let size = managed_names(&volumes, &home()).await.len();
        assert_eq!(size, keep.min(previous + 1), "after run {}", offset);
        previous = size;
    }

    // Month boundary: date codes keep ordering across 20240131 -> 20240201
    assert_eq!(
        managed_names(&volumes, &home()).await,
        vec![
            "home-bt-20240209",
            "home-bt-20240210",
            "home-bt-20240211",
            "home-bt-20240212",
            "home-bt-20240213",
        ]
    );
}

#[tokio::test]
async fn test_same_day_runs_are_idempotent() {
    let volumes = Arc::new(InMemoryVolumeManager::new());
    let mut task = daily_home_task(&volumes, 2, false);

    task.run(day(2024, 3, 1)).await.unwrap();
    task.run(day(2024, 3, 2)).await.unwrap();
    let before = volumes.mutation_count();

    let second = task.run(day(2024, 3, 2) + TimeDelta::hours(12)).await.unwrap();

    assert_eq!(
        second,
        TaskOutcome::Skipped(SkipReason::AlreadyExists {
            snapshot: "home-bt-20240302".into()
        })
    );
    assert_eq!(volumes.mutation_count(), before);
    assert_eq!(
        volumes.snapshot_names(&home()),
        vec!["home-bt-20240301", "home-bt-20240302"]
    );
}

#[tokio::test]
async fn test_eviction_picks_minimum_date_code() {
    let volumes = Arc::new(
        InMemoryVolumeManager::new()
            .with_snapshot(&home(), "home-bt-20240115")
            .with_snapshot(&home(), "home-bt-20240101")
            .with_snapshot(&home(), "home-bt-20240120"),
    );
    let mut task = daily_home_task(&volumes, 3, false);

    task.run(day(2024, 2, 1)).await.unwrap();

    assert_eq!(
        managed_names(&volumes, &home()).await,
        vec!["home-bt-20240115", "home-bt-20240120", "home-bt-20240201"]
    );
}

#[tokio::test]
async fn test_eviction_failure_leaves_new_snapshot_absent() {
    let volumes = Arc::new(
        InMemoryVolumeManager::new()
            .with_snapshot(&home(), "home-bt-20240301")
            .with_snapshot(&home(), "home-bt-20240302"),
    );
    volumes.fail_remove(5);
    let mut task = daily_home_task(&volumes, 2, false);

    let result = task.run(day(2024, 3, 3)).await;
    assert!(matches!(result, Err(TaskError::Volume(_))));
    assert!(!volumes
        .snapshot_names(&home())
        .contains(&"home-bt-20240303".to_string()));

    // The failed run still counts: the task waits a full period.
    assert!(!task.due(day(2024, 3, 3) + TimeDelta::hours(1)));

    volumes.clear_failures();
    task.run(day(2024, 3, 4)).await.unwrap();
    assert_eq!(
        volumes.snapshot_names(&home()),
        vec!["home-bt-20240302", "home-bt-20240304"]
    );
}

#[tokio::test]
async fn test_lowered_capacity_evicts_down_to_new_count() {
    let volumes = Arc::new(
        InMemoryVolumeManager::new()
            .with_snapshot(&home(), "home-bt-20240101")
            .with_snapshot(&home(), "home-bt-20240102")
            .with_snapshot(&home(), "home-bt-20240103")
            .with_snapshot(&home(), "home-bt-20240104"),
    );
    let mut task = daily_home_task(&volumes, 2, false);

    task.run(day(2024, 1, 5)).await.unwrap();

    assert_eq!(
        volumes.snapshot_names(&home()),
        vec!["home-bt-20240104", "home-bt-20240105"]
    );
}

#[tokio::test]
async fn test_dry_run_never_changes_domain() {
    let volumes = Arc::new(
        InMemoryVolumeManager::new()
            .with_snapshot(&home(), "home-bt-20240101")
            .with_snapshot(&home(), "home-bt-20240102"),
    );
    let mut task = daily_home_task(&volumes, 2, true);

    for offset in 0..5 {
        task.run(day(2024, 1, 3) + TimeDelta::days(offset)).await.unwrap();
    }

    assert_eq!(
        volumes.snapshot_names(&home()),
        vec!["home-bt-20240101", "home-bt-20240102"]
    );
    assert!(volumes.mutation_count() > 0);
}

#[tokio::test]
async fn test_other_volumes_and_manual_snapshots_untouched() {
    let var = LogicalVolume::new("vg0", "var");
    let volumes = Arc::new(
        InMemoryVolumeManager::new()
            .with_snapshot(&home(), "home-manual")
            .with_snapshot(&home(), "home-bt-20240101")
            .with_snapshot(&var, "var-bt-20231201"),
    );
    let mut task = daily_home_task(&volumes, 1, false);

    task.run(day(2024, 1, 2)).await.unwrap();

    assert_eq!(
        volumes.snapshot_names(&home()),
        vec!["home-manual", "home-bt-20240102"]
    );
    assert_eq!(volumes.snapshot_names(&var), vec!["var-bt-20231201"]);
}
