//! Scheduler integration tests.
//!
//! Tests that run snapshot tasks through the tick-aligned loop under paused
//! tokio time, so days of schedule elapse instantly.

use crate::common::{daily_home_task, day, home};
use backuptasks::testing::{InMemoryVolumeManager, RecordingAction, RunLog, StaticDriveMonitor};
use backuptasks::{Drive, Period, Scheduler, SchedulerState, Task};
use std::sync::Arc;
use std::time::Duration;

const DAY: Duration = Duration::from_secs(86400);

#[tokio::test(start_paused = true)]
async fn test_daily_rotation_through_scheduler() {
    let volumes = Arc::new(InMemoryVolumeManager::new());
    let scheduler = Scheduler::new(
        vec![daily_home_task(&volumes, 2, false)],
        Arc::new(StaticDriveMonitor::new()),
    )
    .with_start_time(day(2024, 3, 1));

    let (handle, task) = scheduler.start().unwrap();
    tokio::time::sleep(DAY * 3 + Duration::from_secs(60)).await;
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    assert_eq!(
        volumes.snapshot_names(&home()),
        vec!["home-bt-20240303", "home-bt-20240304"]
    );
    assert_eq!(handle.state().await, SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_mixed_periods_share_one_tick() {
    let log = RunLog::new();
    let volumes = Arc::new(InMemoryVolumeManager::new());
    let scheduler = Scheduler::new(
        vec![
            daily_home_task(&volumes, 7, false),
            Task::new("six-hourly", Period::parse("6h").unwrap(), RecordingAction::new(&log)),
        ],
        Arc::new(StaticDriveMonitor::new()),
    )
    .with_start_time(day(2024, 3, 1));
    assert_eq!(scheduler.tick().unwrap(), Period::parse("6h").unwrap());

    let (handle, task) = scheduler.start().unwrap();
    tokio::time::sleep(DAY * 2 + Duration::from_secs(60)).await;
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    assert_eq!(log.times_for("six-hourly").len(), 9);
    assert_eq!(
        volumes.snapshot_names(&home()),
        vec!["home-bt-20240301", "home-bt-20240302", "home-bt-20240303"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_sleeping_drive_defers_snapshot_to_next_period() {
    let volumes = Arc::new(InMemoryVolumeManager::new());
    let drives = Arc::new(StaticDriveMonitor::new().with_asleep("/dev/sdb"));
    let task = daily_home_task(&volumes, 3, false).with_drive(Drive::new("/dev/sdb"));
    let scheduler = Scheduler::new(vec![task], drives.clone()).with_start_time(day(2024, 3, 1));

    let (handle, join) = scheduler.start().unwrap();

    // Day 1: the drive sleeps, nothing is created.
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(volumes.snapshot_names(&home()).is_empty());
    assert_eq!(volumes.operations().len(), 0);

    // Waking the drive mid-day does not trigger an immediate run.
    drives.set_asleep("/dev/sdb", false);
    tokio::time::sleep(DAY / 2).await;
    assert!(volumes.snapshot_names(&home()).is_empty());

    // Day 2: the task runs.
    tokio::time::sleep(DAY / 2).await;
    handle.shutdown().await.unwrap();
    join.await.unwrap();

    assert_eq!(volumes.snapshot_names(&home()), vec!["home-bt-20240302"]);
}

#[tokio::test(start_paused = true)]
async fn test_volume_failure_does_not_stop_loop() {
    let log = RunLog::new();
    let volumes = Arc::new(InMemoryVolumeManager::new());
    volumes.fail_list(5);
    let scheduler = Scheduler::new(
        vec![
            daily_home_task(&volumes, 2, false),
            Task::new("hourly", Period::parse("1h").unwrap(), RecordingAction::new(&log)),
        ],
        Arc::new(StaticDriveMonitor::new()),
    )
    .with_start_time(day(2024, 3, 1));

    let (handle, task) = scheduler.start().unwrap();
    tokio::time::sleep(Duration::from_secs(3 * 3600 + 60)).await;
    assert!(handle.is_running().await);
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    assert_eq!(log.len(), 4);
    assert!(volumes.snapshot_names(&home()).is_empty());
}
