//! Common test utilities shared across integration tests.

use backuptasks::testing::InMemoryVolumeManager;
use backuptasks::{LogicalVolume, Period, SnapshotAction, SnapshotConfig, Task};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

/// 03:00 UTC on the given day.
pub fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 3, 0, 0).unwrap()
}

/// The `vg0/home` volume used throughout the tests.
pub fn home() -> LogicalVolume {
    LogicalVolume::new("vg0", "home")
}

/// A daily snapshot task for `vg0/home` keeping `keep` snapshots.
pub fn daily_home_task(volumes: &Arc<InMemoryVolumeManager>, keep: usize, dry_run: bool) -> Task {
    let config = SnapshotConfig::new("vg0", "home", "20G", keep)
        .unwrap()
        .with_dry_run(dry_run);
    let action = SnapshotAction::new(config, volumes.clone());
    Task::new("home", Period::parse("1d").unwrap(), action)
}
