//! backuptasks - periodic LVM snapshot rotation.
//!
//! A [`Scheduler`] drives a set of [`Task`]s from a single tick-aligned loop.
//! Each task owns an [`Action`]; the [`SnapshotAction`] keeps a bounded,
//! date-named set of snapshots of one logical volume.

pub mod config;
pub mod core;
pub mod drive;
pub mod execution;
pub mod scheduler;
pub mod testing;
pub mod volume;

pub use config::{BackupConfig, ConfigError, TaskBuilder, YamlLoader, load_tasks};
pub use core::period::{Period, PeriodError};
pub use core::task::{Action, LogAction, RunStatus, SkipReason, Task, TaskError, TaskOutcome};
pub use core::types::{DateCode, TaskId};
pub use drive::{Drive, DriveMonitor, HdparmDriveMonitor};
pub use execution::{CommandError, CommandOutput, ExternalCommand, ExternalCommandBuilder};
pub use scheduler::{Scheduler, SchedulerError, SchedulerHandle, SchedulerState, TickReport};
pub use volume::{
    LogicalVolume, LvmVolumeManager, Snapshot, SnapshotAction, SnapshotConfig, SnapshotRequest,
    VolumeManager, VolumeOpError,
};
