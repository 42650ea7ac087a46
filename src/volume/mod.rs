//! Volume manager abstraction and snapshot rotation.
//!
//! The retention policy in [`snapshot`] only talks to the volume manager
//! through the [`VolumeManager`] trait. [`LvmVolumeManager`] drives the LVM2
//! command line tools; `testing::InMemoryVolumeManager` is a test double.

mod lvm;
pub mod snapshot;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::execution::CommandError;

pub use lvm::{LvmVolumeManager, parse_lvs_output};
pub use snapshot::{ManagedSnapshot, SnapshotAction, SnapshotConfig};

/// Errors returned by volume-manager operations.
#[derive(Debug, Error)]
pub enum VolumeOpError {
    /// The command ran and exited with a non-zero status.
    #[error("{command} exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// The command could not be started.
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command did not finish in time.
    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

impl VolumeOpError {
    /// Name of the command that failed.
    pub fn command(&self) -> &str {
        match self {
            VolumeOpError::CommandFailed { command, .. }
            | VolumeOpError::Spawn { command, .. }
            | VolumeOpError::Timeout { command, .. } => command,
        }
    }

    /// Exit code, if the command ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            VolumeOpError::CommandFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<CommandError> for VolumeOpError {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::Spawn { command, source } => VolumeOpError::Spawn { command, source },
            CommandError::Timeout { command, timeout } => {
                VolumeOpError::Timeout { command, timeout }
            }
            CommandError::Failed {
                command,
                code,
                stderr,
            } => VolumeOpError::CommandFailed {
                command,
                code,
                stderr,
            },
        }
    }
}

/// A logical volume, identified by its group and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalVolume {
    group: String,
    name: String,
}

impl LogicalVolume {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Volume group name.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Logical volume name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<group>/<name>` path of another volume in the same group.
    pub fn sibling_path(&self, name: &str) -> String {
        format!("{}/{}", self.group, name)
    }
}

impl fmt::Display for LogicalVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.name)
    }
}

/// A snapshot as listed by the volume manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Snapshot volume name.
    pub name: String,
    /// Name of the volume it was taken from.
    pub origin: String,
}

impl Snapshot {
    pub fn new(name: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
        }
    }
}

/// Parameters of a snapshot creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    /// Name of the new snapshot.
    pub name: String,
    /// Size of the copy-on-write area, in volume-manager syntax (e.g. `20G`).
    pub size: String,
    /// Copy-on-write chunk size (e.g. `256K`).
    pub chunk_size: Option<String>,
    /// Simulate only; the volume set must not change.
    pub dry_run: bool,
}

/// Snapshot operations on logical volumes.
#[async_trait]
pub trait VolumeManager: Send + Sync {
    /// Create a snapshot of `volume`.
    async fn create_snapshot(
        &self,
        volume: &LogicalVolume,
        request: &SnapshotRequest,
    ) -> Result<(), VolumeOpError>;

    /// Remove the snapshot `name` from the group of `volume`.
    async fn remove_snapshot(
        &self,
        volume: &LogicalVolume,
        name: &str,
        dry_run: bool,
    ) -> Result<(), VolumeOpError>;

    /// List snapshots whose origin is `volume`, in the manager's order.
    async fn list_snapshots(&self, volume: &LogicalVolume) -> Result<Vec<Snapshot>, VolumeOpError>;
}
