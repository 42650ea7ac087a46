//! LVM2 command line backend.

use async_trait::async_trait;
use std::time::Duration;

use super::{LogicalVolume, Snapshot, SnapshotRequest, VolumeManager, VolumeOpError};
use crate::execution::ExternalCommand;

/// Parse `lvs --noheadings --separator , -o lv_name,origin` output.
///
/// Rows without an origin (plain volumes) are kept with an empty origin so
/// callers can filter on it.
pub fn parse_lvs_output(output: &str) -> Vec<Snapshot> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(',') {
            Some((name, origin)) => Snapshot::new(name.trim(), origin.trim()),
            None => Snapshot::new(line, ""),
        })
        .collect()
}

/// Volume manager that shells out to `lvcreate`, `lvremove` and `lvs`.
#[derive(Debug, Clone)]
pub struct LvmVolumeManager {
    timeout: Option<Duration>,
}

impl Default for LvmVolumeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LvmVolumeManager {
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Bound every LVM command by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the `lvcreate` invocation for a snapshot.
    pub fn create_command(&self, volume: &LogicalVolume, request: &SnapshotRequest) -> ExternalCommand {
        let mut builder = ExternalCommand::builder("lvcreate")
            .arg("--snapshot")
            .args(["--name", request.name.as_str()])
            .args(["--size", request.size.as_str()]);

        if let Some(chunk_size) = &request.chunk_size {
            builder = builder.args(["--chunksize", chunk_size.as_str()]);
        }
        if request.dry_run {
            builder = builder.arg("--test");
        }

        builder
            .arg(volume.to_string())
            .maybe_timeout(self.timeout)
            .build()
    }

    /// Build the `lvremove` invocation for a snapshot.
    pub fn remove_command(&self, volume: &LogicalVolume, name: &str, dry_run: bool) -> ExternalCommand {
        let mut builder = ExternalCommand::builder("lvremove").arg("--force");
        if dry_run {
            builder = builder.arg("--test");
        }
        builder
            .arg(volume.sibling_path(name))
            .maybe_timeout(self.timeout)
            .build()
    }

    /// Build the `lvs` invocation listing the volume group.
    pub fn list_command(&self, volume: &LogicalVolume) -> ExternalCommand {
        ExternalCommand::builder("lvs")
            .args(["--noheadings", "--separator", ",", "-o", "lv_name,origin"])
            .arg(volume.group())
            .maybe_timeout(self.timeout)
            .build()
    }
}

#[async_trait]
impl VolumeManager for LvmVolumeManager {
    async fn create_snapshot(
        &self,
        volume: &LogicalVolume,
        request: &SnapshotRequest,
    ) -> Result<(), VolumeOpError> {
        let cmd = self.create_command(volume, request);
        tracing::info!(command = %cmd, "Creating snapshot");
        cmd.output().await?;
        Ok(())
    }

    async fn remove_snapshot(
        &self,
        volume: &LogicalVolume,
        name: &str,
        dry_run: bool,
    ) -> Result<(), VolumeOpError> {
        let cmd = self.remove_command(volume, name, dry_run);
        tracing::info!(command = %cmd, "Removing snapshot");
        cmd.output().await?;
        Ok(())
    }

    async fn list_snapshots(&self, volume: &LogicalVolume) -> Result<Vec<Snapshot>, VolumeOpError> {
        let cmd = self.list_command(volume);
        tracing::debug!(command = %cmd, "Listing snapshots");
        let output = cmd.output().await?;
        Ok(parse_lvs_output(&output.stdout)
            .into_iter()
            .filter(|s| s.origin == volume.name())
            .collect())
    }
}
