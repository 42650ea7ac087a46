//! Snapshot rotation.
//!
//! A snapshot task keeps at most `retention_count` managed snapshots of one
//! logical volume. Managed snapshots are named `<volume>-bt-<YYYYMMDD>`; the
//! date code in the name is the only ordering key, and snapshots that do not
//! follow the convention are never touched.
//!
//! On each run the action:
//!
//! 1. lists the volume's snapshots and keeps the managed ones (the retention
//!    domain),
//! 2. skips if the snapshot for the run's date already exists,
//! 3. evicts the oldest snapshots until there is room for one more,
//! 4. creates the snapshot for the run's date.
//!
//! Duplicate detection happens before eviction, so a second run on the same
//! day never removes anything. Eviction happens before creation, so the
//! volume never holds more than `retention_count` managed snapshots. A failed
//! removal aborts the run before anything is created.
//!
//! Snapshots sharing the smallest date code are evicted in name order, so
//! the choice does not depend on the order the volume manager lists them in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{LogicalVolume, Snapshot, SnapshotRequest, VolumeManager};
use crate::config::ConfigError;
use crate::core::task::{Action, SkipReason, TaskError, TaskOutcome};
use crate::core::types::{DateCode, TaskId};

/// Separator between the volume name and the date code.
pub const MANAGED_MARKER: &str = "-bt-";

pub const KEY_VG_NAME: &str = "lvm_vg_name";
pub const KEY_LV_NAME: &str = "lvm_lv_name";
pub const KEY_SNAPSHOT_SIZE: &str = "lvm_snapshot_size";
pub const KEY_CHUNK_SIZE: &str = "lvm_snapshot_chunksize";
pub const KEY_RETENTION: &str = "lvm_snapshot_nb";

/// Keys understood by the snapshot action.
pub const SNAPSHOT_KEYS: [&str; 5] = [
    KEY_VG_NAME,
    KEY_LV_NAME,
    KEY_SNAPSHOT_SIZE,
    KEY_CHUNK_SIZE,
    KEY_RETENTION,
];

/// Name of the managed snapshot of `volume` for `date`.
pub fn managed_name(volume: &str, date: DateCode) -> String {
    format!("{}{}{}", volume, MANAGED_MARKER, date)
}

/// Date code of a managed snapshot name, or `None` if `name` is not managed
/// for `volume`.
pub fn parse_managed_name(volume: &str, name: &str) -> Option<DateCode> {
    let digits = name.strip_prefix(volume)?.strip_prefix(MANAGED_MARKER)?;
    DateCode::parse_digits(digits)
}

/// A snapshot that belongs to a retention domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedSnapshot {
    pub name: String,
    pub date_code: DateCode,
}

/// Keep the managed snapshots of `volume`, in listing order.
pub fn retention_domain(volume: &str, snapshots: &[Snapshot]) -> Vec<ManagedSnapshot> {
    snapshots
        .iter()
        .filter_map(|s| {
            parse_managed_name(volume, &s.name).map(|date_code| ManagedSnapshot {
                name: s.name.clone(),
                date_code,
            })
        })
        .collect()
}

/// Snapshots to evict so that one more fits within `retention_count`,
/// oldest first.
pub fn select_evictions(domain: &[ManagedSnapshot], retention_count: usize) -> Vec<&ManagedSnapshot> {
    if domain.len() < retention_count {
        return Vec::new();
    }
    let excess = domain.len() + 1 - retention_count;

    let mut ordered: Vec<&ManagedSnapshot> = domain.iter().collect();
    ordered.sort_by(|a, b| {
        a.date_code
            .cmp(&b.date_code)
            .then_with(|| a.name.cmp(&b.name))
    });
    ordered.truncate(excess);
    ordered
}

fn required<'a>(options: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str, ConfigError> {
    options
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingField(key.to_string()))
}

/// Configuration of a snapshot task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotConfig {
    volume: LogicalVolume,
    snapshot_size: String,
    chunk_size: Option<String>,
    retention_count: usize,
    dry_run: bool,
}

impl SnapshotConfig {
    /// Create a configuration; `retention_count` must be at least 1.
    pub fn new(
        volume_group: impl Into<String>,
        volume_name: impl Into<String>,
        snapshot_size: impl Into<String>,
        retention_count: usize,
    ) -> Result<Self, ConfigError> {
        if retention_count < 1 {
            return Err(ConfigError::InvalidConfig(format!(
                "{} must be at least 1",
                KEY_RETENTION
            )));
        }
        Ok(Self {
            volume: LogicalVolume::new(volume_group, volume_name),
            snapshot_size: snapshot_size.into(),
            chunk_size: None,
            retention_count,
            dry_run: false,
        })
    }

    /// Build a configuration from a task's option map.
    pub fn from_options(options: &BTreeMap<String, String>, dry_run: bool) -> Result<Self, ConfigError> {
        let raw_count = required(options, KEY_RETENTION)?;
        let count: i64 = raw_count.parse().map_err(|_| {
            ConfigError::InvalidConfig(format!(
                "{} must be an integer, got '{}'",
                KEY_RETENTION, raw_count
            ))
        })?;
        if count < 1 {
            return Err(ConfigError::InvalidConfig(format!(
                "{} must be at least 1, got {}",
                KEY_RETENTION, count
            )));
        }
        let count = usize::try_from(count).map_err(|_| {
            ConfigError::InvalidConfig(format!("{} is too large: {}", KEY_RETENTION, count))
        })?;

        let mut config = Self::new(
            required(options, KEY_VG_NAME)?,
            required(options, KEY_LV_NAME)?,
            required(options, KEY_SNAPSHOT_SIZE)?,
            count,
        )?
        .with_dry_run(dry_run);

        if let Some(chunk) = options.get(KEY_CHUNK_SIZE).map(|v| v.trim()) {
            if !chunk.is_empty() {
                config = config.with_chunk_size(chunk);
            }
        }

        Ok(config)
    }

    /// Builder: set the copy-on-write chunk size.
    pub fn with_chunk_size(mut self, chunk_size: impl Into<String>) -> Self {
        self.chunk_size = Some(chunk_size.into());
        self
    }

    /// Builder: simulate volume operations only.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn volume(&self) -> &LogicalVolume {
        &self.volume
    }

    pub fn snapshot_size(&self) -> &str {
        &self.snapshot_size
    }

    pub fn chunk_size(&self) -> Option<&str> {
        self.chunk_size.as_deref()
    }

    pub fn retention_count(&self) -> usize {
        self.retention_count
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Action that rotates the managed snapshots of one volume.
pub struct SnapshotAction {
    config: SnapshotConfig,
    volumes: Arc<dyn VolumeManager>,
    timezone: Tz,
}

impl SnapshotAction {
    /// Create the action; dates are taken in UTC.
    pub fn new(config: SnapshotConfig, volumes: Arc<dyn VolumeManager>) -> Self {
        Self {
            config,
            volumes,
            timezone: Tz::UTC,
        }
    }

    /// Builder: compute snapshot dates in `timezone`.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Name of the snapshot a run at `now` would create.
    ///
    /// `None` when the local date has no eight-digit date code.
    pub fn snapshot_name_at(&self, now: DateTime<Utc>) -> Option<String> {
        let date = DateCode::from_datetime(&now.with_timezone(&self.timezone))?;
        Some(managed_name(self.config.volume.name(), date))
    }
}

#[async_trait]
impl Action for SnapshotAction {
    fn kind(&self) -> &'static str {
        "snapshot"
    }

    async fn execute(&self, task: &TaskId, now: DateTime<Utc>) -> Result<TaskOutcome, TaskError> {
        let volume = &self.config.volume;
        let candidate = self.snapshot_name_at(now).ok_or_else(|| {
            TaskError::ExecutionFailed(format!("no date code for {}", now.with_timezone(&self.timezone)))
        })?;

        let listed = self.volumes.list_snapshots(volume).await?;
        let domain = retention_domain(volume.name(), &listed);
        tracing::debug!(
            task = %task,
            volume = %volume,
            listed = listed.len(),
            managed = domain.len(),
            "Listed snapshots"
        );

        if domain.iter().any(|s| s.name == candidate) {
            tracing::warn!(task = %task, snapshot = %candidate, "Snapshot already exists, skipping");
            return Ok(TaskOutcome::Skipped(SkipReason::AlreadyExists {
                snapshot: candidate,
            }));
        }

        for victim in select_evictions(&domain, self.config.retention_count) {
            tracing::info!(
                task = %task,
                snapshot = %victim.name,
                date = %victim.date_code,
                dry_run = self.config.dry_run,
                "Removing oldest snapshot"
            );
            self.volumes
                .remove_snapshot(volume, &victim.name, self.config.dry_run)
                .await?;
        }

        let request = SnapshotRequest {
            name: candidate,
            size: self.config.snapshot_size.clone(),
            chunk_size: self.config.chunk_size.clone(),
            dry_run: self.config.dry_run,
        };
        self.volumes.create_snapshot(volume, &request).await?;
        tracing::info!(
            task = %task,
            snapshot = %request.name,
            dry_run = self.config.dry_run,
            "Created snapshot"
        );

        Ok(TaskOutcome::Completed)
    }

    fn description(&self) -> Option<String> {
        let mut description = format!(
            "snapshot {} (size {}, keep {})",
            self.config.volume, self.config.snapshot_size, self.config.retention_count
        );
        if let Some(chunk) = &self.config.chunk_size {
            description.push_str(&format!(", chunk {}", chunk));
        }
        Some(description)
    }
}
