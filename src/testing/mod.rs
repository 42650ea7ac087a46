//! Testing utilities for users of the backuptasks library.
//!
//! This module provides test doubles for the system boundaries:
//!
//! - [`InMemoryVolumeManager`]: a volume manager backed by a map, with an
//!   operation log and failure injection
//! - [`StaticDriveMonitor`]: a drive monitor with scripted sleeping devices
//! - [`RecordingAction`]: an action that records the logical time of each run

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::core::task::{Action, TaskError, TaskOutcome};
use crate::core::types::TaskId;
use crate::drive::DriveMonitor;
use crate::volume::{LogicalVolume, Snapshot, SnapshotRequest, VolumeManager, VolumeOpError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// An operation received by [`InMemoryVolumeManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeOp {
    List { volume: String },
    Create { name: String, dry_run: bool },
    Remove { name: String, dry_run: bool },
}

#[derive(Default)]
struct VolumeState {
    snapshots: HashMap<LogicalVolume, Vec<String>>,
    operations: Vec<VolumeOp>,
    create_requests: Vec<SnapshotRequest>,
    fail_list: Option<i32>,
    fail_create: Option<i32>,
    fail_remove: Option<i32>,
}

/// In-memory volume manager.
///
/// Snapshots are listed in insertion order. Dry-run operations are logged
/// and validated like real ones but never change the snapshot set.
///
/// # Example
///
/// ```
/// use backuptasks::testing::InMemoryVolumeManager;
/// use backuptasks::volume::LogicalVolume;
///
/// let home = LogicalVolume::new("vg0", "home");
/// let volumes = InMemoryVolumeManager::new().with_snapshot(&home, "home-bt-20240101");
/// assert_eq!(volumes.snapshot_names(&home), vec!["home-bt-20240101"]);
/// ```
#[derive(Default)]
pub struct InMemoryVolumeManager {
    state: Mutex<VolumeState>,
}

impl InMemoryVolumeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: pre-populate a snapshot of `volume`.
    pub fn with_snapshot(self, volume: &LogicalVolume, name: impl Into<String>) -> Self {
        self.insert_snapshot(volume, name);
        self
    }

    /// Add a snapshot of `volume` without logging an operation.
    pub fn insert_snapshot(&self, volume: &LogicalVolume, name: impl Into<String>) {
        lock(&self.state)
            .snapshots
            .entry(volume.clone())
            .or_default()
            .push(name.into());
    }

    /// Names of the snapshots of `volume`, in insertion order.
    pub fn snapshot_names(&self, volume: &LogicalVolume) -> Vec<String> {
        lock(&self.state)
            .snapshots
            .get(volume)
            .cloned()
            .unwrap_or_default()
    }

    /// All operations received so far.
    pub fn operations(&self) -> Vec<VolumeOp> {
        lock(&self.state).operations.clone()
    }

    /// Number of create and remove operations received.
    pub fn mutation_count(&self) -> usize {
        lock(&self.state)
            .operations
            .iter()
            .filter(|op| !matches!(op, VolumeOp::List { .. }))
            .count()
    }

    /// Every creation request received, including failed ones.
    pub fn create_requests(&self) -> Vec<SnapshotRequest> {
        lock(&self.state).create_requests.clone()
    }

    /// Make every list fail with exit code `code`.
    pub fn fail_list(&self, code: i32) {
        lock(&self.state).fail_list = Some(code);
    }

    /// Make every creation fail with exit code `code`.
    pub fn fail_create(&self, code: i32) {
        lock(&self.state).fail_create = Some(code);
    }

    /// Make every removal fail with exit code `code`.
    pub fn fail_remove(&self, code: i32) {
        lock(&self.state).fail_remove = Some(code);
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        let mut state = lock(&self.state);
        state.fail_list = None;
        state.fail_create = None;
        state.fail_remove = None;
    }
}

fn failure(command: &str, code: i32, stderr: impl Into<String>) -> VolumeOpError {
    VolumeOpError::CommandFailed {
        command: command.to_string(),
        code,
        stderr: stderr.into(),
    }
}

#[async_trait]
impl VolumeManager for InMemoryVolumeManager {
    async fn create_snapshot(
        &self,
        volume: &LogicalVolume,
        request: &SnapshotRequest,
    ) -> Result<(), VolumeOpError> {
        let mut state = lock(&self.state);
        state.operations.push(VolumeOp::Create {
            name: request.name.clone(),
            dry_run: request.dry_run,
        });
        state.create_requests.push(request.clone());

        if let Some(code) = state.fail_create {
            return Err(failure("lvcreate", code, "injected failure"));
        }
        let exists = state
            .snapshots
            .values()
            .flatten()
            .any(|name| *name == request.name);
        if exists {
            return Err(failure(
                "lvcreate",
                5,
                format!("Logical volume \"{}\" already exists", request.name),
            ));
        }
        if !request.dry_run {
            state
                .snapshots
                .entry(volume.clone())
                .or_default()
                .push(request.name.clone());
        }
        Ok(())
    }

    async fn remove_snapshot(
        &self,
        volume: &LogicalVolume,
        name: &str,
        dry_run: bool,
    ) -> Result<(), VolumeOpError> {
        let mut state = lock(&self.state);
        state.operations.push(VolumeOp::Remove {
            name: name.to_string(),
            dry_run,
        });

        if let Some(code) = state.fail_remove {
            return Err(failure("lvremove", code, "injected failure"));
        }
        let names = state.snapshots.entry(volume.clone()).or_default();
        match names.iter().position(|n| n == name) {
            Some(index) => {
                if !dry_run {
                    names.remove(index);
                }
                Ok(())
            }
            None => Err(failure(
                "lvremove",
                5,
                format!("Failed to find logical volume \"{}\"", volume.sibling_path(name)),
            )),
        }
    }

    async fn list_snapshots(&self, volume: &LogicalVolume) -> Result<Vec<Snapshot>, VolumeOpError> {
        let mut state = lock(&self.state);
        state.operations.push(VolumeOp::List {
            volume: volume.to_string(),
        });

        if let Some(code) = state.fail_list {
            return Err(failure("lvs", code, "injected failure"));
        }
        Ok(state
            .snapshots
            .get(volume)
            .map(|names| {
                names
                    .iter()
                    .map(|n| Snapshot::new(n.as_str(), volume.name()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Drive monitor with a scripted set of sleeping devices.
#[derive(Default)]
pub struct StaticDriveMonitor {
    asleep: Mutex<HashSet<String>>,
    probes: AtomicUsize,
}

impl StaticDriveMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: report `device` asleep.
    pub fn with_asleep(self, device: impl Into<String>) -> Self {
        self.set_asleep(device, true);
        self
    }

    /// Change the reported state of `device`.
    pub fn set_asleep(&self, device: impl Into<String>, asleep: bool) {
        let mut set = lock(&self.asleep);
        let device = device.into();
        if asleep {
            set.insert(device);
        } else {
            set.remove(&device);
        }
    }

    /// Number of probes answered so far.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriveMonitor for StaticDriveMonitor {
    async fn is_asleep(&self, device: &str) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        lock(&self.asleep).contains(device)
    }
}

/// Shared record of the runs performed by [`RecordingAction`]s.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    entries: Arc<Mutex<Vec<(TaskId, DateTime<Utc>)>>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logical times at which `task` ran.
    pub fn times_for(&self, task: &str) -> Vec<DateTime<Utc>> {
        lock(&self.entries)
            .iter()
            .filter(|(id, _)| id.as_str() == task)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, task: &TaskId, at: DateTime<Utc>) {
        lock(&self.entries).push((task.clone(), at));
    }
}

/// Action that records each run in a [`RunLog`].
pub struct RecordingAction {
    log: RunLog,
    fail: bool,
    initial_delay: Option<Duration>,
    delayed: AtomicBool,
}

impl RecordingAction {
    pub fn new(log: &RunLog) -> Self {
        Self {
            log: log.clone(),
            fail: false,
            initial_delay: None,
            delayed: AtomicBool::new(false),
        }
    }

    /// Builder: record the run, then fail it.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Builder: make the first run take `delay` (tokio time).
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }
}

#[async_trait]
impl Action for RecordingAction {
    fn kind(&self) -> &'static str {
        "record"
    }

    async fn execute(&self, task: &TaskId, now: DateTime<Utc>) -> Result<TaskOutcome, TaskError> {
        self.log.record(task, now);
        if let Some(delay) = self.initial_delay {
            if !self.delayed.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(delay).await;
            }
        }
        if self.fail {
            return Err(TaskError::ExecutionFailed("recorded failure".into()));
        }
        Ok(TaskOutcome::Completed)
    }
}
