//! Task, action trait and error types.
//!
//! A [`Task`] is the unit the scheduler drives: it owns a period, the drives
//! it depends on and the logical time of its last run. The work itself is
//! delegated to an [`Action`]. Implement `Action` to add a new kind of work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use super::period::Period;
use super::types::TaskId;
use crate::drive::{Drive, DriveMonitor};
use crate::volume::VolumeOpError;

/// Errors that can occur during a task run.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A volume-manager operation failed.
    #[error(transparent)]
    Volume(#[from] VolumeOpError),

    /// Action-specific failure with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

/// Why a due task did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A snapshot for this date already exists.
    AlreadyExists { snapshot: String },
    /// A drive the task depends on is in a low-power state.
    DriveAsleep { device: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyExists { snapshot } => {
                write!(f, "snapshot '{}' already exists", snapshot)
            }
            SkipReason::DriveAsleep { device } => write!(f, "device {} is sleeping", device),
        }
    }
}

/// Result of a task run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The action performed its work.
    Completed,
    /// The action had nothing to do.
    Skipped(SkipReason),
}

/// Coarse status of a run, used for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Skipped,
    Failed,
}

impl RunStatus {
    /// Classify the result of [`Task::run`], or its rendered form in a report.
    pub fn of<E>(result: &Result<TaskOutcome, E>) -> Self {
        match result {
            Ok(TaskOutcome::Completed) => RunStatus::Success,
            Ok(TaskOutcome::Skipped(_)) => RunStatus::Skipped,
            Err(_) => RunStatus::Failed,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::Skipped => "skipped",
            RunStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// The work a task performs when it is due.
#[async_trait]
pub trait Action: Send + Sync {
    /// Short name of the action kind, as written in configuration.
    fn kind(&self) -> &'static str;

    /// Perform the action for the logical time `now`.
    ///
    /// "Nothing to do" is reported as `Ok(TaskOutcome::Skipped(_))`, never as
    /// an error.
    async fn execute(&self, task: &TaskId, now: DateTime<Utc>) -> Result<TaskOutcome, TaskError>;

    /// Optional description for display/logging purposes.
    fn description(&self) -> Option<String> {
        None
    }
}

/// Action that only logs that the task would run.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAction;

#[async_trait]
impl Action for LogAction {
    fn kind(&self) -> &'static str {
        "log"
    }

    async fn execute(&self, task: &TaskId, now: DateTime<Utc>) -> Result<TaskOutcome, TaskError> {
        tracing::info!(task = %task, at = %now, "Task is due, nothing else to do");
        Ok(TaskOutcome::Completed)
    }
}

/// A periodic unit of work.
pub struct Task {
    id: TaskId,
    period: Period,
    drives: Vec<Drive>,
    last_run: Option<DateTime<Utc>>,
    action: Box<dyn Action>,
}

impl Task {
    /// Create a task that has never run.
    pub fn new(id: impl Into<TaskId>, period: Period, action: impl Action + 'static) -> Self {
        Self {
            id: id.into(),
            period,
            drives: Vec::new(),
            last_run: None,
            action: Box::new(action),
        }
    }

    /// Builder: add a drive the task depends on.
    pub fn with_drive(mut self, drive: Drive) -> Self {
        self.drives.push(drive);
        self
    }

    /// Builder: replace the drive list.
    pub fn with_drives(mut self, drives: impl IntoIterator<Item = Drive>) -> Self {
        self.drives = drives.into_iter().collect();
        self
    }

    /// Get the task identifier.
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Get the task period.
    pub fn period(&self) -> Period {
        self.period
    }

    /// Get the drives this task depends on.
    pub fn drives(&self) -> &[Drive] {
        &self.drives
    }

    /// Logical time of the last run, if any.
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    /// Get the action.
    pub fn action(&self) -> &dyn Action {
        self.action.as_ref()
    }

    /// Whether the task should run at `now`.
    ///
    /// True if it never ran, or at least one period elapsed since the last
    /// run. A `now` earlier than the last run is never due.
    pub fn due(&self, now: DateTime<Utc>) -> bool {
        match self.last_run {
            None => true,
            Some(last) => match now.signed_duration_since(last).to_std() {
                Ok(elapsed) => elapsed >= self.period.as_duration(),
                Err(_) => false,
            },
        }
    }

    /// Return the first drive reported asleep, querying drives in order.
    pub async fn drives_blocked(&self, monitor: &dyn DriveMonitor) -> Option<&Drive> {
        for drive in &self.drives {
            if monitor.is_asleep(drive.device()).await {
                return Some(drive);
            }
        }
        None
    }

    /// Record a run at `now` and perform the action.
    ///
    /// `last_run` is advanced before the action executes, so a failed run
    /// still waits a full period before the next attempt.
    pub async fn run(&mut self, now: DateTime<Utc>) -> Result<TaskOutcome, TaskError> {
        self.last_run = Some(now);
        self.action.execute(&self.id, now).await
    }

    /// Record a run at `now` without performing the action.
    pub fn skip(&mut self, now: DateTime<Utc>, reason: SkipReason) -> TaskOutcome {
        self.last_run = Some(now);
        TaskOutcome::Skipped(reason)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("period", &self.period)
            .field("drives", &self.drives)
            .field("last_run", &self.last_run)
            .field("action", &self.action.kind())
            .finish()
    }
}
