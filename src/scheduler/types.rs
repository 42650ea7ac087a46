//! Scheduler type definitions.
//!
//! This module contains error types, state enums, run reports and command
//! types for the scheduler.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::core::task::{RunStatus, TaskError, TaskOutcome};
use crate::core::types::TaskId;

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler was given no task, so it has no tick.
    #[error("no task to schedule")]
    NoTasks,

    /// Task not found.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// The tick cannot be represented as a calendar duration.
    #[error("tick of {0} seconds is out of range")]
    TickOutOfRange(u64),

    /// Channel error.
    #[error("channel error: {0}")]
    ChannelError(String),
}

/// State of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Scheduler is stopped.
    Stopped,
    /// Scheduler is running.
    Running,
}

/// What happened to one task during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Task that was due.
    pub task: TaskId,
    /// Kind of the task's action.
    pub action: &'static str,
    /// Logical time of the run.
    pub at: DateTime<Utc>,
    /// Outcome, or the rendered error of a failed run.
    pub outcome: Result<TaskOutcome, String>,
}

impl TickReport {
    pub(crate) fn new(
        task: &TaskId,
        action: &'static str,
        at: DateTime<Utc>,
        result: &Result<TaskOutcome, TaskError>,
    ) -> Self {
        Self {
            task: task.clone(),
            action,
            at,
            outcome: match result {
                Ok(outcome) => Ok(outcome.clone()),
                Err(e) => Err(e.to_string()),
            },
        }
    }

    /// Coarse status of the run.
    pub fn status(&self) -> RunStatus {
        RunStatus::of(&self.outcome)
    }
}

/// Commands sent from a [`SchedulerHandle`](super::SchedulerHandle) to the loop.
pub(crate) enum SchedulerCommand {
    Shutdown { ack: oneshot::Sender<()> },
}
