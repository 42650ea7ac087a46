//! Tick-aligned scheduling loop.
//!
//! The loop drives every task from a single timer. Tick `i` has the logical
//! time `loop_start + i * tick` and the wall-clock deadline
//! `start + (i + 1) * tick`; both derive from a fixed origin, so sleeping
//! never accumulates drift. When a tick overruns its deadline the sleep is
//! skipped and the next tick runs immediately with its own logical time.
//!
//! Tasks run one after another, in registration order. A failing task is
//! logged and never stops the loop.

use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::core::period::Period;
use crate::core::task::{SkipReason, Task, TaskOutcome};
use crate::core::types::TaskId;
use crate::drive::DriveMonitor;

use super::handle::{COMMAND_CHANNEL_BUFFER, SchedulerHandle};
use super::tick::{bounded_tick, common_tick};
use super::types::{SchedulerCommand, SchedulerError, SchedulerState, TickReport};

/// Periodic task scheduler.
pub struct Scheduler {
    /// Tasks, in run order.
    tasks: Vec<Task>,
    /// Drive power-state probe.
    drives: Arc<dyn DriveMonitor>,
    /// Upper bound of the tick (default: one day).
    max_tick: Period,
    /// Logical time of the first tick (default: now).
    start_time: Option<DateTime<Utc>>,
}

impl Scheduler {
    /// Create a scheduler for `tasks`.
    pub fn new(tasks: Vec<Task>, drives: Arc<dyn DriveMonitor>) -> Self {
        Self {
            tasks,
            drives,
            max_tick: Period::DAY,
            start_time: None,
        }
    }

    /// Set the upper bound of the tick.
    pub fn with_max_tick(mut self, max_tick: Period) -> Self {
        self.max_tick = max_tick;
        self
    }

    /// Set the logical time of the first tick.
    pub fn with_start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    /// Registered tasks, in run order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// The tick: gcd of all periods, bounded by the maximum tick.
    pub fn tick(&self) -> Result<Period, SchedulerError> {
        let gcd = common_tick(self.tasks.iter().map(Task::period)).ok_or(SchedulerError::NoTasks)?;
        let tick = bounded_tick(gcd, self.max_tick);
        if tick != gcd {
            tracing::debug!(gcd = %gcd, tick = %tick, max = %self.max_tick, "Tick bounded below period gcd");
        }
        Ok(tick)
    }

    /// Run every due task for the logical time `now`.
    ///
    /// Returns one report per task that was due.
    pub async fn run_tick(&mut self, now: DateTime<Utc>) -> Vec<TickReport> {
        let drives = self.drives.as_ref();
        let mut reports = Vec::new();
        for task in &mut self.tasks {
            if task.due(now) {
                reports.push(run_task(task, drives, now).await);
            }
        }
        reports
    }

    /// Run every task named `task_id` at `now`, bypassing its period.
    pub async fn trigger(
        &mut self,
        task_id: &TaskId,
        now: DateTime<Utc>,
    ) -> Result<Vec<TickReport>, SchedulerError> {
        let drives = self.drives.as_ref();
        let mut reports = Vec::new();
        for task in self.tasks.iter_mut().filter(|t| t.id() == task_id) {
            tracing::info!(task = %task_id, "Manual trigger");
            reports.push(run_task(task, drives, now).await);
        }
        if reports.is_empty() {
            return Err(SchedulerError::TaskNotFound(task_id.to_string()));
        }
        Ok(reports)
    }

    /// Start the scheduling loop and return a handle for controlling it.
    ///
    /// Fails without spawning anything when there is no task.
    pub fn start(self) -> Result<(SchedulerHandle, JoinHandle<()>), SchedulerError> {
        let tick = self.tick()?;
        let step = TimeDelta::from_std(tick.as_duration())
            .map_err(|_| SchedulerError::TickOutOfRange(tick.as_secs()))?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let state = Arc::new(RwLock::new(SchedulerState::Running));

        let handle = SchedulerHandle {
            command_tx,
            state: Arc::clone(&state),
        };

        let scheduler_task = tokio::spawn(async move {
            self.run(tick, step, command_rx, state).await;
        });

        Ok((handle, scheduler_task))
    }

    /// Main scheduler loop.
    async fn run(
        mut self,
        tick: Period,
        step: TimeDelta,
        mut command_rx: mpsc::Receiver<SchedulerCommand>,
        state: Arc<RwLock<SchedulerState>>,
    ) {
        let tick_duration = tick.as_duration();
        let mut logical = self.start_time.unwrap_or_else(Utc::now);
        let mut deadline = Instant::now();

        tracing::info!(
            tick = %tick,
            tasks = self.tasks.len(),
            start = %logical,
            "Scheduler started"
        );

        'ticks: loop {
            self.run_tick(logical).await;

            deadline += tick_duration;
            logical = match logical.checked_add_signed(step) {
                Some(next) => next,
                None => {
                    tracing::error!(at = %logical, "Logical time overflow, stopping scheduler");
                    break;
                }
            };

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    late = ?now.duration_since(deadline),
                    next = %logical,
                    "Tick overran its deadline, running next tick immediately"
                );
                while let Ok(command) = command_rx.try_recv() {
                    if Self::handle_command(command, &state).await.is_break() {
                        break 'ticks;
                    }
                }
                continue;
            }

            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,

                    Some(command) = command_rx.recv() => {
                        if Self::handle_command(command, &state).await.is_break() {
                            break 'ticks;
                        }
                    }
                }
            }
        }

        *state.write().await = SchedulerState::Stopped;
        tracing::info!("Scheduler stopped");
    }

    async fn handle_command(
        command: SchedulerCommand,
        state: &RwLock<SchedulerState>,
    ) -> ControlFlow<()> {
        match command {
            SchedulerCommand::Shutdown { ack } => {
                *state.write().await = SchedulerState::Stopped;
                tracing::info!("Shutdown requested");
                let _ = ack.send(());
                ControlFlow::Break(())
            }
        }
    }
}

/// Run one task at `now`, or skip it when one of its drives sleeps.
async fn run_task(task: &mut Task, drives: &dyn DriveMonitor, now: DateTime<Utc>) -> TickReport {
    let blocked = task
        .drives_blocked(drives)
        .await
        .map(|d| d.device().to_string());

    let result = match blocked {
        Some(device) => {
            tracing::debug!(task = %task.id(), device = %device, "Drive is asleep, skipping task");
            Ok(task.skip(now, SkipReason::DriveAsleep { device }))
        }
        None => {
            tracing::debug!(task = %task.id(), action = task.action().kind(), at = %now, "Running task");
            task.run(now).await
        }
    };

    match &result {
        Ok(TaskOutcome::Completed) => {
            tracing::info!(task = %task.id(), at = %now, "Task completed");
        }
        Ok(TaskOutcome::Skipped(reason)) => {
            tracing::debug!(task = %task.id(), reason = %reason, "Task skipped");
        }
        Err(e) => {
            tracing::error!(task = %task.id(), error = %e, "Task failed");
        }
    }

    TickReport::new(task.id(), task.action().kind(), now, &result)
}
