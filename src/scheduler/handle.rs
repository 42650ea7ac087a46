//! Control surface of a running scheduler loop.
//!
//! The loop only listens for commands while it waits for its next tick, so a
//! shutdown request never interrupts a task halfway through a rotation.

use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};

use super::types::{SchedulerCommand, SchedulerError, SchedulerState};

/// Capacity of the command channel feeding the loop.
pub(crate) const COMMAND_CHANNEL_BUFFER: usize = 8;

/// Cloneable handle returned by [`Scheduler::start`](super::Scheduler::start).
#[derive(Clone)]
pub struct SchedulerHandle {
    pub(crate) command_tx: mpsc::Sender<SchedulerCommand>,
    pub(crate) state: Arc<RwLock<SchedulerState>>,
}

impl SchedulerHandle {
    /// Ask the loop to stop and wait until it has acknowledged.
    ///
    /// Fails with [`SchedulerError::ChannelError`] once the loop has exited.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.command_tx
            .send(SchedulerCommand::Shutdown { ack: ack_tx })
            .await
            .map_err(|_| SchedulerError::ChannelError("scheduler loop has exited".into()))?;
        ack_rx
            .await
            .map_err(|_| SchedulerError::ChannelError("shutdown was not acknowledged".into()))
    }

    pub async fn state(&self) -> SchedulerState {
        *self.state.read().await
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == SchedulerState::Running
    }
}
