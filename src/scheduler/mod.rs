//! Scheduler engine for periodic tasks.
//!
//! This module provides the tick-aligned loop that runs due tasks, the
//! handle used to control it, and the tick computation.

mod engine;
mod handle;
pub mod tick;
mod types;

pub use engine::Scheduler;
pub use handle::SchedulerHandle;
pub use types::{SchedulerError, SchedulerState, TickReport};
