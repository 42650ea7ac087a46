//! External process execution.
//!
//! This module provides the process runner used by the volume manager and
//! the drive monitor.

mod command;

pub use command::{CommandError, CommandOutput, ExternalCommand, ExternalCommandBuilder};
