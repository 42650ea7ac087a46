//! Core task model: identifiers, periods and the task/action split.

pub mod period;
pub mod task;
pub mod types;
