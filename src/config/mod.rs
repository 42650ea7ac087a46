//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for backup tasks and the
//! global daemon settings.

mod builder;
mod error;
mod yaml;

pub use builder::{ActionKind, TaskBuilder, load_tasks};
pub use error::ConfigError;
pub use yaml::{ActionList, BackupConfig, DEFAULT_MAX_TICK, TaskSection, YamlLoader};
