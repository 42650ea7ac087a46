//! Configuration error types.
//!
//! This module defines error types for configuration loading and validation.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::period::PeriodError;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a specific file with context.
    #[error("failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Failed to parse YAML from a specific file.
    #[error("YAML parse error in '{path}': {source}")]
    YamlFileError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A task's period string is malformed.
    #[error("task '{task}': {source}")]
    InvalidPeriod {
        task: String,
        #[source]
        source: PeriodError,
    },

    /// A task names an action that does not exist.
    #[error("task '{task}': unknown action '{action}'")]
    UnknownAction { task: String, action: String },

    /// Timezone name not found in the tz database.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Missing required field.
    #[error("missing required field: {0}")]
    MissingField(String),
}

impl ConfigError {
    /// Attach the task name to a field-level error.
    pub fn in_task(self, task: &str) -> Self {
        match self {
            ConfigError::MissingField(field) => {
                ConfigError::MissingField(format!("{}.{}", task, field))
            }
            ConfigError::InvalidConfig(message) => {
                ConfigError::InvalidConfig(format!("task '{}': {}", task, message))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_task_prefixes_field_errors() {
        let err = ConfigError::MissingField("lvm_lv_name".into()).in_task("home");
        assert_eq!(err.to_string(), "missing required field: home.lvm_lv_name");

        let err = ConfigError::InvalidConfig("lvm_snapshot_nb must be at least 1".into()).in_task("home");
        assert_eq!(
            err.to_string(),
            "invalid configuration: task 'home': lvm_snapshot_nb must be at least 1"
        );
    }

    #[test]
    fn test_invalid_period_display() {
        let err = ConfigError::InvalidPeriod {
            task: "home".into(),
            source: PeriodError::Zero("0d".into()),
        };
        assert_eq!(
            err.to_string(),
            "task 'home': invalid period '0d': must be greater than zero"
        );
    }
}
