//! YAML configuration parsing.
//!
//! A configuration file holds a few global settings and one section per
//! task, keyed by task name:
//!
//! ```yaml
//! timezone: Europe/Paris
//! tasks:
//!   home:
//!     actions: snapshot
//!     period: 1d
//!     drives: [/dev/sdb]
//!     lvm_vg_name: vg0
//!     lvm_lv_name: home
//!     lvm_snapshot_size: 20G
//!     lvm_snapshot_nb: 7
//! ```
//!
//! Keys other than `actions`, `period` and `drives` are action options and
//! are handed to the action as strings.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::builder::ActionKind;
use super::error::ConfigError;
use crate::core::period::Period;

/// Default upper bound of the scheduler tick.
pub const DEFAULT_MAX_TICK: &str = "1d";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    /// Timezone used to compute snapshot dates (default: UTC).
    pub timezone: Option<String>,
    /// Timeout applied to each volume-manager command.
    pub command_timeout_secs: Option<u64>,
    /// Upper bound of the scheduler tick, as a period string.
    pub max_tick: Option<String>,
    /// Task sections, keyed by task name.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskSection>,
}

/// One task definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSection {
    /// Actions to run (currently only `snapshot`).
    pub actions: ActionList,
    /// Period string such as `1d`.
    pub period: String,
    /// Devices that must be awake for the task to run.
    #[serde(default)]
    pub drives: Vec<String>,
    /// Action options (`lvm_*` keys).
    #[serde(flatten)]
    pub options: BTreeMap<String, serde_yaml::Value>,
}

/// Action names, written either as a YAML list or as a single string
/// (possibly comma-separated).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionList {
    Many(Vec<String>),
    One(String),
}

impl ActionList {
    /// Normalised action names, in declaration order.
    pub fn names(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            ActionList::Many(list) => list.iter().map(String::as_str).collect(),
            ActionList::One(s) => s.split(',').collect(),
        };
        raw.into_iter()
            .map(|a| a.trim_matches(|c: char| c.is_whitespace() || "[]{}".contains(c)))
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl TaskSection {
    /// Parse the period of the task named `task`.
    pub fn period(&self, task: &str) -> Result<Period, ConfigError> {
        Period::parse(&self.period).map_err(|source| ConfigError::InvalidPeriod {
            task: task.to_string(),
            source,
        })
    }

    /// Action options with scalar values rendered as strings.
    pub fn string_options(&self, task: &str) -> Result<BTreeMap<String, String>, ConfigError> {
        let mut out = BTreeMap::new();
        for (key, value) in &self.options {
            let rendered = match value {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => String::new(),
                _ => {
                    return Err(ConfigError::InvalidConfig(format!(
                        "task '{}': option '{}' must be a scalar value",
                        task, key
                    )));
                }
            };
            out.insert(key.clone(), rendered);
        }
        Ok(out)
    }
}

impl BackupConfig {
    /// Timezone for snapshot dates.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        match &self.timezone {
            None => Ok(Tz::UTC),
            Some(name) => {
                Tz::from_str(name).map_err(|_| ConfigError::InvalidTimezone(name.clone()))
            }
        }
    }

    /// Per-command timeout, if configured.
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    /// Upper bound of the scheduler tick.
    pub fn max_tick(&self) -> Result<Period, ConfigError> {
        let raw = self.max_tick.as_deref().unwrap_or(DEFAULT_MAX_TICK);
        Period::parse(raw)
            .map_err(|e| ConfigError::InvalidConfig(format!("max_tick: {}", e)))
    }
}

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<BackupConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BackupConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Parse and validate a configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<BackupConfig, ConfigError> {
        let config: BackupConfig = serde_yaml::from_str(yaml)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate settings that do not depend on the action kind.
    fn validate(config: &BackupConfig) -> Result<(), ConfigError> {
        if config.tasks.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "configuration must define at least one task".into(),
            ));
        }

        config.timezone()?;
        config.max_tick()?;

        if config.command_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "command_timeout_secs cannot be zero".into(),
            ));
        }

        for (name, section) in &config.tasks {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidConfig("task name cannot be empty".into()));
            }

            section.period(name)?;
            section.string_options(name)?;

            let actions = section.actions.names();
            if actions.is_empty() {
                return Err(ConfigError::MissingField(format!("{}.actions", name)));
            }

            let mut seen = HashSet::new();
            for action in &actions {
                ActionKind::from_str(action).map_err(|_| ConfigError::UnknownAction {
                    task: name.clone(),
                    action: action.clone(),
                })?;
                if !seen.insert(action.as_str()) {
                    return Err(ConfigError::InvalidConfig(format!(
                        "task '{}' lists action '{}' twice",
                        name, action
                    )));
                }
            }

            if let Some(empty) = section.drives.iter().find(|d| d.trim().is_empty()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "task '{}' has an empty drive path '{}'",
                    name, empty
                )));
            }
        }

        Ok(())
    }
}
