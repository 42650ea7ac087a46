//! Task builder from YAML configuration.
//!
//! This module converts [`BackupConfig`] sections into runnable [`Task`]s.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono_tz::Tz;

use crate::core::task::Task;
use crate::drive::Drive;
use crate::volume::snapshot::SNAPSHOT_KEYS;
use crate::volume::{SnapshotAction, SnapshotConfig, VolumeManager};

use super::error::ConfigError;
use super::yaml::{BackupConfig, TaskSection, YamlLoader};

/// Actions a task section can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Snapshot,
}

impl ActionKind {
    /// Option keys the action reads.
    pub fn known_keys(&self) -> &'static [&'static str] {
        match self {
            ActionKind::Snapshot => &SNAPSHOT_KEYS,
        }
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snapshot" => Ok(ActionKind::Snapshot),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// Builder for creating Tasks from a [`BackupConfig`].
pub struct TaskBuilder {
    volumes: Arc<dyn VolumeManager>,
    dry_run: bool,
}

impl TaskBuilder {
    pub fn new(volumes: Arc<dyn VolumeManager>) -> Self {
        Self {
            volumes,
            dry_run: false,
        }
    }

    /// Builder: simulate volume operations in every built task.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Build every task of `config`, in section-name order.
    ///
    /// A section listing several actions yields one task per action, all
    /// sharing the section name.
    pub fn build(&self, config: &BackupConfig) -> Result<Vec<Task>, ConfigError> {
        let timezone = config.timezone()?;
        let mut tasks = Vec::new();
        for (name, section) in &config.tasks {
            tasks.extend(self.build_section(name, section, timezone)?);
        }
        Ok(tasks)
    }

    fn build_section(
        &self,
        name: &str,
        section: &TaskSection,
        timezone: Tz,
    ) -> Result<Vec<Task>, ConfigError> {
        let period = section.period(name)?;
        let options = section.string_options(name)?;
        let drives: Vec<Drive> = section.drives.iter().map(Drive::new).collect();

        let mut tasks = Vec::new();
        for action_name in section.actions.names() {
            let kind = ActionKind::from_str(&action_name).map_err(|action| {
                ConfigError::UnknownAction {
                    task: name.to_string(),
                    action,
                }
            })?;

            let unknown: Vec<&str> = options
                .keys()
                .map(String::as_str)
                .filter(|k| !kind.known_keys().contains(k))
                .collect();
            if !unknown.is_empty() {
                tracing::warn!(task = name, action = %kind, keys = ?unknown, "Ignoring unknown options");
            }

            let task = match kind {
                ActionKind::Snapshot => {
                    let config = SnapshotConfig::from_options(&options, self.dry_run)
                        .map_err(|e| e.in_task(name))?;
                    let action = SnapshotAction::new(config, self.volumes.clone())
                        .with_timezone(timezone);
                    Task::new(name, period, action)
                }
            };
            tasks.push(task.with_drives(drives.iter().cloned()));
        }

        Ok(tasks)
    }
}

/// Load a configuration file and build its tasks.
pub fn load_tasks(
    path: impl AsRef<Path>,
    volumes: Arc<dyn VolumeManager>,
    dry_run: bool,
) -> Result<(BackupConfig, Vec<Task>), ConfigError> {
    let config = YamlLoader::load(path)?;
    let tasks = TaskBuilder::new(volumes).dry_run(dry_run).build(&config)?;
    Ok((config, tasks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryVolumeManager, VolumeOp};
    use crate::volume::LogicalVolume;
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    fn volumes() -> Arc<dyn VolumeManager> {
        Arc::new(InMemoryVolumeManager::new())
    }

    #[test]
    fn test_build_tasks_in_section_order() {
        let yaml = r#"
tasks:
  var:
    actions: snapshot
    period: 6h
    lvm_vg_name: vg0
    lvm_lv_name: var
    lvm_snapshot_size: 5G
    lvm_snapshot_nb: 4
  home:
    actions: snapshot
    period: 1d
    drives: [/dev/sdb]
    lvm_vg_name: vg0
    lvm_lv_name: home
    lvm_snapshot_size: 20G
    lvm_snapshot_nb: 7
"#;
        let config = YamlLoader::parse(yaml).unwrap();
        let tasks = TaskBuilder::new(volumes()).build(&config).unwrap();

        let names: Vec<&str> = tasks.iter().map(|t| t.id().as_str()).collect();
        assert_eq!(names, vec!["home", "var"]);

        assert_eq!(tasks[0].period().as_secs(), 86400);
        assert_eq!(tasks[0].drives(), &[Drive::new("/dev/sdb")]);
        assert_eq!(tasks[0].action().kind(), "snapshot");
        assert_eq!(
            tasks[0].action().description().as_deref(),
            Some("snapshot vg0/home (size 20G, keep 7)")
        );
        assert!(tasks[0].last_run().is_none());

        assert_eq!(tasks[1].period().as_secs(), 21600);
        assert!(tasks[1].drives().is_empty());
    }

    #[test]
    fn test_missing_option_names_the_task() {
        let yaml = r#"
tasks:
  home:
    actions: snapshot
    period: 1d
    lvm_vg_name: vg0
    lvm_snapshot_size: 20G
    lvm_snapshot_nb: 7
"#;
        let config = YamlLoader::parse(yaml).unwrap();
        match TaskBuilder::new(volumes()).build(&config) {
            Err(ConfigError::MissingField(field)) => assert_eq!(field, "home.lvm_lv_name"),
            other => panic!("Expected MissingField, got {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn test_zero_retention_is_rejected() {
        let yaml = r#"
tasks:
  home:
    actions: snapshot
    period: 1d
    lvm_vg_name: vg0
    lvm_lv_name: home
    lvm_snapshot_size: 20G
    lvm_snapshot_nb: 0
"#;
        let config = YamlLoader::parse(yaml).unwrap();
        assert!(matches!(
            TaskBuilder::new(volumes()).build(&config),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_dry_run_is_carried_to_tasks() {
        let yaml = r#"
tasks:
  home:
    actions: snapshot
    period: 1d
    lvm_vg_name: vg0
    lvm_lv_name: home
    lvm_snapshot_size: 20G
    lvm_snapshot_nb: 2
    lvm_extra: ignored
"#;
        let config = YamlLoader::parse(yaml).unwrap();
        let memory = Arc::new(InMemoryVolumeManager::new());
        let mut tasks = TaskBuilder::new(memory.clone())
            .dry_run(true)
            .build(&config)
            .unwrap();
        assert_eq!(tasks.len(), 1);

        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        tasks[0].run(now).await.unwrap();
        assert_eq!(
            memory.operations().last(),
            Some(&VolumeOp::Create {
                name: "home-bt-20240301".to_string(),
                dry_run: true,
            })
        );
        assert!(memory.snapshot_names(&LogicalVolume::new("vg0", "home")).is_empty());
    }

    #[test]
    fn test_action_kind_parsing() {
        assert_eq!("snapshot".parse::<ActionKind>(), Ok(ActionKind::Snapshot));
        assert_eq!("rsync".parse::<ActionKind>(), Err("rsync".to_string()));
        assert_eq!(ActionKind::Snapshot.to_string(), "snapshot");
        assert!(ActionKind::Snapshot.known_keys().contains(&"lvm_snapshot_nb"));
    }

    #[test]
    fn test_load_tasks_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
timezone: Asia/Tokyo
tasks:
  home:
    actions: snapshot
    period: 1w
    lvm_vg_name: vg0
    lvm_lv_name: home
    lvm_snapshot_size: 20G
    lvm_snapshot_nb: 3
"#,
        )
        .unwrap();

        let (config, tasks) = load_tasks(file.path(), volumes(), false).unwrap();
        assert_eq!(config.timezone().unwrap(), chrono_tz::Asia::Tokyo);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].period().as_secs(), 7 * 86400);
    }
}
