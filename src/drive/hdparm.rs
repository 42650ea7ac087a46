//! Drive monitor backed by `hdparm -C`.

use async_trait::async_trait;
use std::time::Duration;

use super::DriveMonitor;
use crate::execution::ExternalCommand;

/// Power state reported by `hdparm -C`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerState {
    /// `active/idle` (or plain `idle`/`active`).
    Active,
    /// `standby`: spun down.
    Standby,
    /// `sleeping`: deepest low-power state.
    Sleeping,
    /// Any other state string, e.g. `unknown`.
    Other(String),
}

impl PowerState {
    /// Whether probing or accessing the drive would spin it up.
    pub fn is_asleep(&self) -> bool {
        matches!(self, PowerState::Standby | PowerState::Sleeping)
    }
}

/// Extract the power state from `hdparm -C` output.
///
/// ```text
///
/// /dev/sdb:
///  drive state is:  standby
/// ```
pub fn parse_power_state(output: &str) -> Option<PowerState> {
    let state = output
        .lines()
        .find_map(|line| line.trim().strip_prefix("drive state is:"))?
        .trim();

    let parsed = match state {
        "active/idle" | "active" | "idle" => PowerState::Active,
        "standby" => PowerState::Standby,
        "sleeping" => PowerState::Sleeping,
        other => PowerState::Other(other.to_string()),
    };
    Some(parsed)
}

/// Probes drives with `hdparm -C`, which does not wake a sleeping drive.
#[derive(Debug, Clone)]
pub struct HdparmDriveMonitor {
    program: String,
    timeout: Option<Duration>,
}

impl Default for HdparmDriveMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HdparmDriveMonitor {
    pub fn new() -> Self {
        Self {
            program: "hdparm".to_string(),
            timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Use a different hdparm binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the probe timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Query the current power state of `device`.
    pub async fn power_state(&self, device: &str) -> Option<PowerState> {
        let cmd = ExternalCommand::builder(&self.program)
            .args(["-C", device])
            .maybe_timeout(self.timeout)
            .build();

        match cmd.output().await {
            Ok(output) => {
                let state = parse_power_state(&output.stdout);
                if state.is_none() {
                    tracing::warn!(device = %device, "Unrecognised hdparm output, assuming drive is awake");
                }
                state
            }
            Err(e) => {
                tracing::warn!(device = %device, error = %e, "Drive power probe failed, assuming drive is awake");
                None
            }
        }
    }
}

#[async_trait]
impl DriveMonitor for HdparmDriveMonitor {
    async fn is_asleep(&self, device: &str) -> bool {
        let asleep = self
            .power_state(device)
            .await
            .is_some_and(|state| state.is_asleep());
        tracing::debug!(device = %device, asleep, "Probed drive power state");
        asleep
    }
}
