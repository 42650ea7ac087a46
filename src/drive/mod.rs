//! Drive power-state probing.
//!
//! Tasks can depend on physical drives; a task whose drive is spun down is
//! skipped instead of waking the drive up.

mod hdparm;

use async_trait::async_trait;
use std::fmt;

pub use hdparm::{HdparmDriveMonitor, PowerState, parse_power_state};

/// A physical device a task depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Drive {
    device: String,
}

impl Drive {
    /// Create a drive reference from a device path such as `/dev/sdb`.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    /// Get the device path.
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl fmt::Display for Drive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.device)
    }
}

/// Reports whether a drive is in a low-power state.
///
/// Implementations must not fail: a drive whose state cannot be determined
/// is reported awake.
#[async_trait]
pub trait DriveMonitor: Send + Sync {
    /// Whether `device` is currently asleep (standby or sleeping).
    async fn is_asleep(&self, device: &str) -> bool;
}
