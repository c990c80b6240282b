use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine state as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineState {
    None,
    Starting,
    Running,
    Stopped,
    Paused,
    Error,
}

impl MachineState {
    /// Map a CloudStack VM state onto a machine state.
    ///
    /// `Stopping` is still reported as running. Unrecognised states map to
    /// [`MachineState::None`].
    pub fn from_vm_state(state: &str) -> Self {
        match state {
            "Starting" => Self::Starting,
            "Running" | "Stopping" => Self::Running,
            "Stopped" | "Destroyed" | "Expunging" | "Shutdowned" => Self::Stopped,
            "Migrating" => Self::Paused,
            "Error" | "Unknown" => Self::Error,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Paused => "Paused",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
