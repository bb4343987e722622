//! Machine state vocabulary.
//!
//! Only drivers report state. Nothing in podmachine keeps a shadow copy
//! beyond the value it just observed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// State of a machine as reported by its driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    /// Unknown or not yet created.
    #[default]
    None,
    /// Booting.
    Starting,
    /// Up.
    Running,
    /// Suspended in memory.
    Paused,
    /// Suspended to disk.
    Saved,
    /// Powered off.
    Stopped,
    /// Shutting down.
    Stopping,
    /// Driver reports a fault.
    Error,
    /// Driver gave up querying.
    Timeout,
}

impl MachineState {
    /// All states, in declaration order.
    pub const ALL: [MachineState; 9] = [
        MachineState::None,
        MachineState::Starting,
        MachineState::Running,
        MachineState::Paused,
        MachineState::Saved,
        MachineState::Stopped,
        MachineState::Stopping,
        MachineState::Error,
        MachineState::Timeout,
    ];

    /// Lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::None => "none",
            MachineState::Starting => "starting",
            MachineState::Running => "running",
            MachineState::Paused => "paused",
            MachineState::Saved => "saved",
            MachineState::Stopped => "stopped",
            MachineState::Stopping => "stopping",
            MachineState::Error => "error",
            MachineState::Timeout => "timeout",
        }
    }

    /// Check if the machine is running.
    pub fn is_running(&self) -> bool {
        *self == MachineState::Running
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MachineState::ALL
            .iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown machine state: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Running".parse::<MachineState>().unwrap(), MachineState::Running);
        assert_eq!("stopped".parse::<MachineState>().unwrap(), MachineState::Stopped);
        assert!("rebooting".parse::<MachineState>().is_err());
    }

    #[test]
    fn test_display_matches_serde() {
        for state in MachineState::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state));
        }
    }
}
