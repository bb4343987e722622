//! Error types for podmachine.

use crate::state::MachineState;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using podmachine's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in podmachine operations.
#[derive(Error, Debug)]
pub enum Error {
    // Host configuration errors
    /// Host name does not match the allowed grammar.
    #[error("invalid hostname specified. Allowed hostname chars are: 0-9a-zA-Z . -: {0}")]
    InvalidHostName(String),

    /// Create was called without a machine name.
    #[error("missing machine name")]
    MissingMachineName,

    /// Host is not in the store.
    #[error("host does not exist: {0:?}")]
    HostDoesNotExist(String),

    /// Host is already in the store.
    #[error("host already exists: {0:?}")]
    HostAlreadyExists(String),

    /// No machine name was given and no `default` machine exists.
    #[error("no machine name(s) specified and no \"default\" machine exists")]
    NoDefaultHost,

    // Lifecycle errors
    /// Host already reports the state a verb would move it to.
    #[error("machine {name:?} is already {state}")]
    AlreadyInState {
        /// Host name.
        name: String,
        /// Observed state.
        state: MachineState,
    },

    /// Driver pre-create validation failed.
    #[error("error with pre-create check: {0}")]
    PreCreateCheck(String),

    /// A bounded wait elapsed.
    #[error("timed out after {after:?}: {what}")]
    Timeout {
        /// What was being waited for.
        what: String,
        /// Total time waited.
        after: Duration,
    },

    // Driver plugin errors
    /// No plugin binary exists for the driver.
    #[error("driver {driver:?} not found. Do you have the plugin binary \"podmachine-driver-{driver}\" accessible in your PATH?")]
    PluginNotFound {
        /// Driver family name.
        driver: String,
    },

    /// Plugin started but refused the handshake or its configuration.
    #[error("driver {driver:?} handshake failed: {message}")]
    PluginHandshake {
        /// Driver family name.
        driver: String,
        /// Failure detail.
        message: String,
    },

    /// Connection to a running plugin broke.
    #[error("driver {driver:?} plugin transport error: {message}")]
    PluginTransport {
        /// Driver family name.
        driver: String,
        /// Failure detail.
        message: String,
    },

    /// Driver reported a failure.
    #[error("driver {driver:?}: {message}")]
    Driver {
        /// Driver family name.
        driver: String,
        /// Failure detail.
        message: String,
    },

    /// Driver does not implement an operation.
    #[error("driver {driver:?} does not support {operation}")]
    NotSupported {
        /// Driver family name.
        driver: String,
        /// Operation name.
        operation: String,
    },

    // Provisioning errors
    /// Remote command channel never became reachable.
    #[error("command channel unreachable: {0}")]
    CommandChannelUnreachable(String),

    /// No registered provisioner matched the guest.
    #[error("no compatible provisioner found for {0}")]
    DetectionFailed(String),

    /// `/etc/os-release` content could not be parsed.
    #[error("error parsing os-release: {0}")]
    OsReleaseParse(String),

    /// Command failed.
    #[error("command failed: {command}: {message}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// Error message.
        message: String,
    },

    // Collaborator errors
    /// Certificate material is missing or invalid.
    #[error("certificate error: {0}")]
    Certificates(String),

    /// Host store error.
    #[error("store error: {0}")]
    Store(String),

    // Configuration errors
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to load configuration.
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Failed to save configuration.
    #[error("failed to save config: {0}")]
    ConfigSave(String),

    /// Several hosts failed in a fan-out operation.
    #[error("{}", .0.join("\n"))]
    Batch(Vec<String>),

    /// JSON error wrapper.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    /// IO error wrapper.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a driver error.
    pub fn driver(driver: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Driver {
            driver: driver.into(),
            message: message.into(),
        }
    }

    /// Create a not-supported error.
    pub fn not_supported(driver: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::NotSupported {
            driver: driver.into(),
            operation: operation.into(),
        }
    }

    /// Create a plugin transport error.
    pub fn transport(driver: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PluginTransport {
            driver: driver.into(),
            message: message.into(),
        }
    }

    /// Create a plugin handshake error.
    pub fn handshake(driver: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PluginHandshake {
            driver: driver.into(),
            message: message.into(),
        }
    }

    /// Create a command failed error.
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            after,
        }
    }

    /// Create a store error with a message.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Check if this is the degraded "plugin not found" error.
    pub fn is_plugin_not_found(&self) -> bool {
        matches!(self, Self::PluginNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_in_state_includes_name_and_state() {
        let err = Error::AlreadyInState {
            name: "dev".into(),
            state: MachineState::Running,
        };
        assert_eq!(err.to_string(), "machine \"dev\" is already running");
    }

    #[test]
    fn test_plugin_not_found_includes_driver() {
        let err = Error::PluginNotFound {
            driver: "virtualbox".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("\"virtualbox\""));
        assert!(msg.contains("podmachine-driver-virtualbox"));
        assert!(err.is_plugin_not_found());
    }

    #[test]
    fn test_batch_joins_with_newlines() {
        let err = Error::Batch(vec!["a failed".into(), "b failed".into()]);
        assert_eq!(err.to_string(), "a failed\nb failed");
    }

    #[test]
    fn test_command_failed_includes_command() {
        let err = Error::command_failed("cat /etc/os-release", "exit status 1");
        let msg = err.to_string();
        assert!(msg.contains("cat /etc/os-release"));
        assert!(msg.contains("exit status 1"));
    }

    #[test]
    fn test_timeout_formats_duration() {
        let err = Error::timeout("machine dev to be running", Duration::from_secs(180));
        let msg = err.to_string();
        assert!(msg.contains("180s"));
        assert!(msg.contains("machine dev to be running"));
    }
}
