//! Driver capability interface.
//!
//! A [`Driver`] controls exactly one machine. Concrete drivers live either
//! in this process ([`none`], [`fake`]) or behind a plugin process
//! ([`crate::plugin::RpcDriver`]). [`errdriver::ErrorDriver`] stands in when a
//! plugin is missing and [`serial::SerialDriver`] serializes calls for
//! families that cannot run concurrently.

pub mod errdriver;
pub mod fake;
pub mod none;
pub mod options;
pub mod serial;

pub use errdriver::ErrorDriver;
pub use options::DriverOptions;
pub use podmachine_protocol::CreateFlag;
pub use serial::SerialDriver;

use crate::error::Result;
use crate::state::MachineState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default SSH user for drivers that do not override it.
pub const DEFAULT_SSH_USER: &str = "root";

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default engine port.
pub const DEFAULT_ENGINE_PORT: u16 = 2376;

/// Capabilities every machine backend provides.
///
/// Queries take `&self`; lifecycle verbs take `&mut self`. Drivers report
/// unsupported operations with [`crate::Error::NotSupported`].
pub trait Driver: Send + Sync {
    /// Driver family name, e.g. `virtualbox`.
    fn driver_name(&self) -> String;

    /// Name of the machine this driver controls.
    fn machine_name(&self) -> String;

    /// Flags accepted at creation time.
    fn create_flags(&self) -> Result<Vec<CreateFlag>>;

    /// Apply flag values gathered from the command line and environment.
    fn set_config_from_flags(&mut self, opts: &DriverOptions) -> Result<()>;

    /// Validate that `create` can succeed, without side effects.
    fn pre_create_check(&mut self) -> Result<()>;

    /// Create the machine.
    fn create(&mut self) -> Result<()>;

    /// Start the machine.
    fn start(&mut self) -> Result<()>;

    /// Gracefully stop the machine.
    fn stop(&mut self) -> Result<()>;

    /// Restart the machine.
    fn restart(&mut self) -> Result<()>;

    /// Forcefully stop the machine.
    fn kill(&mut self) -> Result<()>;

    /// Destroy the machine and its resources.
    fn remove(&mut self) -> Result<()>;

    /// Current state.
    fn state(&self) -> Result<MachineState>;

    /// Engine URL, e.g. `tcp://192.168.99.100:2376`.
    fn url(&self) -> Result<String>;

    /// Machine IP address.
    fn ip(&self) -> Result<String>;

    /// Host name or address for SSH.
    fn ssh_hostname(&self) -> Result<String>;

    /// SSH port.
    fn ssh_port(&self) -> Result<u16>;

    /// SSH user.
    fn ssh_username(&self) -> Result<String>;

    /// SSH private key, if key authentication is used.
    fn ssh_key_path(&self) -> Result<Option<PathBuf>>;

    /// Serialized driver state, restored later through the factory.
    fn raw_config(&self) -> Result<Vec<u8>>;
}

/// Check whether the driver currently reports `state`.
pub fn machine_in_state(driver: &dyn Driver, state: MachineState) -> Result<bool> {
    Ok(driver.state()? == state)
}

/// Settings shared by most drivers.
///
/// This is also the raw blob written for a freshly created host before a
/// driver has filled in its own fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseDriver {
    /// Machine name.
    pub machine_name: String,
    /// Base storage directory.
    #[serde(default)]
    pub store_path: PathBuf,
    /// Machine IP address, once known.
    #[serde(default)]
    pub ip_address: String,
    /// SSH user.
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    /// SSH port.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    /// SSH private key.
    #[serde(default)]
    pub ssh_key_path: Option<PathBuf>,
}

fn default_ssh_user() -> String {
    DEFAULT_SSH_USER.to_string()
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl BaseDriver {
    /// Base settings for a new machine.
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            machine_name: machine_name.into(),
            store_path: store_path.into(),
            ip_address: String::new(),
            ssh_user: default_ssh_user(),
            ssh_port: DEFAULT_SSH_PORT,
            ssh_key_path: None,
        }
    }

    /// Per-machine directory under the store.
    pub fn machine_dir(&self) -> PathBuf {
        self.store_path.join("machines").join(&self.machine_name)
    }

    /// Serialize to the raw blob format.
    pub fn to_raw(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Machine name from a raw blob, if it carries one.
    pub fn machine_name_from_raw(raw: &[u8]) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(raw).ok()?;
        value
            .get("machine_name")
            .and_then(|v| v.as_str())
            .map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_driver_raw_defaults() {
        let base: BaseDriver = serde_json::from_slice(br#"{"machine_name":"dev"}"#).unwrap();
        assert_eq!(base.ssh_user, "root");
        assert_eq!(base.ssh_port, 22);
        assert!(base.ssh_key_path.is_none());
    }

    #[test]
    fn test_machine_name_from_raw() {
        let raw = BaseDriver::new("dev", "/store").to_raw().unwrap();
        assert_eq!(BaseDriver::machine_name_from_raw(&raw).as_deref(), Some("dev"));
        assert_eq!(BaseDriver::machine_name_from_raw(b"not json"), None);
    }

    #[test]
    fn test_machine_dir() {
        let base = BaseDriver::new("dev", "/store");
        assert_eq!(base.machine_dir(), PathBuf::from("/store/machines/dev"));
    }
}
