//! Stand-in driver for a missing plugin.

use super::{BaseDriver, CreateFlag, Driver, DriverOptions};
use crate::error::{Error, Result};
use crate::state::MachineState;
use std::path::PathBuf;

/// Driver returned when no plugin binary exists for a family.
///
/// Every capability fails with [`Error::PluginNotFound`] naming the family,
/// so listing and status commands can still show the host. The raw blob is
/// kept untouched so saving the host does not lose it.
#[derive(Debug, Clone)]
pub struct ErrorDriver {
    name: String,
    machine_name: String,
    raw: Vec<u8>,
}

impl ErrorDriver {
    /// Create a stand-in for `name`.
    pub fn new(name: impl Into<String>, raw: &[u8]) -> Self {
        Self {
            name: name.into(),
            machine_name: BaseDriver::machine_name_from_raw(raw).unwrap_or_default(),
            raw: raw.to_vec(),
        }
    }

    fn missing(&self) -> Error {
        Error::PluginNotFound {
            driver: self.name.clone(),
        }
    }
}

impl Driver for ErrorDriver {
    fn driver_name(&self) -> String {
        self.name.clone()
    }

    fn machine_name(&self) -> String {
        self.machine_name.clone()
    }

    fn create_flags(&self) -> Result<Vec<CreateFlag>> {
        Err(self.missing())
    }

    fn set_config_from_flags(&mut self, _opts: &DriverOptions) -> Result<()> {
        Err(self.missing())
    }

    fn pre_create_check(&mut self) -> Result<()> {
        Err(self.missing())
    }

    fn create(&mut self) -> Result<()> {
        Err(self.missing())
    }

    fn start(&mut self) -> Result<()> {
        Err(self.missing())
    }

    fn stop(&mut self) -> Result<()> {
        Err(self.missing())
    }

    fn restart(&mut self) -> Result<()> {
        Err(self.missing())
    }

    fn kill(&mut self) -> Result<()> {
        Err(self.missing())
    }

    fn remove(&mut self) -> Result<()> {
        Err(self.missing())
    }

    fn state(&self) -> Result<MachineState> {
        Err(self.missing())
    }

    fn url(&self) -> Result<String> {
        Err(self.missing())
    }

    fn ip(&self) -> Result<String> {
        Err(self.missing())
    }

    fn ssh_hostname(&self) -> Result<String> {
        Err(self.missing())
    }

    fn ssh_port(&self) -> Result<u16> {
        Err(self.missing())
    }

    fn ssh_username(&self) -> Result<String> {
        Err(self.missing())
    }

    fn ssh_key_path(&self) -> Result<Option<PathBuf>> {
        Err(self.missing())
    }

    fn raw_config(&self) -> Result<Vec<u8>> {
        Ok(self.raw.clone())
    }
}
