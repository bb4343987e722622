//! Driver for an engine that already exists somewhere.

use super::{BaseDriver, CreateFlag, Driver, DriverOptions};
use crate::error::{Error, Result};
use crate::state::MachineState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Family name of the builtin `none` driver.
pub const DRIVER_NAME: &str = "none";

/// Points at a running engine by URL. Nothing to start or stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoneDriver {
    /// Shared settings.
    #[serde(flatten)]
    pub base: BaseDriver,
    /// Engine URL.
    #[serde(default)]
    pub url: String,
}

impl NoneDriver {
    /// Restore from a raw blob.
    pub fn from_raw(raw: &[u8]) -> Result<Box<dyn Driver>> {
        let driver: NoneDriver = serde_json::from_slice(raw)?;
        Ok(Box::new(driver))
    }

    fn unsupported(&self, operation: &str) -> Error {
        Error::not_supported(DRIVER_NAME, operation)
    }
}

impl Driver for NoneDriver {
    fn driver_name(&self) -> String {
        DRIVER_NAME.to_string()
    }

    fn machine_name(&self) -> String {
        self.base.machine_name.clone()
    }

    fn create_flags(&self) -> Result<Vec<CreateFlag>> {
        Ok(vec![CreateFlag::String {
            name: "url".into(),
            usage: "URL of host when no driver is selected".into(),
            env_var: Some("NONE_URL".into()),
            value: String::new(),
        }])
    }

    fn set_config_from_flags(&mut self, opts: &DriverOptions) -> Result<()> {
        let url = opts.string("url");
        if url.is_empty() {
            return Err(Error::Config("--url option is required for the none driver".into()));
        }
        self.url = url;
        Ok(())
    }

    fn pre_create_check(&mut self) -> Result<()> {
        Ok(())
    }

    fn create(&mut self) -> Result<()> {
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        Err(self.unsupported("start"))
    }

    fn stop(&mut self) -> Result<()> {
        Err(self.unsupported("stop"))
    }

    fn restart(&mut self) -> Result<()> {
        Err(self.unsupported("restart"))
    }

    fn kill(&mut self) -> Result<()> {
        Err(self.unsupported("kill"))
    }

    fn remove(&mut self) -> Result<()> {
        Ok(())
    }

    fn state(&self) -> Result<MachineState> {
        Ok(MachineState::Running)
    }

    fn url(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    fn ip(&self) -> Result<String> {
        let rest = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        let host = rest.split('/').next().unwrap_or_default();
        let host = host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host);
        if host.is_empty() {
            return Err(Error::driver(DRIVER_NAME, format!("no host in url {:?}", self.url)));
        }
        Ok(host.to_string())
    }

    fn ssh_hostname(&self) -> Result<String> {
        Err(self.unsupported("ssh"))
    }

    fn ssh_port(&self) -> Result<u16> {
        Err(self.unsupported("ssh"))
    }

    fn ssh_username(&self) -> Result<String> {
        Err(self.unsupported("ssh"))
    }

    fn ssh_key_path(&self) -> Result<Option<PathBuf>> {
        Err(self.unsupported("ssh"))
    }

    fn raw_config(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
