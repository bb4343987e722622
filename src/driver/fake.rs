//! In-process driver with scripted behaviour, for tests.

use super::{BaseDriver, CreateFlag, Driver, DriverOptions, DEFAULT_ENGINE_PORT};
use crate::error::{Error, Result};
use crate::state::MachineState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Family name the fake driver registers under.
pub const DRIVER_NAME: &str = "fake";

/// Driver that flips its own state field and records every call.
///
/// Failure toggles make a single operation return a driver error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FakeDriver {
    /// Shared settings.
    #[serde(flatten)]
    pub base: BaseDriver,
    /// Reported state.
    #[serde(default)]
    pub state: MachineState,
    /// Fail `pre_create_check` with this message.
    #[serde(default)]
    pub fail_pre_create: Option<String>,
    /// Fail `start` with this message.
    #[serde(default)]
    pub fail_start: Option<String>,
    /// Fail `remove` with this message.
    #[serde(default)]
    pub fail_remove: Option<String>,
    /// Number of state queries that fail right after `start`.
    #[serde(default)]
    pub boot_state_errors: u32,
    #[serde(skip)]
    pending_state_errors: Arc<AtomicU32>,
    #[serde(skip)]
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeDriver {
    /// A machine that has not been created yet.
    pub fn new(machine_name: impl Into<String>) -> Self {
        let mut base = BaseDriver::new(machine_name, PathBuf::new());
        base.ip_address = "127.0.0.1".to_string();
        Self {
            base,
            state: MachineState::None,
            fail_pre_create: None,
            fail_start: None,
            fail_remove: None,
            boot_state_errors: 0,
            pending_state_errors: Arc::new(AtomicU32::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A machine that is already running.
    pub fn running(machine_name: impl Into<String>) -> Self {
        let mut driver = Self::new(machine_name);
        driver.state = MachineState::Running;
        driver
    }

    /// Restore from a raw blob.
    pub fn from_raw(raw: &[u8]) -> Result<Box<dyn Driver>> {
        let driver: FakeDriver = serde_json::from_slice(raw)?;
        Ok(Box::new(driver))
    }

    /// Handle on the call log, shared with clones.
    pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().push(call.to_string());
    }

    fn check(&self, failure: &Option<String>) -> Result<()> {
        match failure {
            Some(message) => Err(Error::driver(DRIVER_NAME, message.clone())),
            None => Ok(()),
        }
    }
}

impl Driver for FakeDriver {
    fn driver_name(&self) -> String {
        DRIVER_NAME.to_string()
    }

    fn machine_name(&self) -> String {
        self.base.machine_name.clone()
    }

    fn create_flags(&self) -> Result<Vec<CreateFlag>> {
        Ok(vec![CreateFlag::String {
            name: "fake-ip".into(),
            usage: "Address the fake machine reports".into(),
            env_var: None,
            value: "127.0.0.1".into(),
        }])
    }

    fn set_config_from_flags(&mut self, opts: &DriverOptions) -> Result<()> {
        self.record("set_config_from_flags");
        let ip = opts.string("fake-ip");
        if !ip.is_empty() {
            self.base.ip_address = ip;
        }
        Ok(())
    }

    fn pre_create_check(&mut self) -> Result<()> {
        self.record("pre_create_check");
        self.check(&self.fail_pre_create)
    }

    fn create(&mut self) -> Result<()> {
        self.record("create");
        self.state = MachineState::Running;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.record("start");
        self.check(&self.fail_start)?;
        self.pending_state_errors
            .store(self.boot_state_errors, Ordering::SeqCst);
        self.state = MachineState::Running;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.record("stop");
        self.state = MachineState::Stopped;
        Ok(())
    }

    fn restart(&mut self) -> Result<()> {
        self.record("restart");
        self.state = MachineState::Running;
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        self.record("kill");
        self.state = MachineState::Stopped;
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        self.record("remove");
        self.check(&self.fail_remove)?;
        self.state = MachineState::None;
        Ok(())
    }

    fn state(&self) -> Result<MachineState> {
        let pending = self.pending_state_errors.load(Ordering::SeqCst);
        if pending > 0 {
            self.pending_state_errors.store(pending - 1, Ordering::SeqCst);
            return Err(Error::driver(DRIVER_NAME, "machine is booting, state unavailable"));
        }
        Ok(self.state)
    }

    fn url(&self) -> Result<String> {
        Ok(format!("tcp://{}:{}", self.base.ip_address, DEFAULT_ENGINE_PORT))
    }

    fn ip(&self) -> Result<String> {
        Ok(self.base.ip_address.clone())
    }

    fn ssh_hostname(&self) -> Result<String> {
        self.ip()
    }

    fn ssh_port(&self) -> Result<u16> {
        Ok(self.base.ssh_port)
    }

    fn ssh_username(&self) -> Result<String> {
        Ok(self.base.ssh_user.clone())
    }

    fn ssh_key_path(&self) -> Result<Option<PathBuf>> {
        Ok(self.base.ssh_key_path.clone())
    }

    fn raw_config(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
