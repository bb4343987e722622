//! Serializing decorator for drivers that cannot run concurrently.
//!
//! Some hypervisor CLIs corrupt their own state when two invocations
//! overlap, even for different machines. Every [`SerialDriver`] of the same
//! family shares one lock, held for the whole of each call.

use super::{CreateFlag, Driver, DriverOptions};
use crate::error::Result;
use crate::state::MachineState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

static FAMILY_LOCKS: OnceLock<Mutex<HashMap<String, Arc<Mutex<()>>>>> = OnceLock::new();

/// Process-wide lock for a driver family.
pub fn family_lock(family: &str) -> Arc<Mutex<()>> {
    let table = FAMILY_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    table
        .lock()
        .entry(family.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Driver wrapper that serializes calls per family.
pub struct SerialDriver {
    inner: Box<dyn Driver>,
    lock: Arc<Mutex<()>>,
}

impl SerialDriver {
    /// Wrap `inner`, sharing the lock of its family.
    pub fn wrap(inner: Box<dyn Driver>) -> Self {
        let family = inner.driver_name();
        tracing::debug!(driver = %family, "serializing driver calls");
        Self {
            lock: family_lock(&family),
            inner,
        }
    }
}

impl Driver for SerialDriver {
    fn driver_name(&self) -> String {
        let _guard = self.lock.lock();
        self.inner.driver_name()
    }

    fn machine_name(&self) -> String {
        let _guard = self.lock.lock();
        self.inner.machine_name()
    }

    fn create_flags(&self) -> Result<Vec<CreateFlag>> {
        let _guard = self.lock.lock();
        self.inner.create_flags()
    }

    fn set_config_from_flags(&mut self, opts: &DriverOptions) -> Result<()> {
        let _guard = self.lock.lock();
        self.inner.set_config_from_flags(opts)
    }

    fn pre_create_check(&mut self) -> Result<()> {
        let _guard = self.lock.lock();
        self.inner.pre_create_check()
    }

    fn create(&mut self) -> Result<()> {
        let _guard = self.lock.lock();
        self.inner.create()
    }

    fn start(&mut self) -> Result<()> {
        let _guard = self.lock.lock();
        self.inner.start()
    }

    fn stop(&mut self) -> Result<()> {
        let _guard = self.lock.lock();
        self.inner.stop()
    }

    fn restart(&mut self) -> Result<()> {
        let _guard = self.lock.lock();
        self.inner.restart()
    }

    fn kill(&mut self) -> Result<()> {
        let _guard = self.lock.lock();
        self.inner.kill()
    }

    fn remove(&mut self) -> Result<()> {
        let _guard = self.lock.lock();
        self.inner.remove()
    }

    fn state(&self) -> Result<MachineState> {
        let _guard = self.lock.lock();
        self.inner.state()
    }

    fn url(&self) -> Result<String> {
        let _guard = self.lock.lock();
        self.inner.url()
    }

    fn ip(&self) -> Result<String> {
        let _guard = self.lock.lock();
        self.inner.ip()
    }

    fn ssh_hostname(&self) -> Result<String> {
        let _guard = self.lock.lock();
        self.inner.ssh_hostname()
    }

    fn ssh_port(&self) -> Result<u16> {
        let _guard = self.lock.lock();
        self.inner.ssh_port()
    }

    fn ssh_username(&self) -> Result<String> {
        let _guard = self.lock.lock();
        self.inner.ssh_username()
    }

    fn ssh_key_path(&self) -> Result<Option<PathBuf>> {
        let _guard = self.lock.lock();
        self.inner.ssh_key_path()
    }

    fn raw_config(&self) -> Result<Vec<u8>> {
        let _guard = self.lock.lock();
        self.inner.raw_config()
    }
}
