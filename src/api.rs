//! Orchestration client.
//!
//! [`Client`] ties together the host store, the driver factory and the
//! [`Context`]. It is the entry point the CLI and integration tests use.

use crate::auth::AuthOptions;
use crate::config::{MachineDirs, PodmachineConfig};
use crate::context::Context;
use crate::driver::none;
use crate::engine::EngineOptions;
use crate::error::{Error, Result};
use crate::host::{validate_host_name, Host, HostOptions, CONFIG_VERSION};
use crate::plugin::DriverFactory;
use crate::state::MachineState;
use crate::store::{Filestore, HostRecord, Store};

/// Drivers whose machines are not waited on or provisioned after create.
const UNPROVISIONED_DRIVERS: &[&str] = &[none::DRIVER_NAME, "ci-test"];

/// Command used to check the engine answers after provisioning.
const ENGINE_CHECK_COMMAND: &str = "podman --version";

/// Host store, driver resolution and lifecycle collaborators.
pub struct Client {
    dirs: MachineDirs,
    store: Box<dyn Store>,
    factory: DriverFactory,
    ctx: Context,
}

impl Client {
    /// Assemble a client from its parts.
    pub fn new(dirs: MachineDirs, store: Box<dyn Store>, factory: DriverFactory, ctx: Context) -> Self {
        Self {
            dirs,
            store,
            factory,
            ctx,
        }
    }

    /// Client backed by the on-disk store described by `config`.
    pub fn from_config(config: &PodmachineConfig) -> Result<Self> {
        let dirs = config.dirs()?;
        let store = Filestore::new(&dirs.machines);
        let factory = DriverFactory::from_config(config)?;
        let ctx = Context::standard().with_wait(config.wait_policy());
        Ok(Self::new(dirs, Box::new(store), factory, ctx))
    }

    /// Storage layout.
    pub fn dirs(&self) -> &MachineDirs {
        &self.dirs
    }

    /// Lifecycle collaborators.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Mutable access to the lifecycle collaborators.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// Driver factory.
    pub fn factory(&self) -> &DriverFactory {
        &self.factory
    }

    /// Build an unsaved host for `driver_name` from a raw driver blob.
    ///
    /// The machine name is read back from the resolved driver.
    pub fn new_host(&self, driver_name: &str, raw: &[u8]) -> Result<Host> {
        let driver = self.factory.resolve(driver_name, raw)?;
        let name = driver.machine_name();

        let auth = AuthOptions::for_machine(&self.dirs.certs, &self.dirs.machine_dir(&name));
        let host_options = HostOptions {
            driver: driver_name.to_string(),
            engine: EngineOptions::default(),
            auth,
            ..HostOptions::default()
        };

        Ok(Host {
            config_version: CONFIG_VERSION,
            name,
            driver_name: driver_name.to_string(),
            driver,
            raw_driver: raw.to_vec(),
            host_options,
        })
    }

    /// Reject `name` if it is empty, malformed or already taken.
    pub fn check_new_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::MissingMachineName);
        }
        if !validate_host_name(name) {
            return Err(Error::InvalidHostName(name.to_string()));
        }
        if self.store.exists(name)? {
            return Err(Error::HostAlreadyExists(name.to_string()));
        }
        Ok(())
    }

    /// Create the machine behind `host`, then provision it.
    ///
    /// The host is saved before the driver creates anything, so a failed
    /// create leaves a record that `rm` can clean up.
    pub fn create(&self, host: &mut Host) -> Result<()> {
        self.check_new_name(&host.name)?;

        tracing::info!(machine = %host.name, "checking certificates");
        self.ctx.bootstrapper.bootstrap(&host.host_options.auth)?;

        tracing::info!(machine = %host.name, "running pre-create checks");
        host.driver
            .pre_create_check()
            .map_err(|e| Error::PreCreateCheck(e.to_string()))?;

        self.save(host)?;

        tracing::info!(machine = %host.name, driver = %host.driver_name, "creating machine");
        host.driver.create()?;
        self.save(host)?;

        if UNPROVISIONED_DRIVERS.contains(&host.driver_name.as_str()) {
            return Ok(());
        }

        tracing::info!(machine = %host.name, "waiting for machine to be running");
        host.wait_for_state(&self.ctx, MachineState::Running)?;

        tracing::info!(machine = %host.name, "detecting operating system");
        let mut provisioner = self.ctx.detect_provisioner(host.driver.as_ref())?;

        tracing::info!(machine = %host.name, provisioner = %provisioner, "provisioning");
        provisioner.provision(&host.host_options.auth, &host.host_options.engine)?;

        tracing::info!(machine = %host.name, "checking the engine");
        host.run_ssh_command(&self.ctx, ENGINE_CHECK_COMMAND)
            .map_err(|e| Error::command_failed(ENGINE_CHECK_COMMAND, e.to_string()))?;

        Ok(())
    }

    /// Load a host and re-resolve its driver.
    pub fn load(&self, name: &str) -> Result<Host> {
        let record = self.store.load(name)?;
        let driver = self.factory.resolve(&record.driver_name, &record.raw_driver)?;

        Ok(Host {
            config_version: record.config_version,
            name: record.name,
            driver_name: record.driver_name,
            driver,
            raw_driver: record.raw_driver,
            host_options: record.host_options,
        })
    }

    /// Persist `host` with a fresh raw blob from its driver.
    pub fn save(&self, host: &mut Host) -> Result<()> {
        let record = HostRecord::from_host(host)?;
        self.store.save(&record)?;
        host.raw_driver = record.raw_driver;
        Ok(())
    }

    /// Check whether a host named `name` is stored.
    pub fn exists(&self, name: &str) -> Result<bool> {
        self.store.exists(name)
    }

    /// Names of every stored host.
    pub fn list(&self) -> Result<Vec<String>> {
        self.store.list()
    }

    /// Load every stored host. Hosts that fail to load are returned with
    /// their error instead of aborting the listing.
    pub fn load_all(&self) -> Result<(Vec<Host>, Vec<(String, Error)>)> {
        let mut hosts = Vec::new();
        let mut failed = Vec::new();
        for name in self.store.list()? {
            match self.load(&name) {
                Ok(host) => hosts.push(host),
                Err(e) => failed.push((name, e)),
            }
        }
        Ok((hosts, failed))
    }

    /// Delete the stored record for `name`. The machine itself is untouched.
    pub fn remove(&self, name: &str) -> Result<()> {
        self.store.remove(name)
    }

    /// Terminate every plugin process. Safe to call more than once.
    pub fn close(&self) {
        self.factory.close();
    }
}
