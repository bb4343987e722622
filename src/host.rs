//! Host entity and its lifecycle verbs.
//!
//! The driver is the only source of truth for machine state. Every
//! state-changing verb checks the current state, invokes the driver, then
//! polls until the target state is reported or the wait policy runs out.

use crate::auth::AuthOptions;
use crate::context::Context;
use crate::driver::{machine_in_state, Driver};
use crate::engine::EngineOptions;
use crate::error::{Error, Result};
use crate::provision::{self, PackageAction, ServiceAction, ENGINE_PACKAGE, ENGINE_SERVICE};
use crate::state::MachineState;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Version of the persisted host record layout.
pub const CONFIG_VERSION: u32 = 3;

/// Command printing the engine version on the guest.
const ENGINE_VERSION_COMMAND: &str = "podman version --format '{{ .Version }}'";

static HOST_NAME_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// Check `name` against the host name grammar.
pub fn validate_host_name(name: &str) -> bool {
    HOST_NAME_RE
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9\-\.]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// Settings chosen at creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostOptions {
    /// Driver family name.
    pub driver: String,
    /// Memory hint in MiB.
    pub memory_mb: u64,
    /// Disk hint in MiB.
    pub disk_mb: u64,
    /// Engine daemon options.
    pub engine: EngineOptions,
    /// Certificate locations.
    pub auth: AuthOptions,
}

/// A managed machine.
pub struct Host {
    /// Persisted record layout version.
    pub config_version: u32,
    /// Unique machine name.
    pub name: String,
    /// Driver family, used to re-resolve `driver` on load.
    pub driver_name: String,
    /// Backend controlling the machine.
    pub driver: Box<dyn Driver>,
    /// Serialized driver state as last loaded or saved.
    pub raw_driver: Vec<u8>,
    /// Creation options.
    pub host_options: HostOptions,
}

/// Driver primitive invoked by a state-changing verb.
type DriverAction = fn(&mut dyn Driver) -> Result<()>;

impl Host {
    /// Check whether the driver reports `state`.
    pub fn in_state(&self, state: MachineState) -> Result<bool> {
        machine_in_state(self.driver.as_ref(), state)
    }

    /// Poll the driver until it reports `state`.
    ///
    /// A failed state query counts as not yet in `state`.
    pub fn wait_for_state(&self, ctx: &Context, state: MachineState) -> Result<()> {
        let what = format!("machine {:?} to be {}", self.name, state);
        ctx.wait.wait_for(&what, || match self.in_state(state) {
            Ok(reached) => Ok(reached),
            Err(e) => {
                tracing::debug!(machine = %self.name, error = %e, "state query failed, retrying");
                Ok(false)
            }
        })
    }

    fn run_action_for_state(
        &mut self,
        ctx: &Context,
        verb: &str,
        action: DriverAction,
        desired: MachineState,
    ) -> Result<()> {
        if self.in_state(desired)? {
            return Err(Error::AlreadyInState {
                name: self.name.clone(),
                state: desired,
            });
        }

        tracing::info!(machine = %self.name, verb, "running driver action");
        action(self.driver.as_mut())?;

        self.wait_for_state(ctx, desired)
    }

    /// Start the machine and wait for its engine.
    pub fn start(&mut self, ctx: &Context) -> Result<()> {
        tracing::info!(machine = %self.name, "starting machine");
        self.run_action_for_state(ctx, "start", |d| d.start(), MachineState::Running)?;
        tracing::info!(machine = %self.name, "machine started, waiting for the engine");
        self.wait_for_engine(ctx)
    }

    /// Gracefully stop the machine.
    pub fn stop(&mut self, ctx: &Context) -> Result<()> {
        tracing::info!(machine = %self.name, "stopping machine");
        self.run_action_for_state(ctx, "stop", |d| d.stop(), MachineState::Stopped)?;
        tracing::info!(machine = %self.name, "machine stopped");
        Ok(())
    }

    /// Forcefully stop the machine.
    pub fn kill(&mut self, ctx: &Context) -> Result<()> {
        tracing::info!(machine = %self.name, "killing machine");
        self.run_action_for_state(ctx, "kill", |d| d.kill(), MachineState::Stopped)?;
        tracing::info!(machine = %self.name, "machine killed");
        Ok(())
    }

    /// Restart the machine.
    ///
    /// A stopped machine goes through the full start sequence. A running
    /// machine is restarted by the driver directly. Either way the verb
    /// returns once the engine is listening.
    pub fn restart(&mut self, ctx: &Context) -> Result<()> {
        tracing::info!(machine = %self.name, "restarting machine");

        if self.in_state(MachineState::Stopped)? {
            return self.start(ctx);
        }

        if self.in_state(MachineState::Running)? {
            self.driver.restart()?;
            self.wait_for_state(ctx, MachineState::Running)?;
        }

        self.wait_for_engine(ctx)
    }

    /// Start the machine if needed, then upgrade the engine package.
    pub fn upgrade(&mut self, ctx: &Context) -> Result<()> {
        if !self.in_state(MachineState::Running)? {
            self.start(ctx)?;
        }

        let provisioner = ctx.detect_provisioner(self.driver.as_ref())?;

        tracing::info!(machine = %self.name, "upgrading the engine");
        provisioner.package(ENGINE_PACKAGE, PackageAction::Upgrade)?;

        tracing::info!(machine = %self.name, "restarting the engine");
        provisioner.service(ENGINE_SERVICE, ServiceAction::Restart)
    }

    /// Detect the guest OS and provision it.
    pub fn provision(&mut self, ctx: &Context) -> Result<()> {
        let mut provisioner = ctx.detect_provisioner(self.driver.as_ref())?;
        provisioner.provision(&self.host_options.auth, &self.host_options.engine)
    }

    /// Re-provision to redistribute certificates.
    pub fn configure_auth(&mut self, ctx: &Context) -> Result<()> {
        tracing::info!(machine = %self.name, "configuring certificates");
        self.provision(ctx)
    }

    /// Re-check certificate material, then redistribute it.
    pub fn configure_all_auth(&mut self, ctx: &Context) -> Result<()> {
        tracing::info!(machine = %self.name, "regenerating certificates");
        ctx.bootstrapper.bootstrap(&self.host_options.auth)?;
        self.configure_auth(ctx)
    }

    /// Block until the engine socket is listening on the guest.
    pub fn wait_for_engine(&self, ctx: &Context) -> Result<()> {
        let provisioner = ctx.detect_provisioner(self.driver.as_ref())?;
        provision::wait_for_engine(provisioner.as_ref(), &ctx.wait)
    }

    /// Destroy the machine through its driver.
    pub fn remove(&mut self) -> Result<()> {
        tracing::info!(machine = %self.name, "removing machine");
        self.driver.remove()
    }

    /// Engine URL.
    pub fn url(&self) -> Result<String> {
        self.driver.url()
    }

    /// Machine IP address.
    pub fn ip(&self) -> Result<String> {
        self.driver.ip()
    }

    /// Current state as reported by the driver.
    pub fn state(&self) -> Result<MachineState> {
        self.driver.state()
    }

    /// Run `command` on the machine.
    pub fn run_ssh_command(&self, ctx: &Context, command: &str) -> Result<String> {
        let channel = ctx.channels.connect(self.driver.as_ref())?;
        channel.output(command)
    }

    /// Engine version running on the machine.
    pub fn engine_version(&self, ctx: &Context) -> Result<String> {
        let output = self.run_ssh_command(ctx, ENGINE_VERSION_COMMAND)?;
        Ok(output.trim().to_string())
    }

    /// Refresh `raw_driver` from the driver.
    pub fn update_raw_driver(&mut self) -> Result<()> {
        self.raw_driver = self.driver.raw_config()?;
        Ok(())
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("name", &self.name)
            .field("driver_name", &self.driver_name)
            .field("config_version", &self.config_version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeDriver;
    use crate::provision::fake::NetstatProvisioner;
    use crate::provision::FixedDetector;
    use crate::ssh::{FixedChannelFactory, ScriptedChannel};
    use crate::wait::WaitPolicy;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_context() -> Context {
        let mut ctx = Context::standard().with_wait(WaitPolicy::new(Duration::from_millis(1), 3));
        ctx.detector = Box::new(FixedDetector::new(NetstatProvisioner::factory));
        ctx
    }

    fn host(driver: FakeDriver) -> Host {
        Host {
            config_version: CONFIG_VERSION,
            name: driver.machine_name(),
            driver_name: driver.driver_name(),
            driver: Box::new(driver),
            raw_driver: Vec::new(),
            host_options: HostOptions::default(),
        }
    }

    #[test]
    fn test_validate_host_name() {
        assert!(validate_host_name("dev"));
        assert!(validate_host_name("dev-1.local"));
        assert!(validate_host_name("0"));
        assert!(!validate_host_name(""));
        assert!(!validate_host_name("-dev"));
        assert!(!validate_host_name(".dev"));
        assert!(!validate_host_name("dev_1"));
        assert!(!validate_host_name("dev box"));
    }

    #[test]
    fn test_start_when_running_is_rejected_without_driver_call() {
        let fake = FakeDriver::running("dev");
        let log = fake.call_log();
        let mut h = host(fake);

        let err = h.start(&test_context()).unwrap_err();
        match err {
            Error::AlreadyInState { name, state } => {
                assert_eq!(name, "dev");
                assert_eq!(state, MachineState::Running);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_stop_then_start_round_trips() {
        let ctx = test_context();
        let mut h = host(FakeDriver::running("dev"));

        h.stop(&ctx).unwrap();
        assert_eq!(h.state().unwrap(), MachineState::Stopped);

        h.start(&ctx).unwrap();
        assert_eq!(h.state().unwrap(), MachineState::Running);
    }

    #[test]
    fn test_stop_when_stopped_is_rejected() {
        let mut fake = FakeDriver::running("dev");
        fake.state = MachineState::Stopped;
        let mut h = host(fake);

        let err = h.stop(&test_context()).unwrap_err();
        assert!(err.to_string().contains("already stopped"));
    }

    #[test]
    fn test_kill_reaches_stopped() {
        let mut h = host(FakeDriver::running("dev"));
        h.kill(&test_context()).unwrap();
        assert_eq!(h.state().unwrap(), MachineState::Stopped);
    }

    #[test]
    fn test_restart_from_stopped_uses_start() {
        let mut fake = FakeDriver::running("dev");
        fake.state = MachineState::Stopped;
        let log = fake.call_log();
        let mut h = host(fake);

        h.restart(&test_context()).unwrap();
        assert_eq!(*log.lock(), vec!["start"]);
        assert_eq!(h.state().unwrap(), MachineState::Running);
    }

    #[test]
    fn test_restart_when_running_uses_driver_restart() {
        let fake = FakeDriver::running("dev");
        let log = fake.call_log();
        let mut h = host(fake);

        h.restart(&test_context()).unwrap();
        assert_eq!(*log.lock(), vec!["restart"]);
    }

    #[test]
    fn test_start_failure_is_propagated() {
        let mut fake = FakeDriver::running("dev");
        fake.state = MachineState::Stopped;
        fake.fail_start = Some("no hypervisor".into());
        let mut h = host(fake);

        let err = h.start(&test_context()).unwrap_err();
        assert!(err.to_string().contains("no hypervisor"));
    }

    #[test]
    fn test_start_keeps_polling_through_state_errors() {
        let mut fake = FakeDriver::running("dev");
        fake.state = MachineState::Stopped;
        fake.boot_state_errors = 2;
        let mut h = host(fake);

        h.start(&test_context()).unwrap();
        assert_eq!(h.state().unwrap(), MachineState::Running);
    }

    #[test]
    fn test_state_errors_past_the_wait_budget_time_out() {
        let mut fake = FakeDriver::running("dev");
        fake.state = MachineState::Stopped;
        fake.boot_state_errors = 10;
        let mut h = host(fake);

        let err = h.start(&test_context()).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[test]
    fn test_start_times_out_when_state_never_changes() {
        let mut h = host(FakeDriver::new("dev"));
        h.driver = Box::new(StuckDriver(FakeDriver::new("dev")));

        let err = h.start(&test_context()).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[test]
    fn test_upgrade_runs_package_upgrade() {
        let channel = Arc::new(
            ScriptedChannel::new()
                .respond("cat /etc/os-release", "ID=fedora\nVERSION_ID=29\n")
                .respond("netstat -a", crate::provision::fake::NETSTAT_OUTPUT),
        );
        let mut ctx = Context::standard().with_wait(WaitPolicy::new(Duration::from_millis(1), 3));
        ctx.channels = Arc::new(FixedChannelFactory(channel.clone()));

        let mut h = host(FakeDriver::running("dev"));
        h.upgrade(&ctx).unwrap();

        let commands = channel.commands();
        assert!(commands.iter().any(|c| c == "sudo -E dnf upgrade -y podman"));
        assert!(commands.iter().any(|c| c.ends_with("systemctl -f restart podman")));
    }

    #[test]
    fn test_engine_version_is_trimmed() {
        let channel = Arc::new(ScriptedChannel::new().respond("podman version", "1.2.0\n"));
        let mut ctx = test_context();
        ctx.channels = Arc::new(FixedChannelFactory(channel));

        let h = host(FakeDriver::running("dev"));
        assert_eq!(h.engine_version(&ctx).unwrap(), "1.2.0");
    }

    /// Accepts `start` but never leaves `None`.
    struct StuckDriver(FakeDriver);

    impl Driver for StuckDriver {
        fn driver_name(&self) -> String {
            self.0.driver_name()
        }
        fn machine_name(&self) -> String {
            self.0.machine_name()
        }
        fn create_flags(&self) -> Result<Vec<crate::driver::CreateFlag>> {
            self.0.create_flags()
        }
        fn set_config_from_flags(&mut self, opts: &crate::driver::DriverOptions) -> Result<()> {
            self.0.set_config_from_flags(opts)
        }
        fn pre_create_check(&mut self) -> Result<()> {
            Ok(())
        }
        fn create(&mut self) -> Result<()> {
            Ok(())
        }
        fn start(&mut self) -> Result<()> {
            Ok(())
        }
        fn stop(&mut self) -> Result<()> {
            Ok(())
        }
        fn restart(&mut self) -> Result<()> {
            Ok(())
        }
        fn kill(&mut self) -> Result<()> {
            Ok(())
        }
        fn remove(&mut self) -> Result<()> {
            Ok(())
        }
        fn state(&self) -> Result<MachineState> {
            Ok(MachineState::None)
        }
        fn url(&self) -> Result<String> {
            self.0.url()
        }
        fn ip(&self) -> Result<String> {
            self.0.ip()
        }
        fn ssh_hostname(&self) -> Result<String> {
            self.0.ssh_hostname()
        }
        fn ssh_port(&self) -> Result<u16> {
            self.0.ssh_port()
        }
        fn ssh_username(&self) -> Result<String> {
            self.0.ssh_username()
        }
        fn ssh_key_path(&self) -> Result<Option<std::path::PathBuf>> {
            self.0.ssh_key_path()
        }
        fn raw_config(&self) -> Result<Vec<u8>> {
            self.0.raw_config()
        }
    }
}
