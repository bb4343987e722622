//! OS-specific provisioning.
//!
//! Once a machine answers on its command channel, a [`Detector`] reads its
//! `/etc/os-release` and picks a compatible [`Provisioner`] from the
//! [`Registry`]. The provisioner then installs and configures the engine.

pub mod engine_config;
pub mod fake;
pub mod os_release;
pub mod redhat;
pub mod systemd;

pub use engine_config::EngineConfig;
pub use os_release::OsRelease;

use crate::auth::AuthOptions;
use crate::context::Context;
use crate::driver::Driver;
use crate::engine::EngineOptions;
use crate::error::{Error, Result};
use crate::ssh::{wait_for_channel, CommandChannel};
use crate::wait::WaitPolicy;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Package providing the container engine on the guest.
pub const ENGINE_PACKAGE: &str = "podman";

/// Service running the container engine on the guest.
pub const ENGINE_SERVICE: &str = "podman";

/// Socket the engine listens on once ready.
pub const ENGINE_SOCKET: &str = "podman.sock";

/// Package manager operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageAction {
    /// Install a package.
    Install,
    /// Remove a package.
    Remove,
    /// Upgrade a package.
    Upgrade,
}

impl fmt::Display for PackageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageAction::Install => write!(f, "install"),
            PackageAction::Remove => write!(f, "remove"),
            PackageAction::Upgrade => write!(f, "upgrade"),
        }
    }
}

/// Service manager operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    /// Start a service.
    Start,
    /// Stop a service.
    Stop,
    /// Restart a service.
    Restart,
    /// Enable a service at boot.
    Enable,
    /// Disable a service at boot.
    Disable,
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceAction::Start => write!(f, "start"),
            ServiceAction::Stop => write!(f, "stop"),
            ServiceAction::Restart => write!(f, "restart"),
            ServiceAction::Enable => write!(f, "enable"),
            ServiceAction::Disable => write!(f, "disable"),
        }
    }
}

/// Distribution-specific guest configuration.
pub trait Provisioner: fmt::Display + Send {
    /// Run a command on the guest.
    fn ssh_command(&self, command: &str) -> Result<String>;

    /// Check whether this provisioner handles the injected OS release.
    fn compatible_with_host(&self) -> bool;

    /// Inject the guest's OS release.
    fn set_os_release(&mut self, info: OsRelease);

    /// The injected OS release, if any.
    fn os_release(&self) -> Option<&OsRelease>;

    /// Run a package manager action.
    fn package(&self, name: &str, action: PackageAction) -> Result<()>;

    /// Current guest hostname.
    fn hostname(&self) -> Result<String>;

    /// Set the guest hostname.
    fn set_hostname(&self, hostname: &str) -> Result<()>;

    /// Directory on the guest holding engine configuration and certificates.
    fn engine_options_dir(&self) -> &str;

    /// Render the engine daemon options file.
    fn generate_engine_options(
        &self,
        auth: &AuthOptions,
        engine: &EngineOptions,
    ) -> Result<EngineConfig>;

    /// Run a service manager action.
    fn service(&self, name: &str, action: ServiceAction) -> Result<()>;

    /// Set hostname, install the engine, write its configuration, restart
    /// it and distribute certificates. Stops at the first failing step.
    fn provision(&mut self, auth: &AuthOptions, engine: &EngineOptions) -> Result<()>;
}

/// Builds a provisioner bound to a driver's machine and command channel.
pub type ProvisionerFactory = fn(&dyn Driver, Arc<dyn CommandChannel>) -> Box<dyn Provisioner>;

/// Provisioners by name.
///
/// Iteration order is unspecified. Registered provisioners are expected to
/// match disjoint OS releases.
#[derive(Clone, Default)]
pub struct Registry {
    factories: HashMap<String, ProvisionerFactory>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a provisioner.
    pub fn register(&mut self, name: impl Into<String>, factory: ProvisionerFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Registered names.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Iterate over registered provisioners.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProvisionerFactory)> {
        self.factories.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of registered provisioners.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

/// Strategy for choosing a provisioner.
pub trait Detector: Send + Sync {
    /// Pick a provisioner for the machine behind `driver`.
    fn detect(&self, ctx: &Context, driver: &dyn Driver) -> Result<Box<dyn Provisioner>>;
}

/// Waits for the command channel, reads `/etc/os-release` and asks each
/// registered provisioner whether it is compatible.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDetector;

impl Detector for StandardDetector {
    fn detect(&self, ctx: &Context, driver: &dyn Driver) -> Result<Box<dyn Provisioner>> {
        let machine = driver.machine_name();
        let channel = ctx.channels.connect(driver)?;

        tracing::info!(machine = %machine, "waiting for command channel");
        wait_for_channel(channel.as_ref(), &ctx.wait, &machine)?;

        tracing::info!(machine = %machine, "detecting the provisioner");
        let output = channel.output("cat /etc/os-release")?;
        let info = OsRelease::parse(&output)?;

        for (name, factory) in ctx.registry.iter() {
            let mut provisioner = factory(driver, channel.clone());
            provisioner.set_os_release(info.clone());

            if provisioner.compatible_with_host() {
                tracing::debug!(provisioner = name, id = info.id(), "found compatible host");
                return Ok(provisioner);
            }
        }

        Err(Error::DetectionFailed(format!("{} (ID={:?})", info, info.id())))
    }
}

/// Always returns the provisioner built by one factory.
#[derive(Clone, Copy)]
pub struct FixedDetector {
    factory: ProvisionerFactory,
}

impl FixedDetector {
    /// Detector that always picks `factory`.
    pub fn new(factory: ProvisionerFactory) -> Self {
        Self { factory }
    }
}

impl Detector for FixedDetector {
    fn detect(&self, ctx: &Context, driver: &dyn Driver) -> Result<Box<dyn Provisioner>> {
        let channel = ctx.channels.connect(driver)?;
        Ok((self.factory)(driver, channel))
    }
}

/// Poll `netstat -a` until the engine socket is listening.
pub fn wait_for_engine(provisioner: &dyn Provisioner, policy: &WaitPolicy) -> Result<()> {
    tracing::info!("waiting for the engine to be listening");

    policy.wait_for("engine socket", || {
        let output = match provisioner.ssh_command("netstat -a") {
            Ok(output) => output,
            Err(e) => {
                tracing::trace!(error = %e, "netstat failed");
                return Ok(false);
            }
        };
        Ok(output
            .lines()
            .any(|line| line.contains(ENGINE_SOCKET) && line.contains("LISTEN")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeDriver;
    use crate::ssh::{FixedChannelFactory, ScriptedChannel};
    use std::time::Duration;

    const FEDORA: &str = "NAME=Fedora\nID=fedora\nVERSION_ID=29\n";
    const CENTOS: &str = "NAME=\"CentOS Linux\"\nID=\"centos\"\nID_LIKE=\"rhel fedora\"\nVERSION_ID=\"7\"\n";
    const RHEL: &str = "NAME=\"Red Hat Enterprise Linux Server\"\nID=\"rhel\"\nID_LIKE=\"fedora\"\nVERSION_ID=\"7.6\"\n";
    const UBUNTU: &str = "NAME=\"Ubuntu\"\nID=ubuntu\nID_LIKE=debian\nVERSION_ID=\"18.04\"\n";

    fn context(channel: Arc<ScriptedChannel>) -> Context {
        let mut ctx = Context::standard();
        ctx.channels = Arc::new(FixedChannelFactory(channel));
        ctx.wait = WaitPolicy::new(Duration::from_millis(1), 3);
        ctx
    }

    fn detect(os_release: &str) -> Result<Box<dyn Provisioner>> {
        let channel = Arc::new(ScriptedChannel::new().respond("cat /etc/os-release", os_release));
        let ctx = context(channel);
        ctx.detect_provisioner(&FakeDriver::running("dev"))
    }

    #[test]
    fn test_detects_each_distribution() {
        assert_eq!(detect(FEDORA).unwrap().to_string(), "fedora");
        assert_eq!(detect(CENTOS).unwrap().to_string(), "centos");
        assert_eq!(detect(RHEL).unwrap().to_string(), "redhat");
    }

    #[test]
    fn test_fixtures_match_at_most_one_provisioner() {
        let ctx = Context::standard();
        let driver = FakeDriver::running("dev");
        let channel: Arc<dyn CommandChannel> = Arc::new(ScriptedChannel::new());

        for fixture in [FEDORA, CENTOS, RHEL, UBUNTU] {
            let info = OsRelease::parse(fixture).unwrap();
            let matches: Vec<&str> = ctx
                .registry
                .iter()
                .filter(|(_, factory)| {
                    let mut p = factory(&driver, channel.clone());
                    p.set_os_release(info.clone());
                    p.compatible_with_host()
                })
                .map(|(name, _)| name)
                .collect();
            assert!(matches.len() <= 1, "{} matched {:?}", info.id(), matches);
        }
    }

    #[test]
    fn test_unknown_distribution_fails_detection() {
        let err = detect(UBUNTU).err().unwrap();
        assert!(matches!(err, Error::DetectionFailed(_)));
        assert!(err.to_string().contains("ubuntu"));
    }

    #[test]
    fn test_unparseable_os_release_fails_detection() {
        let err = detect("this is not os-release").err().unwrap();
        assert!(matches!(err, Error::OsReleaseParse(_)));
    }

    #[test]
    fn test_unreachable_channel_is_distinct_from_detection_failure() {
        let channel = Arc::new(ScriptedChannel::new().fail("exit 0", "connection refused"));
        let ctx = context(channel.clone());

        let err = ctx.detect_provisioner(&FakeDriver::running("dev")).err().unwrap();
        assert!(matches!(err, Error::CommandChannelUnreachable(_)));
        assert!(!channel.commands().iter().any(|c| c.contains("os-release")));
    }

    #[test]
    fn test_wait_for_engine_sees_listening_socket() {
        let provisioner = fake::NetstatProvisioner::default();
        wait_for_engine(&provisioner, &WaitPolicy::new(Duration::from_millis(1), 2)).unwrap();
    }

    #[test]
    fn test_wait_for_engine_times_out() {
        let provisioner = fake::FakeProvisioner::default();
        let err = wait_for_engine(&provisioner, &WaitPolicy::new(Duration::from_millis(1), 2))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }
}
