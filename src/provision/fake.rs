//! Provisioners that do nothing, for tests.

use super::{EngineConfig, OsRelease, PackageAction, Provisioner, ServiceAction};
use crate::auth::AuthOptions;
use crate::driver::Driver;
use crate::engine::EngineOptions;
use crate::error::Result;
use crate::ssh::CommandChannel;
use std::fmt;
use std::sync::Arc;

/// Compatible with every host; every action succeeds without effect.
#[derive(Debug, Clone, Default)]
pub struct FakeProvisioner {
    os_release: Option<OsRelease>,
}

impl FakeProvisioner {
    /// Factory suitable for a registry or a fixed detector.
    pub fn factory(_driver: &dyn Driver, _channel: Arc<dyn CommandChannel>) -> Box<dyn Provisioner> {
        Box::new(FakeProvisioner::default())
    }
}

impl fmt::Display for FakeProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("fakeprovisioner")
    }
}

impl Provisioner for FakeProvisioner {
    fn ssh_command(&self, _command: &str) -> Result<String> {
        Ok(String::new())
    }

    fn compatible_with_host(&self) -> bool {
        true
    }

    fn set_os_release(&mut self, info: OsRelease) {
        self.os_release = Some(info);
    }

    fn os_release(&self) -> Option<&OsRelease> {
        self.os_release.as_ref()
    }

    fn package(&self, _name: &str, _action: PackageAction) -> Result<()> {
        Ok(())
    }

    fn hostname(&self) -> Result<String> {
        Ok(String::new())
    }

    fn set_hostname(&self, _hostname: &str) -> Result<()> {
        Ok(())
    }

    fn engine_options_dir(&self) -> &str {
        ""
    }

    fn generate_engine_options(
        &self,
        _auth: &AuthOptions,
        _engine: &EngineOptions,
    ) -> Result<EngineConfig> {
        Ok(EngineConfig {
            content: String::new(),
            path: String::new(),
        })
    }

    fn service(&self, _name: &str, _action: ServiceAction) -> Result<()> {
        Ok(())
    }

    fn provision(&mut self, _auth: &AuthOptions, _engine: &EngineOptions) -> Result<()> {
        Ok(())
    }
}

/// Sample `netstat -a` output with the engine socket listening.
pub const NETSTAT_OUTPUT: &str = "\
Active Internet connections (servers and established)
Proto Recv-Q Send-Q Local Address           Foreign Address         State
tcp        0      0 0.0.0.0:ssh             0.0.0.0:*               LISTEN
tcp        0     72 192.168.25.141:ssh      192.168.25.1:63235      ESTABLISHED
tcp        0      0 :::ssh                  :::*                    LISTEN
Active UNIX domain sockets (servers and established)
Proto RefCnt Flags       Type       State         I-Node Path
unix  2      [ ACC ]     STREAM     LISTENING      17990 /var/run/acpid.socket
unix  2      [ ACC ]     SEQPACKET  LISTENING      14233 /run/udev/control
unix  2      [ ACC ]     STREAM     LISTENING      19365 /var/run/podman.sock
unix  3      [ ]         STREAM     CONNECTED      19774
unix  3      [ ]         STREAM     CONNECTED      19775
unix  3      [ ]         DGRAM                     14243
unix  3      [ ]         DGRAM                     14242";

/// [`FakeProvisioner`] whose guest always reports a listening engine.
#[derive(Debug, Clone, Default)]
pub struct NetstatProvisioner {
    inner: FakeProvisioner,
}

impl NetstatProvisioner {
    /// Factory suitable for a registry or a fixed detector.
    pub fn factory(_driver: &dyn Driver, _channel: Arc<dyn CommandChannel>) -> Box<dyn Provisioner> {
        Box::new(NetstatProvisioner::default())
    }
}

impl fmt::Display for NetstatProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl Provisioner for NetstatProvisioner {
    fn ssh_command(&self, _command: &str) -> Result<String> {
        Ok(NETSTAT_OUTPUT.to_string())
    }

    fn compatible_with_host(&self) -> bool {
        self.inner.compatible_with_host()
    }

    fn set_os_release(&mut self, info: OsRelease) {
        self.inner.set_os_release(info)
    }

    fn os_release(&self) -> Option<&OsRelease> {
        self.inner.os_release()
    }

    fn package(&self, name: &str, action: PackageAction) -> Result<()> {
        self.inner.package(name, action)
    }

    fn hostname(&self) -> Result<String> {
        self.inner.hostname()
    }

    fn set_hostname(&self, hostname: &str) -> Result<()> {
        self.inner.set_hostname(hostname)
    }

    fn engine_options_dir(&self) -> &str {
        self.inner.engine_options_dir()
    }

    fn generate_engine_options(
        &self,
        auth: &AuthOptions,
        engine: &EngineOptions,
    ) -> Result<EngineConfig> {
        self.inner.generate_engine_options(auth, engine)
    }

    fn service(&self, name: &str, action: ServiceAction) -> Result<()> {
        self.inner.service(name, action)
    }

    fn provision(&mut self, auth: &AuthOptions, engine: &EngineOptions) -> Result<()> {
        self.inner.provision(auth, engine)
    }
}
