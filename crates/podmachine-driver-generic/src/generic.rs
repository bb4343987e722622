//! Driver for an existing machine reachable over SSH.

use podmachine::driver::{BaseDriver, CreateFlag, Driver, DriverOptions, DEFAULT_ENGINE_PORT};
use podmachine::ssh::{CommandChannel, ExternalSshClient};
use podmachine::{Error, MachineState, Result};
use serde::{Deserialize, Serialize};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

/// Family name of the generic driver.
pub const DRIVER_NAME: &str = "generic";

/// How long a state probe waits for the SSH port.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// An already-running machine managed only over SSH.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericDriver {
    #[serde(flatten)]
    pub base: BaseDriver,
    #[serde(default = "default_engine_port")]
    pub engine_port: u16,
}

fn default_engine_port() -> u16 {
    DEFAULT_ENGINE_PORT
}

impl GenericDriver {
    /// Restore from a raw blob.
    pub fn from_raw(raw: &[u8]) -> Result<Box<dyn Driver>> {
        let driver: GenericDriver = serde_json::from_slice(raw)?;
        Ok(Box::new(driver))
    }

    fn unsupported(&self, operation: &str) -> Error {
        Error::not_supported(DRIVER_NAME, operation)
    }

    fn port_open(&self) -> bool {
        let addrs = match (self.base.ip_address.as_str(), self.base.ssh_port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::debug!(ip = %self.base.ip_address, error = %e, "cannot resolve");
                return false;
            }
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok())
    }

    fn ssh(&self) -> Result<ExternalSshClient> {
        ExternalSshClient::for_driver(self)
    }
}

fn int_flag(opts: &DriverOptions, name: &str) -> Result<u16> {
    let value = opts.int(name);
    u16::try_from(value).map_err(|_| Error::Config(format!("{} out of range: {}", name, value)))
}

impl Driver for GenericDriver {
    fn driver_name(&self) -> String {
        DRIVER_NAME.to_string()
    }

    fn machine_name(&self) -> String {
        self.base.machine_name.clone()
    }

    fn create_flags(&self) -> Result<Vec<CreateFlag>> {
        Ok(vec![
            CreateFlag::String {
                name: "generic-ip-address".into(),
                usage: "IP address of the machine".into(),
                env_var: Some("GENERIC_IP_ADDRESS".into()),
                value: String::new(),
            },
            CreateFlag::String {
                name: "generic-ssh-user".into(),
                usage: "SSH user".into(),
                env_var: Some("GENERIC_SSH_USER".into()),
                value: "root".into(),
            },
            CreateFlag::String {
                name: "generic-ssh-key".into(),
                usage: "SSH private key path".into(),
                env_var: Some("GENERIC_SSH_KEY".into()),
                value: String::new(),
            },
            CreateFlag::Int {
                name: "generic-ssh-port".into(),
                usage: "SSH port".into(),
                env_var: Some("GENERIC_SSH_PORT".into()),
                value: 22,
            },
            CreateFlag::Int {
                name: "generic-engine-port".into(),
                usage: "Engine port".into(),
                env_var: Some("GENERIC_ENGINE_PORT".into()),
                value: i64::from(DEFAULT_ENGINE_PORT),
            },
        ])
    }

    fn set_config_from_flags(&mut self, opts: &DriverOptions) -> Result<()> {
        let ip = opts.string("generic-ip-address");
        if ip.is_empty() {
            return Err(Error::Config(
                "generic driver requires the --generic-ip-address option".into(),
            ));
        }
        self.base.ip_address = ip;
        self.base.ssh_user = opts.string("generic-ssh-user");
        self.base.ssh_port = int_flag(opts, "generic-ssh-port")?;
        self.engine_port = int_flag(opts, "generic-engine-port")?;

        let key = opts.string("generic-ssh-key");
        self.base.ssh_key_path = (!key.is_empty()).then(|| PathBuf::from(key));
        Ok(())
    }

    fn pre_create_check(&mut self) -> Result<()> {
        if let Some(key) = &self.base.ssh_key_path {
            if !key.is_file() {
                return Err(Error::driver(
                    DRIVER_NAME,
                    format!("SSH key does not exist: {}", key.display()),
                ));
            }
        }
        Ok(())
    }

    fn create(&mut self) -> Result<()> {
        if let Some(key) = self.base.ssh_key_path.clone() {
            let dir = self.base.machine_dir();
            std::fs::create_dir_all(&dir)?;
            let copy = dir.join("id_rsa");
            std::fs::copy(&key, &copy)?;
            self.base.ssh_key_path = Some(copy);
        }

        tracing::info!(ip = %self.base.ip_address, port = self.base.ssh_port, "checking SSH port");
        if !self.port_open() {
            return Err(Error::driver(
                DRIVER_NAME,
                format!(
                    "{}:{} is not accepting connections",
                    self.base.ip_address, self.base.ssh_port
                ),
            ));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        Err(self.unsupported("start"))
    }

    fn stop(&mut self) -> Result<()> {
        Err(self.unsupported("stop"))
    }

    fn restart(&mut self) -> Result<()> {
        let ssh = self.ssh()?;
        match ssh.output("sudo shutdown -r now") {
            // The connection drops while the machine goes down.
            Ok(_) | Err(Error::CommandChannelUnreachable(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn kill(&mut self) -> Result<()> {
        Err(self.unsupported("kill"))
    }

    fn remove(&mut self) -> Result<()> {
        Ok(())
    }

    fn state(&self) -> Result<MachineState> {
        if self.port_open() {
            Ok(MachineState::Running)
        } else {
            Ok(MachineState::Stopped)
        }
    }

    fn url(&self) -> Result<String> {
        Ok(format!("tcp://{}:{}", self.base.ip_address, self.engine_port))
    }

    fn ip(&self) -> Result<String> {
        if self.base.ip_address.is_empty() {
            return Err(Error::driver(DRIVER_NAME, "IP address is not set"));
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn driver() -> GenericDriver {
        let raw = BaseDriver::new("dev", "/store").to_raw().unwrap();
        serde_json::from_slice(&raw).unwrap()
    }

    fn opts(pairs: &[(&str, &str)]) -> DriverOptions {
        let flags = driver().create_flags().unwrap();
        let overrides: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DriverOptions::resolve(&flags, &overrides, |_| None).unwrap()
    }

    #[test]
    fn test_defaults_from_flags() {
        let mut d = driver();
        d.set_config_from_flags(&opts(&[("generic-ip-address", "10.0.0.5")]))
            .unwrap();

        assert_eq!(d.ssh_username().unwrap(), "root");
        assert_eq!(d.ssh_port().unwrap(), 22);
        assert_eq!(d.ssh_key_path().unwrap(), None);
        assert_eq!(d.url().unwrap(), "tcp://10.0.0.5:2376");
    }

    #[test]
    fn test_ip_address_required() {
        let mut d = driver();
        assert!(d.set_config_from_flags(&opts(&[])).is_err());
    }

    #[test]
    fn test_state_follows_ssh_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut d = driver();
        d.base.ip_address = "127.0.0.1".into();
        d.base.ssh_port = port;
        assert_eq!(d.state().unwrap(), MachineState::Running);

        drop(listener);
        assert_eq!(d.state().unwrap(), MachineState::Stopped);
    }

    #[test]
    fn test_lifecycle_not_supported() {
        let mut d = driver();
        assert!(matches!(d.start(), Err(Error::NotSupported { .. })));
        assert!(matches!(d.stop(), Err(Error::NotSupported { .. })));
        assert!(matches!(d.kill(), Err(Error::NotSupported { .. })));
        assert!(d.remove().is_ok());
    }

    #[test]
    fn test_missing_key_fails_pre_create() {
        let mut d = driver();
        d.base.ssh_key_path = Some(PathBuf::from("/nonexistent/id_rsa"));
        assert!(d.pre_create_check().is_err());
    }
}
