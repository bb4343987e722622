//! Shared provisioning for systemd-based distributions.

use super::{
    engine_config, EngineConfig, OsRelease, PackageAction, Provisioner, ServiceAction,
    ENGINE_PACKAGE, ENGINE_SERVICE,
};
use crate::auth::AuthOptions;
use crate::driver::Driver;
use crate::engine::EngineOptions;
use crate::error::{Error, Result};
use crate::ssh::{shell_quote, CommandChannel};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Guest directory for engine configuration and certificates.
pub const ENGINE_OPTIONS_DIR: &str = "/etc/podman";

/// Guest file the engine unit reads its flags from.
pub const DAEMON_OPTIONS_FILE: &str = "/etc/sysconfig/podman-machine";

/// Package manager on the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    /// `yum`
    Yum,
    /// `dnf`
    Dnf,
}

impl PackageManager {
    fn command(&self) -> &'static str {
        match self {
            PackageManager::Yum => "yum",
            PackageManager::Dnf => "dnf",
        }
    }
}

/// Provisioner for distributions managed by systemd.
pub struct SystemdProvisioner {
    label: &'static str,
    os_release_id: String,
    package_manager: PackageManager,
    machine_name: String,
    driver_name: String,
    channel: Arc<dyn CommandChannel>,
    os_release: Option<OsRelease>,
    daemon_options_file: String,
}

impl SystemdProvisioner {
    /// Provisioner matching guests whose `ID` is `os_release_id`.
    pub fn new(
        label: &'static str,
        os_release_id: impl Into<String>,
        package_manager: PackageManager,
        driver: &dyn Driver,
        channel: Arc<dyn CommandChannel>,
    ) -> Self {
        Self {
            label,
            os_release_id: os_release_id.into(),
            package_manager,
            machine_name: driver.machine_name(),
            driver_name: driver.driver_name(),
            channel,
            os_release: None,
            daemon_options_file: DAEMON_OPTIONS_FILE.to_string(),
        }
    }

    /// Write `content` to `path` on the guest as root.
    fn write_remote_file(&self, path: &str, content: &str) -> Result<()> {
        let dir = Path::new(path)
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "/".to_string());

        self.ssh_command(&format!(
            "sudo mkdir -p {} && printf '%s' {} | sudo tee {} >/dev/null",
            shell_quote(&dir),
            shell_quote(content),
            shell_quote(path)
        ))?;
        Ok(())
    }

    /// A failing lookup means the engine is absent; any other error is
    /// returned.
    fn engine_installed(&self) -> Result<bool> {
        match self.ssh_command(&format!("command -v {}", ENGINE_PACKAGE)) {
            Ok(_) => Ok(true),
            Err(Error::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Copy server material to the guest and client material into the
    /// machine's store directory.
    fn copy_certificates(&self, auth: &AuthOptions) -> Result<()> {
        let to_guest = [
            (&auth.ca_cert_path, &auth.ca_cert_remote_path),
            (&auth.server_cert_path, &auth.server_cert_remote_path),
            (&auth.server_key_path, &auth.server_key_remote_path),
        ];
        for (local, remote) in to_guest {
            let content = std::fs::read_to_string(local).map_err(|e| {
                Error::Certificates(format!("reading {}: {}", local.display(), e))
            })?;
            self.write_remote_file(remote, &content)?;
        }

        std::fs::create_dir_all(&auth.store_path)?;
        let to_store = [
            (&auth.ca_cert_path, "ca.pem"),
            (&auth.client_cert_path, "cert.pem"),
            (&auth.client_key_path, "key.pem"),
        ];
        for (source, name) in to_store {
            let target = auth.store_path.join(name);
            if source.as_path() != target.as_path() {
                std::fs::copy(source, &target).map_err(|e| {
                    Error::Certificates(format!(
                        "copying {} to {}: {}",
                        source.display(),
                        target.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(())
    }
}

impl fmt::Display for SystemdProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label)
    }
}

impl Provisioner for SystemdProvisioner {
    fn ssh_command(&self, command: &str) -> Result<String> {
        self.channel.output(command)
    }

    fn compatible_with_host(&self) -> bool {
        self.os_release
            .as_ref()
            .map(|info| info.id() == self.os_release_id)
            .unwrap_or(false)
    }

    fn set_os_release(&mut self, info: OsRelease) {
        self.os_release = Some(info);
    }

    fn os_release(&self) -> Option<&OsRelease> {
        self.os_release.as_ref()
    }

    fn package(&self, name: &str, action: PackageAction) -> Result<()> {
        let command = match action {
            PackageAction::Install => {
                format!("sudo -E {} install -y {}", self.package_manager.command(), name)
            }
            PackageAction::Remove => {
                format!("sudo {} remove -y {}", self.package_manager.command(), name)
            }
            PackageAction::Upgrade => {
                format!("sudo -E {} upgrade -y {}", self.package_manager.command(), name)
            }
        };

        tracing::info!(package = name, %action, "running package action");
        self.ssh_command(&command)?;
        Ok(())
    }

    fn hostname(&self) -> Result<String> {
        Ok(self.ssh_command("hostname")?.trim().to_string())
    }

    fn set_hostname(&self, hostname: &str) -> Result<()> {
        let quoted = shell_quote(hostname);
        self.ssh_command(&format!(
            "sudo hostnamectl set-hostname {} && echo {} | sudo tee /etc/hostname >/dev/null",
            quoted, quoted
        ))?;
        Ok(())
    }

    fn engine_options_dir(&self) -> &str {
        ENGINE_OPTIONS_DIR
    }

    fn generate_engine_options(
        &self,
        auth: &AuthOptions,
        engine: &EngineOptions,
    ) -> Result<EngineConfig> {
        Ok(EngineConfig {
            content: engine_config::render(auth, engine, &self.driver_name),
            path: self.daemon_options_file.clone(),
        })
    }

    fn service(&self, name: &str, action: ServiceAction) -> Result<()> {
        // systemd only sees unit changes after a reload.
        if matches!(action, ServiceAction::Start | ServiceAction::Restart) {
            self.ssh_command("sudo systemctl daemon-reload")?;
        }

        self.ssh_command(&format!("sudo systemctl -f {} {}", action, name))?;
        Ok(())
    }

    fn provision(&mut self, auth: &AuthOptions, engine: &EngineOptions) -> Result<()> {
        tracing::info!(machine = %self.machine_name, provisioner = %self, "provisioning");

        self.set_hostname(&self.machine_name)?;

        if !self.engine_installed()? {
            tracing::info!(machine = %self.machine_name, "installing the engine");
            self.package(ENGINE_PACKAGE, PackageAction::Install)?;
        }

        let auth = auth.clone().with_remote_dir(self.engine_options_dir());
        let config = self.generate_engine_options(&auth, engine)?;
        self.write_remote_file(&config.path, &config.content)?;

        self.service(ENGINE_SERVICE, ServiceAction::Restart)?;

        self.copy_certificates(&auth)?;

        tracing::info!(machine = %self.machine_name, "provisioning complete");
        Ok(())
    }
}
