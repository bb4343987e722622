//! Global podmachine configuration.
//!
//! Settings live in `<config_dir>/podmachine/config.toml`. A missing file
//! means defaults. A few environment variables override the file.

use crate::error::{Error, Result};
use crate::wait::WaitPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name for config and runtime directories.
const APP_NAME: &str = "podmachine";

/// Overrides the base storage directory.
pub const ENV_STORAGE_PATH: &str = "MACHINE_STORAGE_PATH";

/// Overrides the default driver.
pub const ENV_DRIVER: &str = "MACHINE_DRIVER";

/// Adds a plugin search directory.
pub const ENV_PLUGIN_DIR: &str = "PODMACHINE_PLUGIN_DIR";

/// Global podmachine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodmachineConfig {
    /// Base storage directory. Defaults to `~/.local/machine`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,

    /// Extra directory searched first for driver plugins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_dir: Option<PathBuf>,

    /// Driver used by `create` when none is given.
    pub default_driver: String,

    /// Driver families whose calls must never overlap.
    pub serial_drivers: Vec<String>,

    /// Polling and startup limits.
    pub timeouts: Timeouts,
}

impl Default for PodmachineConfig {
    fn default() -> Self {
        Self {
            storage_path: None,
            plugin_dir: None,
            default_driver: "virtualbox".to_string(),
            serial_drivers: vec!["virtualbox".to_string()],
            timeouts: Timeouts::default(),
        }
    }
}

/// Polling and startup limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Seconds between state polls.
    pub state_poll_interval_secs: u64,
    /// State polls before giving up.
    pub state_wait_attempts: u32,
    /// Seconds a plugin may take to open its socket.
    pub plugin_start_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            state_poll_interval_secs: 3,
            state_wait_attempts: 60,
            plugin_start_secs: 10,
        }
    }
}

impl PodmachineConfig {
    /// Default location of the config file.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("could not determine config directory".into()))?;
        Ok(config_dir.join(APP_NAME).join("config.toml"))
    }

    /// Load configuration from the default path and apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::default_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::ConfigLoad(format!("{}: {}", path.display(), e))),
        };
        toml::from_str(&content).map_err(|e| Error::ConfigLoad(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path()?)
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::ConfigSave(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::ConfigSave(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| Error::ConfigSave(e.to_string()))
    }

    /// Apply environment overrides read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var(ENV_STORAGE_PATH).filter(|v| !v.is_empty()) {
            self.storage_path = Some(PathBuf::from(path));
        }
        if let Some(driver) = var(ENV_DRIVER).filter(|v| !v.is_empty()) {
            self.default_driver = driver;
        }
        if let Some(dir) = var(ENV_PLUGIN_DIR).filter(|v| !v.is_empty()) {
            self.plugin_dir = Some(PathBuf::from(dir));
        }
    }

    /// Directory layout for this configuration.
    pub fn dirs(&self) -> Result<MachineDirs> {
        match &self.storage_path {
            Some(base) => Ok(MachineDirs::new(base.clone())),
            None => MachineDirs::default_base().map(MachineDirs::new),
        }
    }

    /// Wait policy for state polling.
    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_secs(self.timeouts.state_poll_interval_secs),
            self.timeouts.state_wait_attempts,
        )
    }
}

/// Directory layout under the base storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineDirs {
    /// Base directory.
    pub base: PathBuf,
    /// One subdirectory per machine.
    pub machines: PathBuf,
    /// Shared CA and client certificates.
    pub certs: PathBuf,
    /// Plugin sockets and logs.
    pub runtime: PathBuf,
}

impl MachineDirs {
    /// Layout rooted at `base`.
    pub fn new(base: PathBuf) -> Self {
        let runtime_dir = dirs::runtime_dir()
            .or_else(dirs::cache_dir)
            .unwrap_or_else(|| PathBuf::from("/tmp"));

        Self {
            machines: base.join("machines"),
            certs: base.join("certs"),
            runtime: runtime_dir.join(APP_NAME),
            base,
        }
    }

    /// Default base directory, `~/.local/machine`.
    pub fn default_base() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("could not determine home directory".into()))?;
        Ok(home.join(".local").join("machine"))
    }

    /// Directory of one machine.
    pub fn machine_dir(&self, name: &str) -> PathBuf {
        self.machines.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PodmachineConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, PodmachineConfig::default());
        assert_eq!(config.default_driver, "virtualbox");
        assert_eq!(config.wait_policy(), WaitPolicy::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_driver = \"generic\"\n[timeouts]\nstate_wait_attempts = 5\n")
            .unwrap();

        let config = PodmachineConfig::load_from(&path).unwrap();
        assert_eq!(config.default_driver, "generic");
        assert_eq!(config.timeouts.state_wait_attempts, 5);
        assert_eq!(config.timeouts.state_poll_interval_secs, 3);
        assert_eq!(config.serial_drivers, vec!["virtualbox"]);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = PodmachineConfig::default();
        config.plugin_dir = Some(PathBuf::from("/opt/podmachine/plugins"));
        config.save_to(&path).unwrap();

        assert_eq!(PodmachineConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_driver = [").unwrap();

        let err = PodmachineConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::ConfigLoad(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PodmachineConfig::default();
        config.apply_env(|key| match key {
            ENV_STORAGE_PATH => Some("/data/machine".into()),
            ENV_DRIVER => Some("generic".into()),
            _ => None,
        });

        assert_eq!(config.default_driver, "generic");
        let dirs = config.dirs().unwrap();
        assert_eq!(dirs.machines, PathBuf::from("/data/machine/machines"));
        assert_eq!(dirs.certs, PathBuf::from("/data/machine/certs"));
        assert_eq!(dirs.machine_dir("dev"), PathBuf::from("/data/machine/machines/dev"));
    }
}
