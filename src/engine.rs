//! Container engine daemon options.

use serde::{Deserialize, Serialize};

/// Where the engine install script is fetched from by default.
pub const DEFAULT_ENGINE_INSTALL_URL: &str = "https://podman.io/install.sh";

/// Default storage driver for new hosts.
pub const DEFAULT_STORAGE_DRIVER: &str = "overlay2";

/// Engine daemon settings for a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Flags passed through verbatim, without leading dashes.
    #[serde(default)]
    pub arbitrary_flags: Vec<String>,
    /// Environment for the daemon, `KEY=VALUE`.
    #[serde(default)]
    pub env: Vec<String>,
    /// Registries reached without TLS verification.
    #[serde(default)]
    pub insecure_registry: Vec<String>,
    /// Daemon labels, `key=value`.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Registry mirrors.
    #[serde(default)]
    pub registry_mirror: Vec<String>,
    /// Storage driver.
    pub storage_driver: String,
    /// Require TLS client verification.
    pub tls_verify: bool,
    /// Engine install script URL.
    pub install_url: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            arbitrary_flags: Vec::new(),
            env: Vec::new(),
            insecure_registry: Vec::new(),
            labels: Vec::new(),
            registry_mirror: Vec::new(),
            storage_driver: DEFAULT_STORAGE_DRIVER.to_string(),
            tls_verify: true,
            install_url: DEFAULT_ENGINE_INSTALL_URL.to_string(),
        }
    }
}
