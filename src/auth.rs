//! Certificate locations for a host.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where a host's TLS material lives, locally and on the guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthOptions {
    /// Directory holding the shared CA and client material.
    pub cert_dir: PathBuf,
    /// CA certificate.
    pub ca_cert_path: PathBuf,
    /// CA private key.
    pub ca_private_key_path: PathBuf,
    /// Client certificate.
    pub client_cert_path: PathBuf,
    /// Client key.
    pub client_key_path: PathBuf,
    /// Per-machine server certificate.
    pub server_cert_path: PathBuf,
    /// Per-machine server key.
    pub server_key_path: PathBuf,
    /// Per-machine directory that receives copies of the client material.
    pub store_path: PathBuf,
    /// Extra subject alternative names for the server certificate.
    #[serde(default)]
    pub server_cert_sans: Vec<String>,
    /// CA certificate path on the guest.
    #[serde(default)]
    pub ca_cert_remote_path: String,
    /// Server certificate path on the guest.
    #[serde(default)]
    pub server_cert_remote_path: String,
    /// Server key path on the guest.
    #[serde(default)]
    pub server_key_remote_path: String,
}

impl AuthOptions {
    /// Default layout: shared material in `certs_dir`, per-machine material
    /// in `machine_dir`.
    pub fn for_machine(certs_dir: &Path, machine_dir: &Path) -> Self {
        Self {
            cert_dir: certs_dir.to_path_buf(),
            ca_cert_path: certs_dir.join("ca.pem"),
            ca_private_key_path: certs_dir.join("ca-key.pem"),
            client_cert_path: certs_dir.join("cert.pem"),
            client_key_path: certs_dir.join("key.pem"),
            server_cert_path: machine_dir.join("server.pem"),
            server_key_path: machine_dir.join("server-key.pem"),
            store_path: machine_dir.to_path_buf(),
            server_cert_sans: Vec::new(),
            ca_cert_remote_path: String::new(),
            server_cert_remote_path: String::new(),
            server_key_remote_path: String::new(),
        }
    }

    /// Point the guest-side paths into `dir`.
    pub fn with_remote_dir(mut self, dir: &str) -> Self {
        let dir = dir.trim_end_matches('/');
        self.ca_cert_remote_path = format!("{}/ca.pem", dir);
        self.server_cert_remote_path = format!("{}/server.pem", dir);
        self.server_key_remote_path = format!("{}/server-key.pem", dir);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_machine_layout() {
        let opts = AuthOptions::for_machine(
            Path::new("/store/certs"),
            Path::new("/store/machines/dev"),
        );
        assert_eq!(opts.ca_cert_path, PathBuf::from("/store/certs/ca.pem"));
        assert_eq!(opts.client_key_path, PathBuf::from("/store/certs/key.pem"));
        assert_eq!(
            opts.server_key_path,
            PathBuf::from("/store/machines/dev/server-key.pem")
        );
    }

    #[test]
    fn test_with_remote_dir() {
        let opts = AuthOptions::default().with_remote_dir("/etc/podman/");
        assert_eq!(opts.ca_cert_remote_path, "/etc/podman/ca.pem");
        assert_eq!(opts.server_cert_remote_path, "/etc/podman/server.pem");
        assert_eq!(opts.server_key_remote_path, "/etc/podman/server-key.pem");
    }
}
