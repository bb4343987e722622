//! Certificate material checks.

use crate::auth::AuthOptions;
use crate::error::{Error, Result};
use std::path::Path;

/// Produces or validates the TLS material named in [`AuthOptions`].
pub trait CertBootstrapper: Send + Sync {
    /// Make sure CA, server and client material exist before a host is
    /// created or its certificates are redistributed.
    fn bootstrap(&self, auth: &AuthOptions) -> Result<()>;
}

/// Checks that CA, server and client files exist and creates the cert
/// directory.
///
/// Certificate generation itself is left to external tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCertBootstrapper;

impl CertBootstrapper for FileCertBootstrapper {
    fn bootstrap(&self, auth: &AuthOptions) -> Result<()> {
        if !auth.cert_dir.as_os_str().is_empty() {
            std::fs::create_dir_all(&auth.cert_dir).map_err(|e| {
                Error::Certificates(format!(
                    "failed to create {}: {}",
                    auth.cert_dir.display(),
                    e
                ))
            })?;
        }

        for (what, path) in [
            ("CA certificate", &auth.ca_cert_path),
            ("CA key", &auth.ca_private_key_path),
            ("client certificate", &auth.client_cert_path),
            ("client key", &auth.client_key_path),
            ("server certificate", &auth.server_cert_path),
            ("server key", &auth.server_key_path),
        ] {
            require(what, path)?;
        }

        tracing::debug!(cert_dir = %auth.cert_dir.display(), "certificates present");
        Ok(())
    }
}

fn require(what: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::Certificates(format!("no path configured for {}", what)));
    }
    if !path.is_file() {
        return Err(Error::Certificates(format!(
            "{} not found at {}",
            what,
            path.display()
        )));
    }
    Ok(())
}

/// Accepts any options without touching the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCertBootstrapper;

impl CertBootstrapper for NoopCertBootstrapper {
    fn bootstrap(&self, _auth: &AuthOptions) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_ca_is_reported() {
        let tmp = TempDir::new().unwrap();
        let certs = tmp.path().join("certs");
        let auth = AuthOptions::for_machine(&certs, &tmp.path().join("machines/dev"));

        let err = FileCertBootstrapper.bootstrap(&auth).unwrap_err();
        assert!(matches!(err, Error::Certificates(_)));
        assert!(err.to_string().contains("CA certificate"));
        assert!(certs.is_dir());
    }

    fn write_shared(certs: &Path) {
        std::fs::create_dir_all(certs).unwrap();
        for name in ["ca.pem", "ca-key.pem", "cert.pem", "key.pem"] {
            std::fs::write(certs.join(name), "pem").unwrap();
        }
    }

    #[test]
    fn test_missing_server_material_is_reported() {
        let tmp = TempDir::new().unwrap();
        let certs = tmp.path().join("certs");
        write_shared(&certs);

        let auth = AuthOptions::for_machine(&certs, &tmp.path().join("machines/dev"));
        let err = FileCertBootstrapper.bootstrap(&auth).unwrap_err();
        assert!(err.to_string().contains("server certificate"));
    }

    #[test]
    fn test_complete_material_passes() {
        let tmp = TempDir::new().unwrap();
        let certs = tmp.path().join("certs");
        let machine = tmp.path().join("machines/dev");
        write_shared(&certs);
        std::fs::create_dir_all(&machine).unwrap();
        for name in ["server.pem", "server-key.pem"] {
            std::fs::write(machine.join(name), "pem").unwrap();
        }

        let auth = AuthOptions::for_machine(&certs, &machine);
        FileCertBootstrapper.bootstrap(&auth).unwrap();
    }
}
