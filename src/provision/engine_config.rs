//! Engine daemon flag file rendering.
//!
//! The rendered layout is read by the guest's service unit, so flag names
//! and their order must stay exactly as below.

use crate::auth::AuthOptions;
use crate::engine::EngineOptions;
use std::fmt::Write;

/// Rendered daemon options and where they go on the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// File content.
    pub content: String,
    /// Destination path on the guest.
    pub path: String,
}

/// Render the daemon flag line and the environment line.
///
/// Order: `--storage-driver`, `--tlsverify`, `--tlscacert`, `--tlscert`,
/// `--tlskey`, then every `--label`, `--insecure-registry`,
/// `--registry-mirror`, and finally the pass-through flags.
pub fn render(auth: &AuthOptions, engine: &EngineOptions, driver_name: &str) -> String {
    let mut out = String::new();

    let _ = write!(
        out,
        "--storage-driver {} --tlsverify --tlscacert {} --tlscert {} --tlskey {} ",
        engine.storage_driver,
        auth.ca_cert_remote_path,
        auth.server_cert_remote_path,
        auth.server_key_remote_path
    );

    let provider = format!("provider={}", driver_name);
    for label in engine.labels.iter().chain(std::iter::once(&provider)) {
        let _ = write!(out, "--label {} ", label);
    }
    for registry in &engine.insecure_registry {
        let _ = write!(out, "--insecure-registry {} ", registry);
    }
    for mirror in &engine.registry_mirror {
        let _ = write!(out, "--registry-mirror {} ", mirror);
    }
    for flag in &engine.arbitrary_flags {
        let _ = write!(out, "--{} ", flag);
    }

    out.push_str("\nEnvironment=");
    for var in &engine.env {
        let _ = write!(out, "{:?} ", var);
    }
    out.push('\n');

    out
}
