//! Locating and spawning driver plugin binaries.

use crate::error::Result;
use podmachine_protocol::env;
use std::fs::OpenOptions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

/// Prefix of every plugin binary name.
pub const PLUGIN_PREFIX: &str = "podmachine-driver-";

/// Binary name for a driver family.
pub fn plugin_binary_name(driver: &str) -> String {
    format!("{}{}", PLUGIN_PREFIX, driver)
}

/// Find the plugin binary for `driver`.
///
/// Searches `plugin_dir`, then the directory of the running executable,
/// then `PATH`.
pub fn find_plugin(driver: &str, plugin_dir: Option<&Path>) -> Option<PathBuf> {
    let binary = plugin_binary_name(driver);

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    let path_dirs = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
        .unwrap_or_default();

    plugin_dir
        .map(Path::to_path_buf)
        .into_iter()
        .chain(exe_dir)
        .chain(path_dirs)
        .map(|dir| dir.join(&binary))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Spawn a plugin that will listen on `socket`, with stderr appended to `log`.
pub fn spawn_plugin(binary: &Path, socket: &Path, log: &Path) -> Result<Child> {
    let stderr = OpenOptions::new().create(true).append(true).open(log)?;

    tracing::debug!(
        binary = %binary.display(),
        socket = %socket.display(),
        log = %log.display(),
        "spawning driver plugin"
    );

    let child = Command::new(binary)
        .env(env::SOCKET, socket)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr))
        .spawn()?;

    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_finds_plugin_in_plugin_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "podmachine-driver-kvm-test", 0o755);

        assert_eq!(find_plugin("kvm-test", Some(dir.path())), Some(path));
    }

    #[test]
    fn test_skips_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "podmachine-driver-noexec-test", 0o644);

        assert_eq!(find_plugin("noexec-test", Some(dir.path())), None);
    }

    #[test]
    fn test_missing_plugin() {
        assert_eq!(find_plugin("definitely-not-installed", None), None);
    }
}
