//! Driver resolution and plugin process ownership.
//!
//! The [`DriverFactory`] turns a driver name and raw blob into a live
//! [`Driver`]. It owns every plugin process it spawns and terminates them
//! on [`DriverFactory::close`] or drop.

use super::launcher::{find_plugin, spawn_plugin};
use super::{PluginClient, RpcDriver};
use crate::config::PodmachineConfig;
use crate::driver::{fake, none, Driver, ErrorDriver, SerialDriver};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::{Duration, Instant};

/// Constructor for an in-process driver family.
pub type BuiltinDriver = fn(&[u8]) -> Result<Box<dyn Driver>>;

/// Factory settings.
#[derive(Debug, Clone)]
pub struct FactoryOptions {
    /// Extra directory searched first for plugin binaries.
    pub plugin_dir: Option<PathBuf>,
    /// Directory for plugin sockets and logs.
    pub runtime_dir: PathBuf,
    /// Families whose calls must be serialized.
    pub serial_drivers: Vec<String>,
    /// How long a plugin may take to open its socket.
    pub start_timeout: Duration,
}

impl FactoryOptions {
    /// Settings from the loaded configuration.
    pub fn from_config(config: &PodmachineConfig) -> Result<Self> {
        let dirs = config.dirs()?;
        Ok(Self {
            plugin_dir: config.plugin_dir.clone(),
            runtime_dir: dirs.runtime,
            serial_drivers: config.serial_drivers.clone(),
            start_timeout: Duration::from_secs(config.timeouts.plugin_start_secs),
        })
    }
}

/// A spawned plugin process.
struct PluginProcess {
    driver: String,
    child: Child,
    socket: PathBuf,
}

/// Internal state shared between threads.
struct FactoryInner {
    processes: Vec<PluginProcess>,
    next_seq: u64,
}

/// Resolves driver names to live drivers.
pub struct DriverFactory {
    options: FactoryOptions,
    builtins: HashMap<String, BuiltinDriver>,
    inner: Mutex<FactoryInner>,
}

impl DriverFactory {
    /// Create a factory with the `none` builtin registered.
    pub fn new(options: FactoryOptions) -> Self {
        let mut factory = Self {
            options,
            builtins: HashMap::new(),
            inner: Mutex::new(FactoryInner {
                processes: Vec::new(),
                next_seq: 0,
            }),
        };
        factory.register_builtin(none::DRIVER_NAME, none::NoneDriver::from_raw);
        factory
    }

    /// Create a factory from the loaded configuration.
    pub fn from_config(config: &PodmachineConfig) -> Result<Self> {
        Ok(Self::new(FactoryOptions::from_config(config)?))
    }

    /// Factory that also serves the in-process fake driver.
    pub fn with_fake(options: FactoryOptions) -> Self {
        let mut factory = Self::new(options);
        factory.register_builtin(fake::DRIVER_NAME, fake::FakeDriver::from_raw);
        factory
    }

    /// Register an in-process driver family.
    pub fn register_builtin(&mut self, name: impl Into<String>, build: BuiltinDriver) {
        self.builtins.insert(name.into(), build);
    }

    /// Check if `name` resolves in-process.
    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// Number of plugin processes currently owned.
    pub fn running_plugins(&self) -> usize {
        self.inner.lock().processes.len()
    }

    /// Resolve `name` into a driver restored from `raw`.
    ///
    /// A missing plugin binary is not an error: the result is an
    /// [`ErrorDriver`]. A plugin that fails to start, handshake or accept
    /// its configuration is a hard error.
    pub fn resolve(&self, name: &str, raw: &[u8]) -> Result<Box<dyn Driver>> {
        let driver = match self.builtins.get(name) {
            Some(build) => build(raw)?,
            None => match find_plugin(name, self.options.plugin_dir.as_deref()) {
                Some(binary) => Box::new(self.launch(name, &binary, raw)?),
                None => {
                    tracing::warn!(driver = name, "driver plugin not found");
                    return Ok(Box::new(ErrorDriver::new(name, raw)));
                }
            },
        };

        if self.options.serial_drivers.iter().any(|d| d == name) {
            Ok(Box::new(SerialDriver::wrap(driver)))
        } else {
            Ok(driver)
        }
    }

    /// Start a plugin and connect a driver to it.
    fn launch(&self, name: &str, binary: &Path, raw: &[u8]) -> Result<RpcDriver> {
        let plugins_dir = self.options.runtime_dir.join("plugins");
        std::fs::create_dir_all(&plugins_dir)?;

        let seq = {
            let mut inner = self.inner.lock();
            inner.next_seq += 1;
            inner.next_seq
        };
        let socket = plugins_dir.join(format!("{}-{}-{}.sock", name, std::process::id(), seq));
        let log = plugins_dir.join(format!("{}.log", name));
        let _ = std::fs::remove_file(&socket);

        let mut child = spawn_plugin(binary, &socket, &log)?;
        tracing::info!(driver = name, pid = child.id(), "started driver plugin");

        match self.connect(name, &mut child, &socket, raw) {
            Ok(driver) => {
                self.inner.lock().processes.push(PluginProcess {
                    driver: name.to_string(),
                    child,
                    socket,
                });
                Ok(driver)
            }
            Err(e) => {
                tracing::warn!(driver = name, error = %e, "driver plugin failed to start");
                terminate(&mut child);
                let _ = std::fs::remove_file(&socket);
                Err(e)
            }
        }
    }

    fn connect(&self, name: &str, child: &mut Child, socket: &Path, raw: &[u8]) -> Result<RpcDriver> {
        let stream = self.wait_for_socket(name, child, socket)?;
        let mut client = PluginClient::from_stream(name, stream);
        client.set_read_timeout(Some(self.options.start_timeout));
        client.handshake()?;
        client.set_config_raw(raw)?;
        client.set_read_timeout(None);
        let driver = RpcDriver::new(client)?;
        Ok(driver)
    }

    /// Wait for the plugin to accept connections on its socket.
    fn wait_for_socket(&self, name: &str, child: &mut Child, socket: &Path) -> Result<UnixStream> {
        let timeout = self.options.start_timeout;
        let start = Instant::now();
        let poll_interval = Duration::from_millis(50);

        while start.elapsed() < timeout {
            if let Some(status) = child.try_wait()? {
                return Err(Error::handshake(
                    name,
                    format!("plugin exited during startup ({})", status),
                ));
            }

            if socket.exists() {
                match UnixStream::connect(socket) {
                    Ok(stream) => return Ok(stream),
                    Err(e) => tracing::trace!("connect failed: {}", e),
                }
            }

            std::thread::sleep(poll_interval);
        }

        Err(Error::handshake(
            name,
            format!(
                "plugin did not open its socket within {} seconds",
                timeout.as_secs_f32()
            ),
        ))
    }

    /// Terminate every plugin process this factory spawned.
    ///
    /// Safe to call more than once; later calls find nothing to do.
    pub fn close(&self) {
        let processes = std::mem::take(&mut self.inner.lock().processes);

        for mut process in processes {
            tracing::debug!(driver = %process.driver, pid = process.child.id(), "stopping driver plugin");
            terminate(&mut process.child);
            let _ = std::fs::remove_file(&process.socket);
        }
    }
}

impl Drop for DriverFactory {
    fn drop(&mut self) {
        self.close();
    }
}

/// SIGTERM, wait briefly, then SIGKILL and reap.
fn terminate(child: &mut Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }

    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        match child.try_wait() {
            Ok(Some(_)) | Err(_) => return,
            Ok(None) => std::thread::sleep(Duration::from_millis(100)),
        }
    }

    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::BaseDriver;
    use crate::state::MachineState;
    use std::os::unix::fs::PermissionsExt;

    fn options(dir: &Path) -> FactoryOptions {
        FactoryOptions {
            plugin_dir: Some(dir.join("bin")),
            runtime_dir: dir.join("run"),
            serial_drivers: vec![],
            start_timeout: Duration::from_millis(500),
        }
    }

    fn install_script(dir: &Path, driver: &str, body: &str) {
        let bin = dir.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let path = bin.join(format!("podmachine-driver-{}", driver));
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn raw() -> Vec<u8> {
        BaseDriver::new("dev", "/store").to_raw().unwrap()
    }

    #[test]
    fn test_missing_plugin_degrades_to_error_driver() {
        let dir = tempfile::tempdir().unwrap();
        let factory = DriverFactory::new(options(dir.path()));

        let driver = factory.resolve("nosuchdriver-test", &raw()).unwrap();
        assert_eq!(driver.machine_name(), "dev");

        let err = driver.state().unwrap_err();
        assert!(err.is_plugin_not_found());
        assert!(err.to_string().contains("nosuchdriver-test"));
        assert_eq!(factory.running_plugins(), 0);
    }

    #[test]
    fn test_plugin_exiting_early_is_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        install_script(dir.path(), "crashy", "exit 3");
        let factory = DriverFactory::new(options(dir.path()));

        let err = factory.resolve("crashy", &raw()).err().unwrap();
        assert!(matches!(err, Error::PluginHandshake { .. }));
        assert!(err.to_string().contains("exited during startup"));
        assert_eq!(factory.running_plugins(), 0);
    }

    #[test]
    fn test_silent_plugin_times_out_and_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        install_script(dir.path(), "silent", "exec sleep 30");
        let factory = DriverFactory::new(options(dir.path()));

        let start = Instant::now();
        let err = factory.resolve("silent", &raw()).err().unwrap();
        assert!(matches!(err, Error::PluginHandshake { .. }));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(factory.running_plugins(), 0);
    }

    #[test]
    fn test_plugin_stderr_goes_to_log() {
        let dir = tempfile::tempdir().unwrap();
        install_script(dir.path(), "noisy", "echo \"socket=$PODMACHINE_PLUGIN_SOCKET\" >&2; exit 1");
        let factory = DriverFactory::new(options(dir.path()));

        assert!(factory.resolve("noisy", &raw()).is_err());
        let log = std::fs::read_to_string(dir.path().join("run/plugins/noisy.log")).unwrap();
        assert!(log.contains("socket="));
        assert!(log.contains(".sock"));
    }

    #[test]
    fn test_builtin_none_resolves_in_process() {
        let dir = tempfile::tempdir().unwrap();
        let factory = DriverFactory::new(options(dir.path()));

        let driver = factory
            .resolve("none", br#"{"machine_name":"dev","url":"tcp://1.2.3.4:2376"}"#)
            .unwrap();
        assert_eq!(driver.state().unwrap(), MachineState::Running);
        assert_eq!(driver.url().unwrap(), "tcp://1.2.3.4:2376");
    }

    #[test]
    fn test_serial_families_are_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.serial_drivers = vec!["fake".into()];
        let factory = DriverFactory::with_fake(opts);

        let driver = factory.resolve("fake", &raw()).unwrap();
        assert_eq!(driver.driver_name(), "fake");
        assert_eq!(driver.machine_name(), "dev");
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let factory = DriverFactory::new(options(dir.path()));
        factory.close();
        factory.close();
        assert_eq!(factory.running_plugins(), 0);
    }
}
