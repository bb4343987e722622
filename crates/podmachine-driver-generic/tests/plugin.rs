//! Resolve the generic driver through a real plugin process.

use podmachine::driver::BaseDriver;
use podmachine::plugin::{DriverFactory, FactoryOptions};
use podmachine::MachineState;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn plugin_dir() -> PathBuf {
    Path::new(env!("CARGO_BIN_EXE_podmachine-driver-generic"))
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

fn raw(ip: &str, ssh_port: u16) -> Vec<u8> {
    let mut base = BaseDriver::new("remote", "/store");
    base.ip_address = ip.to_string();
    base.ssh_port = ssh_port;
    base.to_raw().unwrap()
}

#[test]
fn test_generic_plugin_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let factory = DriverFactory::new(FactoryOptions {
        plugin_dir: Some(plugin_dir()),
        runtime_dir: tmp.path().join("run"),
        serial_drivers: vec!["generic".to_string()],
        start_timeout: Duration::from_secs(10),
    });

    let mut driver = factory.resolve("generic", &raw("127.0.0.1", port)).unwrap();
    assert_eq!(factory.running_plugins(), 1);

    assert_eq!(driver.driver_name(), "generic");
    assert_eq!(driver.machine_name(), "remote");
    assert_eq!(driver.state().unwrap(), MachineState::Running);
    assert_eq!(driver.url().unwrap(), "tcp://127.0.0.1:2376");
    assert_eq!(driver.ssh_port().unwrap(), port);

    let err = driver.start().unwrap_err();
    assert!(matches!(err, podmachine::Error::NotSupported { .. }));

    let flags = driver.create_flags().unwrap();
    assert!(flags.iter().any(|f| f.name() == "generic-ip-address"));

    drop(driver);
    factory.close();
    assert_eq!(factory.running_plugins(), 0);
    factory.close();
}
