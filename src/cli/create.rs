//! Create command implementation.

use crate::cli::open_client;
use crate::cli::parsers::{parse_duration, parse_key_value};
use clap::Args;
use podmachine::config::PodmachineConfig;
use podmachine::driver::{BaseDriver, DriverOptions};
use std::time::Duration;

/// Create a machine.
#[derive(Args, Debug)]
pub struct CreateCmd {
    /// Machine name.
    pub name: String,

    /// Driver to create the machine with.
    #[arg(short, long)]
    pub driver: Option<String>,

    /// Driver flag value (KEY=VALUE, repeatable).
    #[arg(short = 'o', long = "driver-opt", value_parser = parse_key_value, value_name = "KEY=VALUE")]
    pub driver_opts: Vec<(String, String)>,

    /// Engine daemon label (repeatable).
    #[arg(long = "engine-label", value_name = "LABEL")]
    pub engine_labels: Vec<String>,

    /// Registry reached without TLS verification (repeatable).
    #[arg(long = "engine-insecure-registry", value_name = "REGISTRY")]
    pub engine_insecure_registries: Vec<String>,

    /// Registry mirror (repeatable).
    #[arg(long = "engine-registry-mirror", value_name = "URL")]
    pub engine_registry_mirrors: Vec<String>,

    /// Extra engine daemon flag, without leading dashes (repeatable).
    #[arg(long = "engine-opt", value_name = "FLAG")]
    pub engine_opts: Vec<String>,

    /// Engine daemon environment variable, KEY=VALUE (repeatable).
    #[arg(long = "engine-env", value_name = "KEY=VALUE")]
    pub engine_env: Vec<String>,

    /// Engine storage driver.
    #[arg(long = "engine-storage-driver")]
    pub engine_storage_driver: Option<String>,

    /// Engine install script URL.
    #[arg(long = "engine-install-url")]
    pub engine_install_url: Option<String>,

    /// Memory hint in MiB.
    #[arg(long)]
    pub memory: Option<u64>,

    /// Disk hint in MiB.
    #[arg(long)]
    pub disk: Option<u64>,

    /// How long to wait for the machine to come up (e.g., "90s", "5m").
    #[arg(long, value_parser = parse_duration, value_name = "DURATION")]
    pub timeout: Option<Duration>,
}

impl CreateCmd {
    /// Execute the create command.
    pub fn run(self, config: &PodmachineConfig) -> podmachine::Result<()> {
        let client = open_client(config, self.timeout)?;
        client.check_new_name(&self.name)?;

        let driver_name = self
            .driver
            .clone()
            .unwrap_or_else(|| config.default_driver.clone());

        let raw = BaseDriver::new(&self.name, &client.dirs().base).to_raw()?;
        let mut host = client.new_host(&driver_name, &raw)?;

        let flags = host.driver.create_flags()?;
        let opts = DriverOptions::resolve(&flags, &self.driver_opts, |key| std::env::var(key).ok())?;
        host.driver.set_config_from_flags(&opts)?;

        let engine = &mut host.host_options.engine;
        engine.labels = self.engine_labels;
        engine.insecure_registry = self.engine_insecure_registries;
        engine.registry_mirror = self.engine_registry_mirrors;
        engine.arbitrary_flags = self.engine_opts;
        engine.env = self.engine_env;
        if let Some(storage_driver) = self.engine_storage_driver {
            engine.storage_driver = storage_driver;
        }
        if let Some(url) = self.engine_install_url {
            engine.install_url = url;
        }
        if let Some(memory) = self.memory {
            host.host_options.memory_mb = memory;
        }
        if let Some(disk) = self.disk {
            host.host_options.disk_mb = disk;
        }

        println!("Creating machine {} with driver {}...", self.name, driver_name);
        let result = client.create(&mut host);
        client.close();
        result?;

        println!("Machine {} is ready.", self.name);
        Ok(())
    }
}
