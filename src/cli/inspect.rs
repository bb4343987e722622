//! Single-machine query commands.

use crate::cli::open_client;
use clap::Args;
use podmachine::batch::target_hosts;
use podmachine::config::PodmachineConfig;
use podmachine::{Client, Host};

/// Machine to query.
#[derive(Args, Debug)]
pub struct HostCmd {
    /// Machine name. Defaults to the machine named "default".
    pub name: Option<String>,
}

impl HostCmd {
    fn with_host<F>(self, config: &PodmachineConfig, query: F) -> podmachine::Result<()>
    where
        F: FnOnce(&Client, &Host) -> podmachine::Result<String>,
    {
        let client = open_client(config, None)?;
        let names: Vec<String> = self.name.into_iter().collect();

        let result = target_hosts(&client, &names)
            .and_then(|targets| {
                let name = targets.into_iter().next().unwrap_or_default();
                client.load(&name)
            })
            .and_then(|host| query(&client, &host));
        client.close();

        println!("{}", result?);
        Ok(())
    }

    /// Print the machine state.
    pub fn status(self, config: &PodmachineConfig) -> podmachine::Result<()> {
        self.with_host(config, |_, host| Ok(host.state()?.to_string()))
    }

    /// Print the engine URL.
    pub fn url(self, config: &PodmachineConfig) -> podmachine::Result<()> {
        self.with_host(config, |_, host| host.url())
    }

    /// Print the machine IP address.
    pub fn ip(self, config: &PodmachineConfig) -> podmachine::Result<()> {
        self.with_host(config, |_, host| host.ip())
    }
}

/// Print version information.
#[derive(Args, Debug)]
pub struct VersionCmd {
    /// Print the engine version running on this machine instead.
    pub name: Option<String>,
}

impl VersionCmd {
    /// Execute the version command.
    pub fn run(self, config: &PodmachineConfig) -> podmachine::Result<()> {
        if self.name.is_none() {
            println!("podmachine version {}", podmachine::VERSION);
            return Ok(());
        }

        HostCmd { name: self.name }
            .with_host(config, |client, host| host.engine_version(client.context()))
    }
}
