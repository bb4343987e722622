//! Commands that apply one lifecycle verb to several machines.

use crate::cli::parsers::parse_duration;
use crate::cli::{confirm, open_client};
use clap::Args;
use podmachine::batch::{self, HostAction};
use podmachine::config::PodmachineConfig;
use std::time::Duration;

/// Machines to act on.
#[derive(Args, Debug)]
pub struct HostsCmd {
    /// Machine names. Defaults to the machine named "default".
    pub names: Vec<String>,

    /// How long to wait for each state change (e.g., "90s", "5m").
    #[arg(long, value_parser = parse_duration, value_name = "DURATION")]
    pub timeout: Option<Duration>,
}

impl HostsCmd {
    /// Run `action` on every named machine.
    pub fn run(self, action: HostAction, config: &PodmachineConfig) -> podmachine::Result<()> {
        let client = open_client(config, self.timeout)?;
        let result = batch::run_action(&client, action, &self.names);
        client.close();
        result
    }
}

/// Regenerate certificates for machines.
#[derive(Args, Debug)]
pub struct RegenerateCertsCmd {
    #[command(flatten)]
    pub hosts: HostsCmd,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub force: bool,
}

impl RegenerateCertsCmd {
    /// Execute the regenerate-certs command.
    pub fn run(self, config: &PodmachineConfig) -> podmachine::Result<()> {
        if !self.force && !confirm("Regenerate TLS machine certs? Warning: this is irreversible.")? {
            return Ok(());
        }
        println!("Regenerating TLS certificates");
        self.hosts.run(HostAction::ConfigureAllAuth, config)
    }
}
