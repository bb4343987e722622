//! Rm command implementation.

use crate::cli::{confirm, open_client};
use clap::Args;
use podmachine::batch;
use podmachine::config::PodmachineConfig;

/// Remove machines.
#[derive(Args, Debug)]
pub struct RmCmd {
    /// Machine names.
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Remove local configuration even if the machine cannot be removed.
    #[arg(short, long)]
    pub force: bool,

    /// Do not ask for confirmation.
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
}

impl RmCmd {
    /// Execute the rm command.
    pub fn run(self, config: &PodmachineConfig) -> podmachine::Result<()> {
        println!("About to remove {}", self.names.join(", "));
        if !self.yes && !confirm("Are you sure?")? {
            return Ok(());
        }

        let client = open_client(config, None)?;
        let result = batch::remove_hosts(&client, &self.names, self.force);
        client.close();

        for name in result? {
            println!("Successfully removed {}", name);
        }
        Ok(())
    }
}
