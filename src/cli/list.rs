//! Ls command implementation.

use crate::cli::open_client;
use clap::Args;
use podmachine::config::PodmachineConfig;
use podmachine::Host;

/// List machines.
#[derive(Args, Debug)]
pub struct ListCmd {
    /// Only print machine names.
    #[arg(short, long)]
    pub quiet: bool,
}

/// One row of the listing.
struct Row {
    name: String,
    driver: String,
    state: String,
    url: String,
    error: String,
}

impl Row {
    fn from_host(host: &Host) -> Self {
        let mut error = String::new();
        let state = match host.state() {
            Ok(state) => state.to_string(),
            Err(e) => {
                error = e.to_string();
                "error".to_string()
            }
        };
        let url = if error.is_empty() && state == "running" {
            host.url().unwrap_or_default()
        } else {
            String::new()
        };

        Self {
            name: host.name.clone(),
            driver: host.driver_name.clone(),
            state,
            url,
            error,
        }
    }
}

impl ListCmd {
    /// Execute the ls command.
    pub fn run(self, config: &PodmachineConfig) -> podmachine::Result<()> {
        let client = open_client(config, None)?;

        if self.quiet {
            for name in client.list()? {
                println!("{}", name);
            }
            return Ok(());
        }

        let (hosts, failed) = client.load_all()?;
        let mut rows: Vec<Row> = hosts.iter().map(Row::from_host).collect();
        for (name, e) in failed {
            rows.push(Row {
                name,
                driver: String::new(),
                state: "error".to_string(),
                url: String::new(),
                error: e.to_string(),
            });
        }
        rows.sort_by(|a, b| a.name.cmp(&b.name));

        println!("{:<20} {:<12} {:<10} {:<28} ERRORS", "NAME", "DRIVER", "STATE", "URL");
        for row in rows {
            println!(
                "{:<20} {:<12} {:<10} {:<28} {}",
                row.name, row.driver, row.state, row.url, row.error
            );
        }

        drop(hosts);
        client.close();
        Ok(())
    }
}
