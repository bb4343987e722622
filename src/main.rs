//! podmachine CLI entry point.

use clap::{Parser, Subcommand};
use podmachine::batch::HostAction;
use podmachine::config::PodmachineConfig;
use tracing_subscriber::EnvFilter;

mod cli;

/// podmachine - create and manage machines running a container engine
#[derive(Parser, Debug)]
#[command(name = "podmachine")]
#[command(about = "Create and manage machines running a container engine")]
#[command(version)]
struct Cli {
    /// Enable debug logging.
    #[arg(short = 'D', long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a machine.
    Create(cli::create::CreateCmd),

    /// Start machines.
    Start(cli::lifecycle::HostsCmd),

    /// Stop machines.
    Stop(cli::lifecycle::HostsCmd),

    /// Kill machines.
    Kill(cli::lifecycle::HostsCmd),

    /// Restart machines.
    Restart(cli::lifecycle::HostsCmd),

    /// Upgrade the engine on machines.
    Upgrade(cli::lifecycle::HostsCmd),

    /// Re-provision machines.
    Provision(cli::lifecycle::HostsCmd),

    /// Regenerate TLS certificates for machines.
    RegenerateCerts(cli::lifecycle::RegenerateCertsCmd),

    /// Remove machines.
    #[command(alias = "remove")]
    Rm(cli::delete::RmCmd),

    /// List machines.
    #[command(alias = "list")]
    Ls(cli::list::ListCmd),

    /// Print the state of a machine.
    Status(cli::inspect::HostCmd),

    /// Print the engine URL of a machine.
    Url(cli::inspect::HostCmd),

    /// Print the IP address of a machine.
    Ip(cli::inspect::HostCmd),

    /// Print the podmachine version, or the engine version of a machine.
    Version(cli::inspect::VersionCmd),
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.debug);

    tracing::debug!(version = podmachine::VERSION, "starting podmachine");

    let config = match PodmachineConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            let mut config = PodmachineConfig::default();
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
    };

    let result = match cli.command {
        Commands::Create(cmd) => cmd.run(&config),
        Commands::Start(cmd) => cmd.run(HostAction::Start, &config),
        Commands::Stop(cmd) => cmd.run(HostAction::Stop, &config),
        Commands::Kill(cmd) => cmd.run(HostAction::Kill, &config),
        Commands::Restart(cmd) => cmd.run(HostAction::Restart, &config),
        Commands::Upgrade(cmd) => cmd.run(HostAction::Upgrade, &config),
        Commands::Provision(cmd) => cmd.run(HostAction::Provision, &config),
        Commands::RegenerateCerts(cmd) => cmd.run(&config),
        Commands::Rm(cmd) => cmd.run(&config),
        Commands::Ls(cmd) => cmd.run(&config),
        Commands::Status(cmd) => cmd.status(&config),
        Commands::Url(cmd) => cmd.url(&config),
        Commands::Ip(cmd) => cmd.ip(&config),
        Commands::Version(cmd) => cmd.run(&config),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber.
fn init_logging(debug: bool) {
    let default = if debug { "podmachine=debug" } else { "podmachine=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
