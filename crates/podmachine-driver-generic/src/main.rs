//! podmachine driver plugin for existing machines reachable over SSH.
//!
//! Started by podmachine with `PODMACHINE_PLUGIN_SOCKET` set; serves one
//! connection and exits when it closes.

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod generic;

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("podmachine=info,podmachine_driver_generic=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting generic driver plugin");

    if let Err(e) = podmachine::plugin::server::serve(generic::DRIVER_NAME, generic::GenericDriver::from_raw) {
        error!(error = %e, "plugin failed");
        std::process::exit(1);
    }
}
