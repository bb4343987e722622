//! Driver plugins.
//!
//! Every driver family other than the builtins runs in its own process,
//! reached over a Unix socket with the protocol in `podmachine-protocol`.

mod client;
mod driver;
pub mod launcher;
mod manager;
pub mod server;

pub use client::PluginClient;
pub use driver::RpcDriver;
pub use manager::{BuiltinDriver, DriverFactory, FactoryOptions};
