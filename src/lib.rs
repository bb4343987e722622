//! podmachine - create and manage machines running a container engine.
//!
//! Machines are controlled through [`driver::Driver`] implementations that
//! live either in this process or in separate plugin processes. Once a
//! machine answers on its command channel, a [`provision::Provisioner`]
//! chosen from its `/etc/os-release` installs and configures the engine.
//!
//! The main entry points are [`api::Client`] for whole-host operations
//! and [`host::Host`] for single lifecycle verbs.

#![warn(missing_docs)]

pub mod api;
pub mod auth;
pub mod batch;
pub mod cert;
pub mod config;
pub mod context;
pub mod driver;
pub mod engine;
pub mod error;
pub mod host;
pub mod plugin;
pub mod provision;
pub mod ssh;
pub mod state;
pub mod store;
pub mod wait;

pub use api::Client;
pub use context::Context;
pub use error::{Error, Result};
pub use host::Host;
pub use state::MachineState;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
