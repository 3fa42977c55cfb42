//! CLI commands module.

mod config;
mod data;
mod serve;
mod util;

pub use config::ConfigCommand;
pub use data::DataCommand;
pub use serve::ServeCommand;

// Re-export utils for use in commands
pub(crate) use util::*;
