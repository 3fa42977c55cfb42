//! CLI utilities for detti.
//!
//! Configuration loading, default paths and result output shared by the
//! `detti` binary.

pub mod config;
pub mod logging;
pub mod output;
pub mod paths;

pub use config::{
    init_config, load_config, mask_secret, Config, ConfigError, DbConfig, LogLevel, RateLimits,
    ServerConfig,
};
pub use logging::open_log_file;
pub use output::{Output, OutputFormat};
pub use paths::Paths;
