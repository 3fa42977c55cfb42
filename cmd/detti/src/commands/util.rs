//! Utility functions for CLI commands.

use std::io;
use std::sync::Mutex;

use serde_json::Value as Json;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use detti_cli::{load_config, open_log_file, Config, LogLevel, Output};
use detti_kv::DettiDb;

use crate::Cli;

/// Gets the global configuration.
pub fn get_config(cli: &Cli) -> anyhow::Result<Config> {
    Ok(load_config(cli.config.as_deref())?)
}

/// Builds the log filter.
///
/// `-v` forces debug, then `RUST_LOG`, then the configured level.
pub fn log_filter(verbose: bool, level: LogLevel) -> EnvFilter {
    if verbose {
        return EnvFilter::new(LogLevel::Debug.as_str());
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Installs the log subscriber: stderr plus a per-run file in the log
/// directory. A log file that cannot be opened is reported and skipped.
pub fn init_logging(cli: &Cli, cfg: &Config) {
    let opened = cfg
        .log_dir()
        .map(|dir| open_log_file(&dir, chrono::Local::now()));

    let (file_layer, file_result) = match opened {
        Some(Ok((path, file))) => (
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            Ok(Some(path)),
        ),
        Some(Err(e)) => (None, Err(e)),
        None => (None, Ok(None)),
    };

    let _ = tracing_subscriber::registry()
        .with(log_filter(cli.verbose, cfg.detti_db.log_level))
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(file_layer)
        .try_init();

    match file_result {
        Ok(Some(path)) => debug!("detti: logging to {}", path.display()),
        Ok(None) => warn!("detti: no log directory, logging to stderr only"),
        Err(e) => warn!("detti: cannot open log file: {}", e),
    }
}

/// Loads the configuration, sets up logging and opens the store.
pub fn open_db(cli: &Cli) -> anyhow::Result<(Config, DettiDb)> {
    let cfg = get_config(cli)?;
    init_logging(cli, &cfg);
    let db = DettiDb::open(cfg.db_options())?;
    Ok((cfg, db))
}

/// Returns the output settings from global flags.
pub fn output(cli: &Cli) -> Output {
    Output::from_flags(cli.json, cli.output.clone())
}

/// Parses a command line value as JSON, falling back to a plain string.
pub fn parse_input(raw: &str) -> Json {
    serde_json::from_str(raw).unwrap_or_else(|_| Json::String(raw.to_string()))
}

/// Prints success message.
pub fn print_success(msg: &str) {
    eprintln!("\x1b[32m✓\x1b[0m {}", msg);
}

/// Prints warning message.
pub fn print_warning(msg: &str) {
    eprintln!("\x1b[33m⚠\x1b[0m {}", msg);
}

/// Formats bytes to human readable string.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
