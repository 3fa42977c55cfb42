//! Configuration management commands.

use clap::{Args, Subcommand};

use detti_cli::{init_config, mask_secret};

use super::{get_config, output, print_success};
use crate::Cli;

/// Manage the configuration file.
///
/// Configuration is stored in ~/.detti/config.yaml
#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Display the current configuration
    Show,
}

impl ConfigCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            ConfigSubcommand::Init { force } => {
                let cfg = init_config(cli.config.as_deref(), *force)?;
                print_success(&format!("Config written to {}", cfg.path().display()));
                println!("Database: {}", cfg.detti_db.path_of_db.display());
                Ok(())
            }

            ConfigSubcommand::Show => {
                let mut cfg = get_config(cli)?;
                if !cfg.server.password.is_empty() {
                    cfg.server.password = mask_secret(&cfg.server.password);
                }
                if !cfg.server.token_secret.is_empty() {
                    cfg.server.token_secret = mask_secret(&cfg.server.token_secret);
                }
                output(cli).write(&cfg)
            }
        }
    }
}
