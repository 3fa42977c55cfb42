//! detti - A lightweight JSON-file backed key-value store.

use clap::{Parser, Subcommand};

mod auth;
mod commands;
mod limiter;
mod server;

use commands::{ConfigCommand, DataCommand, ServeCommand};

/// detti - A lightweight JSON-file backed key-value store.
///
/// Values are strings, integers, floats or lists, kept in memory and written
/// back to a single JSON file after every change. Use the subcommands to work
/// on the database directly, or `serve` to expose it over HTTP.
///
/// Configuration is stored in ~/.detti/config.yaml.
#[derive(Parser)]
#[command(name = "detti")]
#[command(about = "Lightweight JSON-file backed key-value store")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.detti/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage configuration
    Config(ConfigCommand),
    /// Run the HTTP server
    Serve(ServeCommand),
    #[command(flatten)]
    Data(DataCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Config(cmd) => cmd.run(&cli),
        Commands::Serve(cmd) => cmd.run(&cli).await,
        Commands::Data(cmd) => cmd.run(&cli),
    }
}
