//! Porthole CLI
//!
//! Command-line interface for Porthole - inspect and follow the local
//! mirror of a package server's state tree.

use anyhow::Result;
use clap::{Parser, Subcommand};

use porthole_core::Config;

mod commands;

#[derive(Parser)]
#[command(name = "porthole")]
#[command(about = "Porthole - synced local mirror of a package server")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show package statuses from the last synced snapshot
    Status,
    /// Connect to the patch feed and follow a subtree
    Watch {
        /// Tree path to follow, e.g. /package-data/bitcoind
        #[arg(default_value = "")]
        path: String,
    },
    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Status => commands::status::show(&config, cli.json),
        Commands::Watch { path } => commands::watch::run(&config, &path).await,
        Commands::Config => commands::config::show(&config, cli.json),
    }
}
