//! CrossChat command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CrossChat - cross-community message relay
#[derive(Parser)]
#[command(name = "crosschat")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "CROSSCHAT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the platform and relay messages
    Serve,

    /// Manage channel registrations
    Channels(commands::channels::ChannelsArgs),

    /// Show the delivery records of a relayed message
    Deliveries(commands::deliveries::DeliveriesArgs),

    /// Delete every delivered copy of a relayed message
    Retract(commands::retract::RetractArgs),

    /// Broadcast an announcement or system alert to every active channel
    Announce(commands::announce::AnnounceArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Run diagnostics
    Doctor,

    /// Show version information
    Version,
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve => commands::serve::run(config_path).await,
        Commands::Channels(args) => commands::channels::run(args, config_path).await,
        Commands::Deliveries(args) => commands::deliveries::run(args, config_path).await,
        Commands::Retract(args) => commands::retract::run(args, config_path).await,
        Commands::Announce(args) => commands::announce::run(args, config_path).await,
        Commands::Config(args) => commands::config::run(args, config_path).await,
        Commands::Doctor => commands::doctor::run(config_path).await,
        Commands::Version => {
            println!("crosschat {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
