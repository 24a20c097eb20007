//! Sentiwatch - guardian dashboard client for monitored social accounts.

mod commands;
mod coordinator;
mod fetcher;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sentiwatch_core::{init_logging, Config, Paths};

/// Sentiwatch command-line interface.
#[derive(Parser)]
#[command(name = "sentiwatch")]
#[command(about = "Guardian dashboard client for monitored social accounts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Base directory for runtime files (store, logs, config). Defaults to ~/.sentiwatch
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with guardian credentials
    Login {
        /// Guardian username
        username: String,
    },
    /// Log out and clear the stored session
    Logout,
    /// Show session and linked-account status
    Status,
    /// Link a monitored account through the consent flow
    Link {
        /// The monitored subject's account identifier
        identifier: String,
    },
    /// Watch all linked accounts for new items
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level);

    // Load configuration
    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    match cli.command {
        Commands::Login { username } => {
            commands::login(&config, &paths, &username).await?;
        }
        Commands::Logout => {
            commands::logout(&config, &paths)?;
        }
        Commands::Status => {
            commands::status(&config, &paths).await?;
        }
        Commands::Link { identifier } => {
            commands::link(&config, &paths, &identifier).await?;
        }
        Commands::Watch => {
            commands::watch(&config, &paths).await?;
        }
    }

    Ok(())
}
