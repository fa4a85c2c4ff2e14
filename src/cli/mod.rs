//! CLI parser and dispatch.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "kindle")]
#[command(about = "Kindle notebook annotation harvester")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config file and KINDLE_DATA_DIR)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "KINDLE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest annotations from the notebook (runs the login flow first
    /// when no usable session exists)
    Scrape {
        /// Show the browser window while scraping
        #[arg(long)]
        headed: bool,
    },

    /// Log in through a visible browser and save the session
    Login,

    /// Show store statistics
    Stats,

    /// Rewrite the columnar snapshot from the database
    Export,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
    };
    let (settings, config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Scrape { headed } => {
            commands::cmd_scrape(&settings, &config.scraper, headed).await
        }
        Commands::Login => commands::cmd_login(&settings, &config.scraper).await,
        Commands::Stats => commands::cmd_stats(&settings).await,
        Commands::Export => commands::cmd_export(&settings).await,
    }
}
