use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scrolly_core::EngineConfig;

mod commands;
mod story;

#[derive(Parser)]
#[command(name = "scrolly")]
#[command(author, version, about = "Headless driver for scroll-driven stories")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ~/.config/scrolly/config.toml)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a story's scroll script in virtual time
    Simulate {
        /// Story file (TOML)
        story: PathBuf,
    },
    /// Replay a story's scroll script in real time
    Play {
        /// Story file (TOML)
        story: PathBuf,
    },
    /// Validate a story without running it
    Check {
        /// Story file (TOML)
        story: PathBuf,
    },
    /// Print the effective configuration
    Config {
        /// Write it to the default location instead
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Simulate { story } => commands::simulate::run(&story, config),
        Commands::Play { story } => commands::play::run(&story, config).await,
        Commands::Check { story } => commands::check::run(&story),
        Commands::Config { save } => commands::config::run(&config, save),
    }
}
