use clap::{Parser, Subcommand};
use morel_core::Manager;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;
mod config;

use commands::{ConfigCommand, SampleCommand, SyncCommand};
use config::Config;

#[derive(Parser)]
#[command(name = "morel")]
#[command(version)]
#[command(about = "Record survey samples offline and sync them to the server", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage samples
    Sample(SampleCommand),

    /// Send pending samples and deletions to the server
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "morel=warn,morel_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn open_manager(config: &Config) -> Result<Manager, Box<dyn std::error::Error>> {
    tracing::debug!(
        "Opening {} storage for survey {}",
        config.storage.value,
        config.survey_id.value
    );
    let manager = Manager::new(config.manager_options())?;
    manager.ready().await?;
    Ok(manager)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Sample(cmd)) => {
            let manager = open_manager(&config).await?;
            cmd.run(&manager).await?;
        }
        Some(Commands::Sync(cmd)) => {
            let manager = open_manager(&config).await?;
            cmd.run(&manager).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
