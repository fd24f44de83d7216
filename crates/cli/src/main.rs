//! polibrief CLI, the main entry point.
//!
//! Commands:
//! - `serve`          Start the HTTP API server
//! - `research`       Research one politician and print the report
//! - `cleanup-chats`  Purge expired temporary chats
//! - `onboard`        Write a starter config file
//! - `status`         Show the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "polibrief",
    about = "polibrief: politician research reports and Q&A chat",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.polibrief/config.toml)
    #[arg(short, long, global = true, env = "POLIBRIEF_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Research a politician and print the report as JSON
    Research {
        /// Politician name
        name: String,

        /// Office held or sought
        #[arg(short, long, default_value = "")]
        position: String,

        /// Serve a stored report younger than this many days
        #[arg(long)]
        max_age: Option<i64>,

        /// Ignore any stored report
        #[arg(short, long)]
        force: bool,
    },

    /// Delete temporary chats older than the retention window
    CleanupChats {
        /// Override chat.temporary_ttl_hours
        #[arg(long)]
        hours: Option<i64>,
    },

    /// Initialize configuration
    Onboard,

    /// Show configuration status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Research {
            name,
            position,
            max_age,
            force,
        } => commands::research::run(config_path, &name, &position, max_age, force).await?,
        Commands::CleanupChats { hours } => commands::cleanup::run(config_path, hours).await?,
        Commands::Onboard => commands::onboard::run(config_path).await?,
        Commands::Status => commands::status::run(config_path).await?,
    }

    Ok(())
}
