//! Matchline CLI - Operator interface for the sync subsystem
//!
//! Provides commands for:
//! - Triggering a manual sync cycle
//! - Viewing sync status (pending/failed counts, last sync times)
//! - Managing parked queue items (retry, discard)
//! - Backup export/import and auto-backup inspection
//! - Integrity checking and repair

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    backup::BackupCommand, doctor::DoctorCommand, queue::QueueCommand, status::StatusCommand,
    sync::SyncCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "matchline", version, about = "Offline-first sync engine for Matchline")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one sync cycle now
    Sync(SyncCommand),
    /// Show synchronization status
    Status(StatusCommand),
    /// Inspect and manage the sync queue
    #[command(subcommand)]
    Queue(QueueCommand),
    /// Export, import, and inspect backups
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Check store integrity and repair issues
    Doctor(DoctorCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let format = OutputFormat::from_flag(cli.json);
    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(matchline_core::config::Config::default_path);

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(&config_path, format).await,
        Commands::Status(cmd) => cmd.execute(&config_path, format).await,
        Commands::Queue(cmd) => cmd.execute(&config_path, format).await,
        Commands::Backup(cmd) => cmd.execute(&config_path, format).await,
        Commands::Doctor(cmd) => cmd.execute(&config_path, format).await,
    }
}
