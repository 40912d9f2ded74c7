//! Backup command - snapshot export/import and auto-backup inspection

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Subcommand};

use matchline_backup::BackupService;

use crate::commands::CliContext;
use crate::output::{format_time, print_json, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Export the whole store to a JSON file
    Export(PathArgs),
    /// Import a snapshot, replacing the whole store (all-or-nothing)
    Import(PathArgs),
    /// Show auto-backup state
    Info,
    /// Restore the store from the auto-backup side channel
    Restore,
}

#[derive(Debug, Args)]
pub struct PathArgs {
    /// Snapshot file path
    path: PathBuf,
}

impl BackupCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let ctx = CliContext::open(config_path).await?;
        let service = BackupService::new(
            ctx.store(),
            &ctx.config.backup,
            ctx.config.auto_backup_path(),
        );

        match self {
            BackupCommand::Export(args) => {
                service.export_to_file(&args.path).await?;
                println!("Exported to {}", args.path.display());
            }
            BackupCommand::Import(args) => {
                service.import_from_file(&args.path).await?;
                println!("Imported from {}", args.path.display());
            }
            BackupCommand::Info => {
                let info = service.auto_backup_info().await?;
                if format.is_json() {
                    print_json(&serde_json::json!({
                        "exists": info.exists,
                        "timestamp": info.timestamp.map(|t| t.timestamp_millis()),
                    }));
                } else if info.exists {
                    println!(
                        "Auto-backup present, taken {}",
                        format_time(info.timestamp.map(|t| t.timestamp_millis()))
                    );
                } else {
                    println!("No auto-backup found");
                }
            }
            BackupCommand::Restore => {
                if service.restore_from_auto_backup().await? {
                    println!("Restored from auto-backup");
                } else {
                    println!("No auto-backup to restore from");
                }
            }
        }

        Ok(())
    }
}
