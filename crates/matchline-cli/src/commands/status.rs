//! Status command - display synchronization status

use std::path::Path;

use anyhow::Result;
use clap::Args;

use crate::commands::CliContext;
use crate::output::{format_time, print_json, OutputFormat};

/// Show pending/failed counts, last sync times, and table sizes
#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let ctx = CliContext::open(config_path).await?;
        let engine = ctx.engine()?;

        let status = engine.status().await?;
        let counts = ctx.store().table_counts().await?;

        if format.is_json() {
            let mut doc = serde_json::to_value(&status)?;
            doc["tables"] = serde_json::to_value(&counts)?;
            print_json(&doc);
            return Ok(());
        }

        println!("Sync status");
        println!(
            "  last sync:            {}",
            format_time(status.last_sync_at.map(|t| t.timestamp_millis()))
        );
        println!(
            "  last successful sync: {}",
            format_time(status.last_successful_sync_at.map(|t| t.timestamp_millis()))
        );
        println!("  pending items:        {}", status.pending);
        println!("  failed items:         {}", status.failed);
        if status.failed > 0 {
            println!("  (use 'matchline queue list --failed' to inspect)");
        }

        println!("Tables");
        for (table, count) in &counts {
            println!("  {table:<14} {count}");
        }

        Ok(())
    }
}
