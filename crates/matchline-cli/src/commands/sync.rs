//! Sync command - run one cycle now

use std::path::Path;

use anyhow::Result;
use clap::Args;

use matchline_sync::SyncOutcome;

use crate::commands::CliContext;
use crate::output::{print_json, OutputFormat};

/// Run one pull-then-push sync cycle
#[derive(Debug, Args)]
pub struct SyncCommand {}

impl SyncCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let ctx = CliContext::open(config_path).await?;
        let engine = ctx.engine()?;

        match engine.try_sync().await? {
            SyncOutcome::Completed(summary) => {
                if format.is_json() {
                    print_json(&serde_json::json!({
                        "pulled": summary.pulled,
                        "pushed": summary.pushed,
                        "pushFailed": summary.push_failed,
                        "conflictsResolved": summary.conflicts_resolved,
                        "deferredConflicts": summary.deferred_conflicts.len(),
                        "errors": summary.errors,
                        "durationMs": summary.duration_ms,
                    }));
                } else {
                    println!(
                        "Sync completed: {} pulled, {} pushed, {} failed ({} ms)",
                        summary.pulled, summary.pushed, summary.push_failed, summary.duration_ms
                    );
                    if summary.conflicts_resolved > 0 {
                        println!("  {} conflicts resolved", summary.conflicts_resolved);
                    }
                    for conflict in &summary.deferred_conflicts {
                        println!(
                            "  conflict awaiting manual resolution: {} {}",
                            conflict.entity, conflict.entity_id
                        );
                    }
                    for error in &summary.errors {
                        println!("  error: {error}");
                    }
                }
            }
            SyncOutcome::SkippedOffline => println!("Skipped: device is offline"),
            SyncOutcome::SkippedBusy => println!("Skipped: a sync cycle is already running"),
        }

        Ok(())
    }
}
