//! Queue command - inspect and manage the sync queue
//!
//! Parked (failed) items are never silently dropped; this is where the
//! operator retries or discards them.

use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};

use matchline_core::domain::queue::QueueStatus;
use matchline_core::domain::newtypes::QueueItemId;

use crate::commands::CliContext;
use crate::output::{format_time, print_json, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// List queue items
    List(ListArgs),
    /// Reset a failed item back to pending for another delivery round
    Retry(ItemArgs),
    /// Permanently remove a queue item
    Discard(ItemArgs),
    /// Delete completed items
    Cleanup,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Show only failed items
    #[arg(long)]
    failed: bool,
}

#[derive(Debug, Args)]
pub struct ItemArgs {
    /// Queue item id
    id: String,
}

impl QueueCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let ctx = CliContext::open(config_path).await?;
        let store = ctx.store();

        match self {
            QueueCommand::List(args) => {
                let filter = args.failed.then_some(QueueStatus::Failed);
                let items = store.list_queue(filter).await?;

                if format.is_json() {
                    print_json(&serde_json::to_value(&items)?);
                    return Ok(());
                }

                if items.is_empty() {
                    println!("Queue is empty");
                    return Ok(());
                }
                for item in items {
                    println!(
                        "{}  {:<10} {:<9} {} {}  attempts {}/{}  next retry {}{}",
                        item.id,
                        item.status,
                        item.operation,
                        item.entity,
                        item.entity_id,
                        item.attempts,
                        item.max_attempts,
                        format_time(item.next_retry_at.map(|t| t.timestamp_millis())),
                        item.error
                            .as_deref()
                            .map(|e| format!("  [{e}]"))
                            .unwrap_or_default(),
                    );
                }
            }
            QueueCommand::Retry(args) => {
                let id: QueueItemId = args.id.parse()?;
                store.requeue_failed(&id).await?;
                println!("Item {id} requeued");
            }
            QueueCommand::Discard(args) => {
                let id: QueueItemId = args.id.parse()?;
                store.discard(&id).await?;
                println!("Item {id} discarded");
            }
            QueueCommand::Cleanup => {
                let removed = store.clear_completed().await?;
                println!("Removed {removed} completed items");
            }
        }

        Ok(())
    }
}
