//! File-based backup service
//!
//! Wraps the snapshot module with file I/O: operator-driven export/import
//! plus the size-bounded auto-backup side channel. Auto-backup snapshots
//! only run while the store is small enough (default 1000 rows) so the
//! side channel never grows without bound.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use matchline_core::config::BackupConfig;
use matchline_core::ports::local_store::{LocalStore, META_AUTO_BACKUP_AT};

use crate::snapshot::{export_document, import_document, BackupDocument};
use crate::BackupError;

/// Information about the auto-backup side channel
#[derive(Debug, Clone)]
pub struct AutoBackupInfo {
    pub exists: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Operator-facing backup operations over one store
pub struct BackupService {
    store: Arc<dyn LocalStore>,
    /// Auto-backup side-channel file
    auto_path: PathBuf,
    /// Auto-backup is skipped above this many rows
    auto_row_limit: u64,
    /// Seconds between auto-backup attempts
    auto_interval_secs: u64,
}

impl BackupService {
    /// Creates a service from the backup configuration section
    pub fn new(store: Arc<dyn LocalStore>, config: &BackupConfig, auto_path: PathBuf) -> Self {
        Self {
            store,
            auto_path,
            auto_row_limit: config.auto_row_limit,
            auto_interval_secs: config.auto_interval_secs,
        }
    }

    /// Exports the whole store to a JSON file
    pub async fn export_to_file(&self, path: &Path) -> Result<(), BackupError> {
        let document = export_document(self.store.as_ref()).await?;
        write_document(path, &document)?;
        info!(path = %path.display(), "Store exported");
        Ok(())
    }

    /// Imports the whole store from a JSON file (all-or-nothing)
    pub async fn import_from_file(&self, path: &Path) -> Result<(), BackupError> {
        let document = read_document(path)?;
        import_document(self.store.as_ref(), document).await?;
        info!(path = %path.display(), "Store imported");
        Ok(())
    }

    /// Takes one auto-backup snapshot if the store is small enough
    ///
    /// Returns true when a snapshot was written.
    pub async fn auto_backup(&self, now: DateTime<Utc>) -> Result<bool, BackupError> {
        let total = self.total_rows().await?;
        if total > self.auto_row_limit {
            debug!(
                total,
                limit = self.auto_row_limit,
                "Store too large for auto-backup"
            );
            return Ok(false);
        }

        let document = export_document(self.store.as_ref()).await?;
        write_document(&self.auto_path, &document)?;
        self.store
            .set_meta(META_AUTO_BACKUP_AT, Value::from(now.timestamp_millis()), now)
            .await?;

        info!(path = %self.auto_path.display(), total, "Auto-backup created");
        Ok(true)
    }

    /// Restores the store from the auto-backup side channel
    ///
    /// Returns false when no auto-backup exists.
    pub async fn restore_from_auto_backup(&self) -> Result<bool, BackupError> {
        if !self.auto_path.exists() {
            debug!("No auto-backup found");
            return Ok(false);
        }
        let document = read_document(&self.auto_path)?;
        import_document(self.store.as_ref(), document).await?;
        info!("Restored from auto-backup");
        Ok(true)
    }

    /// Reports whether an auto-backup exists and when it was taken
    pub async fn auto_backup_info(&self) -> Result<AutoBackupInfo, BackupError> {
        let timestamp = self
            .store
            .get_meta(META_AUTO_BACKUP_AT)
            .await?
            .and_then(|v| v.as_i64())
            .and_then(DateTime::<Utc>::from_timestamp_millis);
        Ok(AutoBackupInfo {
            exists: self.auto_path.exists(),
            timestamp,
        })
    }

    /// Removes the auto-backup side channel
    pub fn delete_auto_backup(&self) -> Result<(), BackupError> {
        if self.auto_path.exists() {
            std::fs::remove_file(&self.auto_path)?;
            info!("Auto-backup deleted");
        }
        Ok(())
    }

    /// Periodic auto-backup task
    ///
    /// Takes an initial snapshot, then one per interval until cancelled.
    pub async fn run_auto_backup_loop(&self, shutdown: CancellationToken) {
        let interval = std::time::Duration::from_secs(self.auto_interval_secs);
        info!(interval_secs = self.auto_interval_secs, "Auto-backup task starting");

        let mut timer = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = self.auto_backup(Utc::now()).await {
                        warn!(error = %e, "Auto-backup failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Auto-backup task stopping");
                    break;
                }
            }
        }
    }

    /// Total rows across the owned tables and the queue
    async fn total_rows(&self) -> Result<u64, BackupError> {
        let tables: u64 = self.store.table_counts().await?.values().sum();
        let queue = self.store.queue_counts().await?.total();
        Ok(tables + queue)
    }
}

fn write_document(path: &Path, document: &BackupDocument) -> Result<(), BackupError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_string_pretty(document)
        .map_err(|e| BackupError::Malformed(e.to_string()))?;
    std::fs::write(path, raw)?;
    Ok(())
}

fn read_document(path: &Path) -> Result<BackupDocument, BackupError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| BackupError::Malformed(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
