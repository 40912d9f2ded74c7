//! Store integrity checking
//!
//! Scans for the three failure shapes the sync subsystem can accumulate:
//! messages whose match row is gone (orphaned), rows missing identifying
//! fields (corrupted), and queue items stuck in `processing` past the
//! staleness threshold (a crashed sync cycle).

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;

use matchline_core::domain::entity::Profile;
use matchline_core::domain::newtypes::EntityKind;
use matchline_core::domain::queue::QueueStatus;
use matchline_core::ports::local_store::LocalStore;

use crate::BackupError;

/// Queue claims older than this count as a crashed sync cycle
pub const STALE_PROCESSING_MINUTES: i64 = 5;

/// How bad an integrity issue is
///
/// Auto-repair only proceeds when every detected issue is `Warning`; any
/// `Error` requires an explicit repair invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// One detected inconsistency
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityIssue {
    /// Stable issue kind: `orphaned_messages`, `corrupted_profiles`,
    /// `stuck_sync`
    pub kind: String,
    pub severity: Severity,
    pub count: usize,
    pub message: String,
}

/// Result of a full integrity scan
#[derive(Debug, Serialize)]
pub struct IntegrityReport {
    pub is_healthy: bool,
    pub issues: Vec<IntegrityIssue>,
    /// Row counts per owned table at scan time
    pub stats: BTreeMap<String, u64>,
}

impl IntegrityReport {
    /// Returns true if any issue is `Error` severity
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }
}

/// Scans the store for inconsistencies
pub struct IntegrityChecker {
    store: Arc<dyn LocalStore>,
}

impl IntegrityChecker {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Runs the full scan
    pub async fn check(&self, now: DateTime<Utc>) -> Result<IntegrityReport, BackupError> {
        let mut issues = Vec::new();

        let orphaned = self.find_orphaned_messages().await?;
        if !orphaned.is_empty() {
            issues.push(IntegrityIssue {
                kind: "orphaned_messages".to_string(),
                severity: Severity::Warning,
                count: orphaned.len(),
                message: format!(
                    "Found {} messages without matching conversations",
                    orphaned.len()
                ),
            });
        }

        let corrupted = self.find_corrupted_profiles().await?;
        if !corrupted.is_empty() {
            issues.push(IntegrityIssue {
                kind: "corrupted_profiles".to_string(),
                severity: Severity::Error,
                count: corrupted.len(),
                message: format!("Found {} corrupted profiles", corrupted.len()),
            });
        }

        let stuck = self.find_stuck_queue_items(now).await?;
        if !stuck.is_empty() {
            issues.push(IntegrityIssue {
                kind: "stuck_sync".to_string(),
                severity: Severity::Warning,
                count: stuck.len(),
                message: format!("Found {} stuck sync operations", stuck.len()),
            });
        }

        let stats = self.store.table_counts().await?;

        Ok(IntegrityReport {
            is_healthy: issues.is_empty(),
            issues,
            stats,
        })
    }

    /// Messages whose `matchId` has no corresponding match row
    pub(crate) async fn find_orphaned_messages(&self) -> Result<Vec<Value>, BackupError> {
        let match_ids: HashSet<String> = self
            .store
            .list_rows(EntityKind::JobMatch)
            .await?
            .iter()
            .filter_map(|m| m.get("id").and_then(Value::as_str).map(str::to_string))
            .collect();

        let orphaned = self
            .store
            .list_rows(EntityKind::Message)
            .await?
            .into_iter()
            .filter(|msg| {
                msg.get("matchId")
                    .and_then(Value::as_str)
                    .map_or(true, |match_id| !match_ids.contains(match_id))
            })
            .collect();
        Ok(orphaned)
    }

    /// Profiles missing their identifying fields
    ///
    /// A row that no longer deserializes into [`Profile`] (bad id, missing
    /// required fields) is corrupted, as is one with an empty `userId`.
    pub(crate) async fn find_corrupted_profiles(&self) -> Result<Vec<Value>, BackupError> {
        let corrupted = self
            .store
            .list_rows(EntityKind::Profile)
            .await?
            .into_iter()
            .filter(|doc| {
                match serde_json::from_value::<Profile>(doc.clone()) {
                    Ok(profile) => profile.user_id.is_empty(),
                    Err(_) => true,
                }
            })
            .collect();
        Ok(corrupted)
    }

    /// Queue items claimed longer ago than the staleness threshold
    pub(crate) async fn find_stuck_queue_items(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<matchline_core::domain::queue::SyncQueueItem>, BackupError> {
        let cutoff = now - Duration::minutes(STALE_PROCESSING_MINUTES);
        let stuck = self
            .store
            .list_queue(Some(QueueStatus::Processing))
            .await?
            .into_iter()
            .filter(|item| item.last_attempt_at.map_or(true, |at| at < cutoff))
            .collect();
        Ok(stuck)
    }
}

// ============================================================================
// Tests
// ============================================================================
