//! Store repair
//!
//! Deletes orphaned and corrupted rows, and resets queue items stuck in
//! `processing` back to `pending`. Auto-repair runs only when every
//! detected issue is warning severity; error-severity issues require an
//! explicit invocation so corrupted data is never silently discarded.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use matchline_core::domain::entity::row_id;
use matchline_core::domain::newtypes::EntityKind;
use matchline_core::ports::local_store::LocalStore;

use crate::integrity::{IntegrityChecker, IntegrityReport, STALE_PROCESSING_MINUTES};
use crate::BackupError;

/// One repair attempt on one row or queue item
#[derive(Debug, Clone, Serialize)]
pub struct RepairAction {
    /// What was repaired: `orphaned_message`, `corrupted_profile`,
    /// `stuck_sync`
    pub kind: String,
    /// The affected row or queue item id
    pub id: String,
    /// What happened (or why it failed)
    pub detail: String,
}

/// Result of a repair run
#[derive(Debug, Default, Serialize)]
pub struct RepairReport {
    pub fixed: Vec<RepairAction>,
    pub failed: Vec<RepairAction>,
}

/// Outcome of an auto-repair attempt
#[derive(Debug)]
pub enum AutoRepairOutcome {
    /// Nothing to do
    Healthy,
    /// Only warnings were found and they were repaired
    Repaired(RepairReport),
    /// Error-severity issues present; explicit repair required
    RequiresManual(IntegrityReport),
}

/// Repairs the inconsistencies the integrity checker finds
pub struct Repairer {
    store: Arc<dyn LocalStore>,
    checker: IntegrityChecker,
}

impl Repairer {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            checker: IntegrityChecker::new(store.clone()),
            store,
        }
    }

    /// Repairs everything repairable, regardless of severity
    pub async fn repair(&self, now: DateTime<Utc>) -> Result<RepairReport, BackupError> {
        let mut report = RepairReport::default();

        for message in self.checker.find_orphaned_messages().await? {
            self.delete_row(EntityKind::Message, &message, "orphaned_message", &mut report)
                .await;
        }

        for profile in self.checker.find_corrupted_profiles().await? {
            self.delete_row(EntityKind::Profile, &profile, "corrupted_profile", &mut report)
                .await;
        }

        let stuck = self.checker.find_stuck_queue_items(now).await?;
        if !stuck.is_empty() {
            self.store
                .reset_stale_processing(Duration::minutes(STALE_PROCESSING_MINUTES), now)
                .await?;
            for item in stuck {
                report.fixed.push(RepairAction {
                    kind: "stuck_sync".to_string(),
                    id: item.id.to_string(),
                    detail: "Reset stuck sync operation".to_string(),
                });
            }
        }

        info!(
            fixed = report.fixed.len(),
            failed = report.failed.len(),
            "Repair completed"
        );
        Ok(report)
    }

    /// Repairs only when every detected issue is warning severity
    pub async fn auto_repair(&self, now: DateTime<Utc>) -> Result<AutoRepairOutcome, BackupError> {
        let report = self.checker.check(now).await?;

        if report.is_healthy {
            return Ok(AutoRepairOutcome::Healthy);
        }
        if report.has_errors() {
            warn!(
                issues = report.issues.len(),
                "Integrity errors found; auto-repair requires explicit invocation"
            );
            return Ok(AutoRepairOutcome::RequiresManual(report));
        }

        let repair = self.repair(now).await?;
        Ok(AutoRepairOutcome::Repaired(repair))
    }

    /// Deletes one broken row, recording the outcome
    async fn delete_row(
        &self,
        kind: EntityKind,
        row: &Value,
        action_kind: &str,
        report: &mut RepairReport,
    ) {
        let Some(id) = row_id(row) else {
            report.failed.push(RepairAction {
                kind: action_kind.to_string(),
                id: String::new(),
                detail: "Row has no usable id".to_string(),
            });
            return;
        };

        match self.store.delete_row(kind, &id).await {
            Ok(()) => report.fixed.push(RepairAction {
                kind: action_kind.to_string(),
                id: id.to_string(),
                detail: format!("Removed {action_kind}"),
            }),
            Err(e) => report.failed.push(RepairAction {
                kind: action_kind.to_string(),
                id: id.to_string(),
                detail: e.to_string(),
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use matchline_core::domain::newtypes::EntityId;
    use matchline_core::domain::queue::{Operation, Priority, QueueStatus, SyncQueueItem};
    use matchline_store::{DatabasePool, SqliteLocalStore};
    use serde_json::json;

    async fn setup() -> (Arc<SqliteLocalStore>, Repairer, IntegrityChecker) {
        let pool = DatabasePool::in_memory().await.unwrap();
        let store = Arc::new(SqliteLocalStore::new(pool.pool().clone()));
        let repairer = Repairer::new(store.clone());
        let checker = IntegrityChecker::new(store.clone());
        (store, repairer, checker)
    }

    #[tokio::test]
    async fn test_orphaned_message_repair_restores_health() {
        let (store, repairer, checker) = setup().await;
        let now = Utc::now();

        // Healthy, then a message pointing at a deleted match.
        assert!(checker.check(now).await.unwrap().is_healthy);
        store
            .put_row(
                EntityKind::Message,
                json!({"id": "msg-1", "matchId": "deleted-match", "body": "hi"}),
            )
            .await
            .unwrap();
        assert!(!checker.check(now).await.unwrap().is_healthy);

        // Repair deletes the orphan and reports it under fixed.
        let report = repairer.repair(now).await.unwrap();
        assert_eq!(report.fixed.len(), 1);
        assert_eq!(report.fixed[0].kind, "orphaned_message");
        assert_eq!(report.fixed[0].id, "msg-1");
        assert!(report.failed.is_empty());

        assert!(store
            .get_row(EntityKind::Message, &EntityId::server("msg-1"))
            .await
            .unwrap()
            .is_none());
        assert!(checker.check(now).await.unwrap().is_healthy);
    }

    #[tokio::test]
    async fn test_auto_repair_handles_warnings() {
        let (store, repairer, _checker) = setup().await;
        store
            .put_row(
                EntityKind::Message,
                json!({"id": "msg-1", "matchId": "gone", "body": "hi"}),
            )
            .await
            .unwrap();

        let outcome = repairer.auto_repair(Utc::now()).await.unwrap();
        let AutoRepairOutcome::Repaired(report) = outcome else {
            panic!("Expected repaired outcome");
        };
        assert_eq!(report.fixed.len(), 1);
    }

    #[tokio::test]
    async fn test_auto_repair_defers_on_errors() {
        let (store, repairer, _checker) = setup().await;
        // Corrupted profile: error severity.
        store
            .put_row(EntityKind::Profile, json!({"id": "profile-1", "userId": ""}))
            .await
            .unwrap();

        let outcome = repairer.auto_repair(Utc::now()).await.unwrap();
        assert!(matches!(outcome, AutoRepairOutcome::RequiresManual(_)));

        // The corrupted row was NOT silently discarded.
        assert!(store
            .get_row(EntityKind::Profile, &EntityId::server("profile-1"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_auto_repair_healthy_store() {
        let (_store, repairer, _checker) = setup().await;
        let outcome = repairer.auto_repair(Utc::now()).await.unwrap();
        assert!(matches!(outcome, AutoRepairOutcome::Healthy));
    }

    #[tokio::test]
    async fn test_explicit_repair_removes_corrupted_profile() {
        let (store, repairer, _checker) = setup().await;
        store
            .put_row(EntityKind::Profile, json!({"id": "profile-1", "userId": ""}))
            .await
            .unwrap();

        let report = repairer.repair(Utc::now()).await.unwrap();
        assert_eq!(report.fixed.len(), 1);
        assert_eq!(report.fixed[0].kind, "corrupted_profile");
        assert!(store
            .get_row(EntityKind::Profile, &EntityId::server("profile-1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_repair_resets_stuck_claim() {
        let (store, repairer, _checker) = setup().await;
        let now = Utc::now();

        let item = SyncQueueItem::new(
            Operation::Update,
            EntityKind::Swipe,
            EntityId::server("s1"),
            json!({}),
            Priority::High,
        );
        store.enqueue(&item).await.unwrap();
        store.claim_next(now).await.unwrap().unwrap();

        let report = repairer.repair(now + Duration::minutes(6)).await.unwrap();
        assert_eq!(report.fixed.len(), 1);
        assert_eq!(report.fixed[0].kind, "stuck_sync");

        let recovered = store.get_queue_item(&item.id).await.unwrap().unwrap();
        assert_eq!(recovered.status, QueueStatus::Pending);
        assert!(recovered.last_attempt_at.is_none());
    }
}
