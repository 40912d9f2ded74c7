//! Conflict resolution executor
//!
//! Applies the strategy chosen by policy and writes the winning version
//! back to the local store with `syncStatus=synced`. Resolved rows are NOT
//! re-queued: merging happens only against already-pulled server state, so
//! pushing the result again would just echo it back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use matchline_core::domain::conflict::{Conflict, ConflictStrategy};
use matchline_core::domain::entity::row_id;
use matchline_core::ports::local_store::LocalStore;

use crate::merge::merge_fields;
use crate::ConflictError;

/// Outcome of resolving one conflict
#[derive(Debug)]
pub enum Resolution {
    /// A winning version was written back to the store
    Applied(Conflict),
    /// Both versions were retained as independent rows
    KeptBoth,
    /// Manual strategy: surfaced to the caller, nothing auto-picked
    Deferred(Conflict),
}

/// Applies resolution strategies against the local store
pub struct ConflictResolver {
    store: Arc<dyn LocalStore>,
}

impl ConflictResolver {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Resolves one conflict according to its strategy
    pub async fn resolve(
        &self,
        conflict: Conflict,
        now: DateTime<Utc>,
    ) -> Result<Resolution, ConflictError> {
        if conflict.is_resolved() {
            return Err(ConflictError::AlreadyResolved(conflict.id.to_string()));
        }

        debug!(
            conflict_id = %conflict.id,
            entity = %conflict.entity,
            entity_id = %conflict.entity_id,
            strategy = %conflict.strategy,
            "Resolving conflict"
        );

        let winner = match conflict.strategy {
            ConflictStrategy::LocalWins => conflict.local_version.clone(),
            ConflictStrategy::ServerWins => conflict.server_version.clone(),
            ConflictStrategy::MergeFields => merge_fields(
                &conflict.local_version,
                &conflict.server_version,
                conflict.local_updated_at,
                conflict.server_updated_at,
            ),
            ConflictStrategy::KeepBoth => {
                return self.keep_both(&conflict, now).await;
            }
            ConflictStrategy::Manual => {
                warn!(
                    conflict_id = %conflict.id,
                    entity_id = %conflict.entity_id,
                    "Manual conflict resolution required"
                );
                return Ok(Resolution::Deferred(conflict));
            }
        };

        self.write_back(conflict.entity, winner.clone(), now).await?;

        info!(
            conflict_id = %conflict.id,
            entity_id = %conflict.entity_id,
            strategy = %conflict.strategy,
            "Conflict resolved"
        );
        Ok(Resolution::Applied(conflict.resolve(winner, now)))
    }

    /// Append-only entities: both versions survive as independent rows
    ///
    /// When the server row carries a different id it is stored alongside
    /// the local one; an identical id means the "conflict" was the same
    /// insert echoed back, and the local row simply stands.
    async fn keep_both(
        &self,
        conflict: &Conflict,
        now: DateTime<Utc>,
    ) -> Result<Resolution, ConflictError> {
        let local_id = row_id(&conflict.local_version);
        let server_id = row_id(&conflict.server_version);

        if server_id.is_some() && server_id != local_id {
            self.write_back(conflict.entity, conflict.server_version.clone(), now)
                .await?;
        }

        debug!(
            conflict_id = %conflict.id,
            entity_id = %conflict.entity_id,
            "Kept both versions"
        );
        Ok(Resolution::KeptBoth)
    }

    /// Writes the winning document back, marked as in agreement
    async fn write_back(
        &self,
        kind: matchline_core::domain::newtypes::EntityKind,
        mut doc: Value,
        now: DateTime<Utc>,
    ) -> Result<(), ConflictError> {
        let obj = doc
            .as_object_mut()
            .ok_or_else(|| ConflictError::MalformedVersion("resolved version is not an object".into()))?;
        obj.insert("syncStatus".to_string(), Value::from("synced"));
        obj.insert(
            "lastSyncedAt".to_string(),
            Value::from(now.timestamp_millis()),
        );

        self.store
            .bulk_put(kind, vec![doc])
            .await
            .map_err(|e| ConflictError::ResolutionFailed(format!("write back: {e}")))?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use matchline_core::domain::newtypes::{EntityId, EntityKind};
    use matchline_store::{DatabasePool, SqliteLocalStore};
    use serde_json::json;

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    async fn setup() -> (Arc<SqliteLocalStore>, ConflictResolver) {
        let pool = DatabasePool::in_memory().await.unwrap();
        let store = Arc::new(SqliteLocalStore::new(pool.pool().clone()));
        let resolver = ConflictResolver::new(store.clone());
        (store, resolver)
    }

    fn profile_conflict(strategy: ConflictStrategy) -> Conflict {
        Conflict::new(
            EntityKind::Profile,
            EntityId::server("profile-1"),
            json!({"id": "profile-1", "userId": "u1", "bio": "X", "updatedAt": 10}),
            json!({"id": "profile-1", "userId": "u1", "bio": "Y", "updatedAt": 15}),
            ts(18), // queued write, newer than the server version
            ts(15),
            strategy,
        )
    }

    #[tokio::test]
    async fn test_merge_fields_keeps_offline_edit() {
        let (store, resolver) = setup().await;

        let resolution = resolver
            .resolve(profile_conflict(ConflictStrategy::MergeFields), ts(20))
            .await
            .unwrap();

        let Resolution::Applied(resolved) = resolution else {
            panic!("Expected applied resolution");
        };
        assert!(resolved.is_resolved());
        assert_eq!(resolved.resolved_version.as_ref().unwrap()["bio"], "X");

        // Written back as synced, not re-queued.
        let row = store
            .get_row(EntityKind::Profile, &EntityId::server("profile-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["bio"], "X");
        assert_eq!(row["syncStatus"], "synced");
        assert!(!store
            .has_pending_mutation(EntityKind::Profile, &EntityId::server("profile-1"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_server_wins_writes_server_version() {
        let (store, resolver) = setup().await;

        resolver
            .resolve(profile_conflict(ConflictStrategy::ServerWins), ts(20))
            .await
            .unwrap();

        let row = store
            .get_row(EntityKind::Profile, &EntityId::server("profile-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["bio"], "Y");
    }

    #[tokio::test]
    async fn test_local_wins_writes_local_version() {
        let (store, resolver) = setup().await;

        resolver
            .resolve(profile_conflict(ConflictStrategy::LocalWins), ts(20))
            .await
            .unwrap();

        let row = store
            .get_row(EntityKind::Profile, &EntityId::server("profile-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["bio"], "X");
    }

    #[tokio::test]
    async fn test_keep_both_retains_two_message_rows() {
        let (store, resolver) = setup().await;

        // The local message was written before the pull arrived.
        store
            .put_row(
                EntityKind::Message,
                json!({
                    "id": "local:9d3f3c1e-6f0a-4bfa-bb0a-000000000001",
                    "matchId": "match-1",
                    "body": "mine",
                }),
            )
            .await
            .unwrap();

        let conflict = Conflict::new(
            EntityKind::Message,
            "local:9d3f3c1e-6f0a-4bfa-bb0a-000000000001".parse().unwrap(),
            json!({
                "id": "local:9d3f3c1e-6f0a-4bfa-bb0a-000000000001",
                "matchId": "match-1",
                "body": "mine",
            }),
            json!({"id": "msg-srv-2", "matchId": "match-1", "body": "theirs", "updatedAt": 15}),
            ts(18),
            ts(15),
            ConflictStrategy::KeepBoth,
        );

        let resolution = resolver.resolve(conflict, ts(20)).await.unwrap();
        assert!(matches!(resolution, Resolution::KeptBoth));

        let rows = store.list_rows(EntityKind::Message).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_manual_is_deferred_untouched() {
        let (store, resolver) = setup().await;

        let resolution = resolver
            .resolve(profile_conflict(ConflictStrategy::Manual), ts(20))
            .await
            .unwrap();

        let Resolution::Deferred(conflict) = resolution else {
            panic!("Expected deferred resolution");
        };
        assert!(!conflict.is_resolved());

        // Nothing was written.
        assert!(store
            .get_row(EntityKind::Profile, &EntityId::server("profile-1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_already_resolved_rejected() {
        let (_store, resolver) = setup().await;

        let conflict = profile_conflict(ConflictStrategy::LocalWins)
            .resolve(json!({"bio": "X"}), ts(19));
        let err = resolver.resolve(conflict, ts(20)).await.unwrap_err();
        assert!(matches!(err, ConflictError::AlreadyResolved(_)));
    }
}
