//! Whole-store snapshots
//!
//! A snapshot is one versioned JSON document holding every owned table.
//! Import is all-or-nothing and rejects unknown versions outright -
//! forward compatibility is explicitly not guaranteed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use matchline_core::domain::newtypes::EntityKind;
use matchline_core::ports::local_store::LocalStore;

use crate::BackupError;

/// The only backup format version this build reads or writes
pub const BACKUP_VERSION: u32 = 1;

/// A complete store snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupDocument {
    /// Format version; import rejects anything but [`BACKUP_VERSION`]
    pub version: u32,
    /// When the snapshot was taken
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Every owned table, keyed by table name
    pub stores: BTreeMap<String, Vec<Value>>,
}

/// A single-table export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityExport {
    /// Table name this export came from
    #[serde(rename = "type")]
    pub entity_type: String,
    pub version: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Row count, for quick inspection without parsing `data`
    pub count: usize,
    pub data: Vec<Value>,
}

/// Serializes every owned table into one snapshot document
pub async fn export_document(store: &dyn LocalStore) -> Result<BackupDocument, BackupError> {
    let stores = store.export_stores().await?;
    Ok(BackupDocument {
        version: BACKUP_VERSION,
        timestamp: Utc::now(),
        stores,
    })
}

/// Atomically clears and repopulates every table from a snapshot
///
/// Partial import is not permitted: the store rolls the whole operation
/// back if any table fails to load. Imported rows come back with
/// `syncStatus` reset to `synced`.
pub async fn import_document(
    store: &dyn LocalStore,
    document: BackupDocument,
) -> Result<(), BackupError> {
    if document.version != BACKUP_VERSION {
        return Err(BackupError::UnsupportedVersion(document.version));
    }

    let tables = document.stores.len();
    store.import_stores(document.stores).await?;

    info!(tables, "Snapshot imported");
    Ok(())
}

/// Exports a single table
pub async fn export_entity(
    store: &dyn LocalStore,
    kind: EntityKind,
) -> Result<EntityExport, BackupError> {
    let data = store.list_rows(kind).await?;
    Ok(EntityExport {
        entity_type: kind.table().to_string(),
        version: BACKUP_VERSION,
        timestamp: Utc::now(),
        count: data.len(),
        data,
    })
}

/// Restores a single table from a per-entity export
///
/// The export's type tag must match the requested table; rows replace the
/// table's current contents.
pub async fn restore_entity(
    store: &dyn LocalStore,
    kind: EntityKind,
    export: EntityExport,
) -> Result<usize, BackupError> {
    if export.version != BACKUP_VERSION {
        return Err(BackupError::UnsupportedVersion(export.version));
    }
    if export.entity_type != kind.table() {
        return Err(BackupError::TypeMismatch {
            expected: kind.table().to_string(),
            actual: export.entity_type,
        });
    }

    for row in store.list_rows(kind).await? {
        if let Some(id) = matchline_core::domain::entity::row_id(&row) {
            store.delete_row(kind, &id).await?;
        }
    }
    let restored = store.bulk_put(kind, export.data).await? as usize;

    info!(entity = %kind, restored, "Entity restore completed");
    Ok(restored)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use matchline_store::{DatabasePool, SqliteLocalStore};
    use serde_json::json;

    async fn setup() -> SqliteLocalStore {
        let pool = DatabasePool::in_memory().await.unwrap();
        SqliteLocalStore::new(pool.pool().clone())
    }

    #[tokio::test]
    async fn test_export_empty_store() {
        let store = setup().await;
        let document = export_document(&store).await.unwrap();

        assert_eq!(document.version, BACKUP_VERSION);
        assert_eq!(document.stores.len(), EntityKind::ALL.len());
        assert!(document.stores.values().all(Vec::is_empty));
    }

    #[tokio::test]
    async fn test_import_rejects_unknown_version() {
        let store = setup().await;
        let document = BackupDocument {
            version: 2,
            timestamp: Utc::now(),
            stores: BTreeMap::new(),
        };

        let err = import_document(&store, document).await.unwrap_err();
        assert!(matches!(err, BackupError::UnsupportedVersion(2)));
    }

    #[tokio::test]
    async fn test_round_trip_resets_sync_status() {
        let store = setup().await;
        store
            .put_row(
                EntityKind::Profile,
                json!({"id": "profile-1", "userId": "u1", "syncStatus": "pending"}),
            )
            .await
            .unwrap();

        let document = export_document(&store).await.unwrap();
        store.clear_all().await.unwrap();
        import_document(&store, document).await.unwrap();

        let row = store
            .get_row(
                EntityKind::Profile,
                &"profile-1".parse().unwrap(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["userId"], "u1");
        assert_eq!(row["syncStatus"], "synced");
    }

    #[tokio::test]
    async fn test_entity_export_restore() {
        let store = setup().await;
        store
            .put_row(EntityKind::Job, json!({"id": "job-1", "title": "old"}))
            .await
            .unwrap();

        let export = export_entity(&store, EntityKind::Job).await.unwrap();
        assert_eq!(export.entity_type, "jobs");
        assert_eq!(export.count, 1);

        // Overwrite then restore.
        store
            .put_row(EntityKind::Job, json!({"id": "job-2", "title": "new"}))
            .await
            .unwrap();
        let restored = restore_entity(&store, EntityKind::Job, export).await.unwrap();
        assert_eq!(restored, 1);

        let rows = store.list_rows(EntityKind::Job).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "job-1");
    }

    #[tokio::test]
    async fn test_restore_entity_rejects_type_mismatch() {
        let store = setup().await;
        let export = export_entity(&store, EntityKind::Job).await.unwrap();

        let err = restore_entity(&store, EntityKind::Profile, export)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::TypeMismatch { .. }));
    }
}
