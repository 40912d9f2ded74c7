//! SQLite implementation of the LocalStore port
//!
//! Rows are stored as JSON documents in a `doc` column with the columns the
//! engine filters on (timestamps, sync status, `match_id` foreign keys)
//! lifted out and indexed. All multi-step writes run inside SQL
//! transactions; the entity-write-plus-enqueue path and the snapshot import
//! are all-or-nothing.
//!
//! ## Type Mapping
//!
//! | Domain Type      | SQL Type | Strategy                                |
//! |------------------|----------|-----------------------------------------|
//! | EntityId         | TEXT     | `local:<uuid>` / raw server string      |
//! | QueueItemId      | TEXT     | UUID string                             |
//! | DateTime<Utc>    | INTEGER  | unix milliseconds                       |
//! | SyncStatus et al | TEXT     | snake_case names via `FromStr`/`as_str` |
//! | row / payload    | TEXT     | serde_json document                     |

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use matchline_core::domain::{
    entity::SyncStatus,
    newtypes::{EntityId, EntityKind, QueueItemId},
    queue::{Operation, Priority, QueueStatus, SyncQueueItem},
};
use matchline_core::ports::local_store::{LocalStore, QueueCounts};

use crate::StoreError;

/// SQL fragment ranking priorities for the claim order
const PRIORITY_RANK: &str =
    "CASE priority WHEN 'critical' THEN 0 WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END";

/// SQLite-based implementation of the local store port
///
/// All operations go through a connection pool; the same database file is
/// shared with the background agent, relying on WAL mode plus the busy
/// timeout for cross-process access.
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    /// Creates a new store backed by the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Document helpers
// ============================================================================

/// Indexed columns extracted from a row document
struct DocColumns {
    id: String,
    match_id: Option<String>,
    created_at: i64,
    updated_at: i64,
    last_synced_at: Option<i64>,
    sync_status: String,
}

/// Returns true if the table carries a lifted `match_id` column
fn has_match_id(kind: EntityKind) -> bool {
    matches!(kind, EntityKind::Message | EntityKind::Conversation)
}

/// Fills missing `createdAt`/`updatedAt` stamps on a document
///
/// Insert-hook semantics: stamps are only written when absent, so server
/// timestamps survive the pull path untouched.
fn fill_missing_stamps(doc: &mut Value, now_ms: i64) {
    if let Some(obj) = doc.as_object_mut() {
        obj.entry("createdAt".to_string())
            .or_insert_with(|| Value::from(now_ms));
        obj.entry("updatedAt".to_string())
            .or_insert_with(|| Value::from(now_ms));
    }
}

/// Extracts the indexed columns from a row document
fn doc_columns(kind: EntityKind, doc: &Value) -> Result<DocColumns, StoreError> {
    let id = doc
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::MissingId(format!("{kind} row without id")))?
        .to_string();

    let match_id = if has_match_id(kind) {
        Some(
            doc.get("matchId")
                .and_then(Value::as_str)
                .ok_or_else(|| StoreError::MissingId(format!("{kind} row {id} without matchId")))?
                .to_string(),
        )
    } else {
        None
    };

    let created_at = doc.get("createdAt").and_then(Value::as_i64).unwrap_or(0);
    let updated_at = doc.get("updatedAt").and_then(Value::as_i64).unwrap_or(0);
    let last_synced_at = doc.get("lastSyncedAt").and_then(Value::as_i64);
    let sync_status = doc
        .get("syncStatus")
        .and_then(Value::as_str)
        .unwrap_or("pending")
        .to_string();

    Ok(DocColumns {
        id,
        match_id,
        created_at,
        updated_at,
        last_synced_at,
        sync_status,
    })
}

/// Parses a `doc` column back into a JSON document
fn parse_doc(raw: &str) -> Result<Value, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization(format!("Invalid doc: {e}")))
}

/// Reconstructs a queue item from a database row
fn queue_item_from_row(row: &SqliteRow) -> Result<SyncQueueItem, StoreError> {
    let id: String = row.get("id");
    let operation: String = row.get("operation");
    let entity: String = row.get("entity");
    let entity_id: String = row.get("entity_id");
    let payload: String = row.get("payload");
    let priority: String = row.get("priority");
    let attempts: i64 = row.get("attempts");
    let max_attempts: i64 = row.get("max_attempts");
    let created_at: i64 = row.get("created_at");
    let last_attempt_at: Option<i64> = row.get("last_attempt_at");
    let next_retry_at: Option<i64> = row.get("next_retry_at");
    let status: String = row.get("status");
    let error: Option<String> = row.get("error");

    let to_serialization_err =
        |field: &str, detail: String| StoreError::Serialization(format!("{field}: {detail}"));

    Ok(SyncQueueItem {
        id: id
            .parse()
            .map_err(|e| to_serialization_err("queue id", format!("{e}")))?,
        operation: operation
            .parse::<Operation>()
            .map_err(|e| to_serialization_err("operation", format!("{e}")))?,
        entity: entity
            .parse::<EntityKind>()
            .map_err(|e| to_serialization_err("entity", format!("{e}")))?,
        entity_id: entity_id
            .parse::<EntityId>()
            .map_err(|e| to_serialization_err("entity_id", format!("{e}")))?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| to_serialization_err("payload", format!("{e}")))?,
        priority: priority
            .parse::<Priority>()
            .map_err(|e| to_serialization_err("priority", format!("{e}")))?,
        attempts: attempts as u32,
        max_attempts: max_attempts as u32,
        created_at: millis_to_datetime(created_at)?,
        last_attempt_at: last_attempt_at.map(millis_to_datetime).transpose()?,
        next_retry_at: next_retry_at.map(millis_to_datetime).transpose()?,
        status: status
            .parse::<QueueStatus>()
            .map_err(|e| to_serialization_err("status", format!("{e}")))?,
        error,
    })
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Serialization(format!("Timestamp out of range: {ms}")))
}

// ============================================================================
// Internal SQL helpers
// ============================================================================

impl SqliteLocalStore {
    /// Upserts a document into an entity table within a transaction
    async fn upsert_doc(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        kind: EntityKind,
        doc: &Value,
    ) -> Result<(), StoreError> {
        let cols = doc_columns(kind, doc)?;
        let raw = doc.to_string();
        let table = kind.table();

        if has_match_id(kind) {
            let sql = format!(
                "INSERT INTO {table}
                     (id, match_id, created_at, updated_at, last_synced_at, sync_status, doc)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     match_id = excluded.match_id,
                     updated_at = excluded.updated_at,
                     last_synced_at = excluded.last_synced_at,
                     sync_status = excluded.sync_status,
                     doc = excluded.doc"
            );
            sqlx::query(&sql)
                .bind(&cols.id)
                .bind(&cols.match_id)
                .bind(cols.created_at)
                .bind(cols.updated_at)
                .bind(cols.last_synced_at)
                .bind(&cols.sync_status)
                .bind(&raw)
                .execute(&mut **tx)
                .await?;
        } else {
            let sql = format!(
                "INSERT INTO {table}
                     (id, created_at, updated_at, last_synced_at, sync_status, doc)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     updated_at = excluded.updated_at,
                     last_synced_at = excluded.last_synced_at,
                     sync_status = excluded.sync_status,
                     doc = excluded.doc"
            );
            sqlx::query(&sql)
                .bind(&cols.id)
                .bind(cols.created_at)
                .bind(cols.updated_at)
                .bind(cols.last_synced_at)
                .bind(&cols.sync_status)
                .bind(&raw)
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }

    /// Prepares a locally written document: fills missing stamps and, when
    /// the row already exists, restamps `updatedAt` (update-hook semantics).
    async fn stamp_local_write(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        kind: EntityKind,
        doc: &mut Value,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let now_ms = now.timestamp_millis();
        let id = doc
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::MissingId(format!("{kind} row without id")))?
            .to_string();

        let sql = format!("SELECT created_at FROM {} WHERE id = ?", kind.table());
        let existing: Option<i64> = sqlx::query_scalar(&sql)
            .bind(&id)
            .fetch_optional(&mut **tx)
            .await?;

        if let Some(obj) = doc.as_object_mut() {
            match existing {
                Some(created_at) => {
                    // Update path: always refresh updatedAt, keep original createdAt.
                    obj.insert("updatedAt".to_string(), Value::from(now_ms));
                    obj.entry("createdAt".to_string())
                        .or_insert_with(|| Value::from(created_at));
                }
                None => {
                    obj.entry("createdAt".to_string())
                        .or_insert_with(|| Value::from(now_ms));
                    obj.entry("updatedAt".to_string())
                        .or_insert_with(|| Value::from(now_ms));
                }
            }
        }

        Ok(())
    }

    /// Inserts a queue item within a transaction
    async fn insert_queue_item(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        item: &SyncQueueItem,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sync_queue
                 (id, operation, entity, entity_id, payload, priority, attempts,
                  max_attempts, created_at, last_attempt_at, next_retry_at, status, error)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.id.to_string())
        .bind(item.operation.as_str())
        .bind(item.entity.table())
        .bind(item.entity_id.to_string())
        .bind(item.payload.to_string())
        .bind(item.priority.as_str())
        .bind(item.attempts as i64)
        .bind(item.max_attempts as i64)
        .bind(item.created_at.timestamp_millis())
        .bind(item.last_attempt_at.map(|t| t.timestamp_millis()))
        .bind(item.next_retry_at.map(|t| t.timestamp_millis()))
        .bind(item.status.as_str())
        .bind(&item.error)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Persists the mutable fields of a queue item
    async fn update_queue_item(&self, item: &SyncQueueItem) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE sync_queue
             SET attempts = ?, last_attempt_at = ?, next_retry_at = ?,
                 status = ?, error = ?, entity_id = ?, payload = ?
             WHERE id = ?",
        )
        .bind(item.attempts as i64)
        .bind(item.last_attempt_at.map(|t| t.timestamp_millis()))
        .bind(item.next_retry_at.map(|t| t.timestamp_millis()))
        .bind(item.status.as_str())
        .bind(&item.error)
        .bind(item.entity_id.to_string())
        .bind(item.payload.to_string())
        .bind(item.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ============================================================================
// LocalStore implementation
// ============================================================================

#[async_trait::async_trait]
impl LocalStore for SqliteLocalStore {
    // --- Row operations ---

    async fn get_row(&self, kind: EntityKind, id: &EntityId) -> anyhow::Result<Option<Value>> {
        let sql = format!("SELECT doc FROM {} WHERE id = ?", kind.table());
        let raw: Option<String> = sqlx::query_scalar(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        raw.map(|r| parse_doc(&r)).transpose().map_err(Into::into)
    }

    async fn put_row(&self, kind: EntityKind, mut row: Value) -> anyhow::Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        Self::stamp_local_write(&mut tx, kind, &mut row, now).await?;
        Self::upsert_doc(&mut tx, kind, &row).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn bulk_put(&self, kind: EntityKind, rows: Vec<Value>) -> anyhow::Result<u64> {
        let now_ms = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;
        for mut row in rows {
            fill_missing_stamps(&mut row, now_ms);
            Self::upsert_doc(&mut tx, kind, &row).await?;
            written += 1;
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn delete_row(&self, kind: EntityKind, id: &EntityId) -> anyhow::Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
        sqlx::query(&sql)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_rows(&self, kind: EntityKind) -> anyhow::Result<Vec<Value>> {
        let sql = format!(
            "SELECT doc FROM {} ORDER BY created_at, id",
            kind.table()
        );
        let raws: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        raws.iter()
            .map(|r| parse_doc(r).map_err(Into::into))
            .collect()
    }

    async fn put_row_with_enqueue(
        &self,
        kind: EntityKind,
        mut row: Value,
        item: SyncQueueItem,
    ) -> anyhow::Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        Self::stamp_local_write(&mut tx, kind, &mut row, now).await?;
        Self::upsert_doc(&mut tx, kind, &row).await?;
        Self::insert_queue_item(&mut tx, &item).await?;
        tx.commit().await?;

        tracing::debug!(
            entity = %kind,
            entity_id = %item.entity_id,
            operation = %item.operation,
            "Row written and mutation enqueued"
        );
        Ok(())
    }

    async fn set_row_status(
        &self,
        kind: EntityKind,
        id: &EntityId,
        status: SyncStatus,
    ) -> anyhow::Result<()> {
        let sql = format!(
            "UPDATE {} SET sync_status = ?, doc = json_set(doc, '$.syncStatus', ?) WHERE id = ?",
            kind.table()
        );
        sqlx::query(&sql)
            .bind(status.as_str())
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reconcile_entity_id(
        &self,
        kind: EntityKind,
        local: &EntityId,
        server: &EntityId,
    ) -> anyhow::Result<u64> {
        let old = local.to_string();
        let new = server.to_string();
        let mut rewritten = 0u64;

        let mut tx = self.pool.begin().await?;

        // The row's own key.
        let sql = format!(
            "UPDATE {} SET id = ?, doc = json_set(doc, '$.id', ?) WHERE id = ?",
            kind.table()
        );
        rewritten += sqlx::query(&sql)
            .bind(&new)
            .bind(&new)
            .bind(&old)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        // Referencing rows: messages and conversations point at matches.
        if kind == EntityKind::JobMatch {
            for table in ["messages", "conversations"] {
                let sql = format!(
                    "UPDATE {table}
                     SET match_id = ?, doc = json_set(doc, '$.matchId', ?)
                     WHERE match_id = ?"
                );
                rewritten += sqlx::query(&sql)
                    .bind(&new)
                    .bind(&new)
                    .bind(&old)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            }
        }

        // Outstanding mutations still targeting the temporary id.
        rewritten += sqlx::query(
            "UPDATE sync_queue
             SET entity_id = ?, payload = json_set(payload, '$.id', ?)
             WHERE entity_id = ? AND status != 'completed'",
        )
        .bind(&new)
        .bind(&new)
        .bind(&old)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        tracing::info!(
            entity = %kind,
            local_id = %old,
            server_id = %new,
            rewritten,
            "Reconciled temporary id to server id"
        );
        Ok(rewritten)
    }

    // --- Queue operations ---

    async fn enqueue(&self, item: &SyncQueueItem) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_queue_item(&mut tx, item).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> anyhow::Result<Option<SyncQueueItem>> {
        let now_ms = now.timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT * FROM sync_queue q
             WHERE q.status = 'pending'
               AND (q.next_retry_at IS NULL OR q.next_retry_at <= ?)
               AND NOT EXISTS (
                   SELECT 1 FROM sync_queue p
                   WHERE p.entity_id = q.entity_id AND p.status = 'processing'
               )
             ORDER BY {PRIORITY_RANK}, q.created_at
             LIMIT 1"
        );
        let row = sqlx::query(&sql).bind(now_ms).fetch_optional(&mut *tx).await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let mut item = queue_item_from_row(&row)?;

        let claimed = sqlx::query(
            "UPDATE sync_queue SET status = 'processing', last_attempt_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(now_ms)
        .bind(item.id.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if claimed == 0 {
            // Lost a race with another claimer.
            return Ok(None);
        }

        item.mark_processing(now)?;
        Ok(Some(item))
    }

    async fn complete(&self, id: &QueueItemId) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE sync_queue SET status = 'completed', error = NULL
             WHERE id = ? AND status = 'processing'",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(
        &self,
        id: &QueueItemId,
        error: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let Some(mut item) = self.get_queue_item(id).await? else {
            return Ok(());
        };
        item.record_failure(error, now);
        self.update_queue_item(&item).await?;

        tracing::warn!(
            queue_id = %id,
            entity_id = %item.entity_id,
            attempts = item.attempts,
            status = %item.status,
            error,
            "Queue item delivery failed"
        );
        Ok(())
    }

    async fn get_queue_item(&self, id: &QueueItemId) -> anyhow::Result<Option<SyncQueueItem>> {
        let row = sqlx::query("SELECT * FROM sync_queue WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| queue_item_from_row(&r)).transpose().map_err(Into::into)
    }

    async fn list_queue(
        &self,
        status: Option<QueueStatus>,
    ) -> anyhow::Result<Vec<SyncQueueItem>> {
        let rows = match status {
            Some(s) => {
                sqlx::query("SELECT * FROM sync_queue WHERE status = ? ORDER BY created_at")
                    .bind(s.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM sync_queue ORDER BY created_at")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter()
            .map(|r| queue_item_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn queue_counts(&self) -> anyhow::Result<QueueCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM sync_queue GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            match status.as_str() {
                "pending" => counts.pending = n as u64,
                "processing" => counts.processing = n as u64,
                "failed" => counts.failed = n as u64,
                "completed" => counts.completed = n as u64,
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn has_pending_mutation(
        &self,
        kind: EntityKind,
        id: &EntityId,
    ) -> anyhow::Result<bool> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(
                 SELECT 1 FROM sync_queue
                 WHERE entity = ? AND entity_id = ?
                   AND status IN ('pending', 'processing', 'failed')
             )",
        )
        .bind(kind.table())
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists != 0)
    }

    async fn requeue_failed(&self, id: &QueueItemId) -> anyhow::Result<()> {
        let Some(mut item) = self.get_queue_item(id).await? else {
            anyhow::bail!("Queue item not found: {id}");
        };
        item.requeue()?;
        self.update_queue_item(&item).await?;
        Ok(())
    }

    async fn discard(&self, id: &QueueItemId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_completed(&self) -> anyhow::Result<u64> {
        let removed = sqlx::query("DELETE FROM sync_queue WHERE status = 'completed'")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed)
    }

    async fn reset_stale_processing(
        &self,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let cutoff = (now - threshold).timestamp_millis();
        let reset = sqlx::query(
            "UPDATE sync_queue
             SET status = 'pending', last_attempt_at = NULL
             WHERE status = 'processing'
               AND (last_attempt_at IS NULL OR last_attempt_at < ?)",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if reset > 0 {
            tracing::warn!(reset, "Reset stale processing queue items");
        }
        Ok(reset)
    }

    // --- Metadata ---

    async fn get_meta(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        raw.map(|r| parse_doc(&r)).transpose().map_err(Into::into)
    }

    async fn set_meta(&self, key: &str, value: Value, now: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO metadata (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value.to_string())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- Snapshot operations ---

    async fn export_stores(&self) -> anyhow::Result<BTreeMap<String, Vec<Value>>> {
        let mut stores = BTreeMap::new();
        for kind in EntityKind::ALL {
            stores.insert(kind.table().to_string(), self.list_rows(kind).await?);
        }
        Ok(stores)
    }

    async fn import_stores(&self, stores: BTreeMap<String, Vec<Value>>) -> anyhow::Result<()> {
        let now_ms = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        for kind in EntityKind::ALL {
            let sql = format!("DELETE FROM {}", kind.table());
            sqlx::query(&sql).execute(&mut *tx).await?;
        }

        for (table, rows) in &stores {
            let kind: EntityKind = table
                .parse()
                .map_err(|_| StoreError::UnknownTable(table.clone()))?;
            for row in rows {
                let mut doc = row.clone();
                if let Some(obj) = doc.as_object_mut() {
                    obj.insert("syncStatus".to_string(), Value::from("synced"));
                }
                fill_missing_stamps(&mut doc, now_ms);
                Self::upsert_doc(&mut tx, kind, &doc).await?;
            }
        }

        tx.commit().await?;
        tracing::info!(tables = stores.len(), "Snapshot import committed");
        Ok(())
    }

    async fn clear_all(&self) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for kind in EntityKind::ALL {
            let sql = format!("DELETE FROM {}", kind.table());
            sqlx::query(&sql).execute(&mut *tx).await?;
        }
        sqlx::query("DELETE FROM sync_queue").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM metadata").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn table_counts(&self) -> anyhow::Result<BTreeMap<String, u64>> {
        let mut counts = BTreeMap::new();
        for kind in EntityKind::ALL {
            let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
            let n: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
            counts.insert(kind.table().to_string(), n as u64);
        }
        Ok(counts)
    }
}
