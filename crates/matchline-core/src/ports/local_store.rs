//! Local store port (driven/secondary port)
//!
//! The interface to the durable, transactional, typed table set owned by the
//! sync subsystem. The single implementation lives in `matchline-store`
//! (SQLite via sqlx); tests may supply their own.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific and
//!   don't need domain-level classification.
//! - Rows travel as `serde_json::Value` documents at this seam - the engine
//!   treats payloads as opaque; typed access happens through the row structs
//!   in `domain::entity` where a component actually inspects fields.
//! - Every mutation path in the system goes through this port; no component
//!   is permitted a direct, non-transactional write.
//! - `put_row_with_enqueue` is the crux: an entity write and its queue item
//!   must commit together or not at all.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::domain::{
    entity::SyncStatus,
    newtypes::{EntityId, EntityKind, QueueItemId},
    queue::{QueueStatus, SyncQueueItem},
};

// ============================================================================
// QueueCounts
// ============================================================================

/// Queue population broken down by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: u64,
    pub processing: u64,
    pub failed: u64,
    pub completed: u64,
}

impl QueueCounts {
    /// Total items across all states
    #[must_use]
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.failed + self.completed
    }
}

// ============================================================================
// LocalStore trait
// ============================================================================

/// Port trait for the durable local store
///
/// Covers row CRUD for every owned table, the sync queue state machine,
/// the metadata table, and whole-store snapshot operations.
///
/// ## Implementation Notes
///
/// - Insert stamping fills `createdAt`/`updatedAt` when absent; updates
///   through [`put_row`](LocalStore::put_row) always refresh `updatedAt`.
///   [`bulk_put`](LocalStore::bulk_put) is the pull/import path and only
///   fills missing stamps, leaving server timestamps authoritative.
/// - [`claim_next`](LocalStore::claim_next) must guarantee that at most one
///   item per `entity_id` is ever in `Processing`, and must exclude items
///   whose `next_retry_at` lies in the future.
/// - [`import_stores`](LocalStore::import_stores) is all-or-nothing: if any
///   table's bulk load fails, no table is committed.
#[async_trait::async_trait]
pub trait LocalStore: Send + Sync {
    // --- Row operations ---

    /// Retrieves a row by id
    async fn get_row(&self, kind: EntityKind, id: &EntityId) -> anyhow::Result<Option<Value>>;

    /// Inserts or updates a row (local write path, restamps `updatedAt`)
    async fn put_row(&self, kind: EntityKind, row: Value) -> anyhow::Result<()>;

    /// Bulk-upserts rows (pull/import path, preserves incoming timestamps)
    ///
    /// Returns the number of rows written.
    async fn bulk_put(&self, kind: EntityKind, rows: Vec<Value>) -> anyhow::Result<u64>;

    /// Deletes a row by id
    async fn delete_row(&self, kind: EntityKind, id: &EntityId) -> anyhow::Result<()>;

    /// Lists every row of a table
    async fn list_rows(&self, kind: EntityKind) -> anyhow::Result<Vec<Value>>;

    /// Writes a row and enqueues its mutation in one transaction
    ///
    /// Either both the entity write and the queue insert commit, or neither
    /// does. This is the only entry point for UI/business-logic writes.
    async fn put_row_with_enqueue(
        &self,
        kind: EntityKind,
        row: Value,
        item: SyncQueueItem,
    ) -> anyhow::Result<()>;

    /// Updates only the sync status column of a row
    async fn set_row_status(
        &self,
        kind: EntityKind,
        id: &EntityId,
        status: SyncStatus,
    ) -> anyhow::Result<()>;

    /// Rewrites a temporary local id to the server-assigned one
    ///
    /// Atomically updates the row's own key, every referencing row (e.g.
    /// `messages.matchId` for a match), and any queued mutations still
    /// targeting the old id. Returns the number of rewritten references.
    async fn reconcile_entity_id(
        &self,
        kind: EntityKind,
        local: &EntityId,
        server: &EntityId,
    ) -> anyhow::Result<u64>;

    // --- Queue operations ---

    /// Appends a mutation to the queue
    async fn enqueue(&self, item: &SyncQueueItem) -> anyhow::Result<()>;

    /// Claims the next ready queue item, marking it `Processing`
    ///
    /// Selection order: priority rank, then `created_at`. Items gated by a
    /// future `next_retry_at` and items whose `entity_id` already has a
    /// `Processing` claim are skipped. Returns `None` when the queue is
    /// drained.
    async fn claim_next(&self, now: DateTime<Utc>) -> anyhow::Result<Option<SyncQueueItem>>;

    /// Marks a claimed item completed
    async fn complete(&self, id: &QueueItemId) -> anyhow::Result<()>;

    /// Records a delivery failure with backoff scheduling
    async fn fail(&self, id: &QueueItemId, error: &str, now: DateTime<Utc>)
        -> anyhow::Result<()>;

    /// Retrieves a queue item by id
    async fn get_queue_item(&self, id: &QueueItemId) -> anyhow::Result<Option<SyncQueueItem>>;

    /// Lists queue items, optionally filtered by status, oldest first
    async fn list_queue(&self, status: Option<QueueStatus>)
        -> anyhow::Result<Vec<SyncQueueItem>>;

    /// Returns queue population by status
    async fn queue_counts(&self) -> anyhow::Result<QueueCounts>;

    /// Returns true if a non-completed mutation targets the given row
    async fn has_pending_mutation(
        &self,
        kind: EntityKind,
        id: &EntityId,
    ) -> anyhow::Result<bool>;

    /// Resets a parked `Failed` item back to `Pending` for a manual retry
    async fn requeue_failed(&self, id: &QueueItemId) -> anyhow::Result<()>;

    /// Permanently removes a queue item (manual discard)
    async fn discard(&self, id: &QueueItemId) -> anyhow::Result<()>;

    /// Deletes all completed items; returns how many were removed
    async fn clear_completed(&self) -> anyhow::Result<u64>;

    /// Resets `Processing` items older than `threshold` back to `Pending`
    ///
    /// Clears `last_attempt_at` on each reset item. Used to recover from a
    /// crashed sync cycle. Returns how many items were reset.
    async fn reset_stale_processing(
        &self,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64>;

    // --- Metadata ---

    /// Reads a metadata value by key
    async fn get_meta(&self, key: &str) -> anyhow::Result<Option<Value>>;

    /// Writes a metadata value
    async fn set_meta(&self, key: &str, value: Value, now: DateTime<Utc>)
        -> anyhow::Result<()>;

    // --- Snapshot operations ---

    /// Dumps every owned table as `table name -> rows`
    async fn export_stores(&self) -> anyhow::Result<BTreeMap<String, Vec<Value>>>;

    /// Atomically clears and repopulates every owned table
    ///
    /// All-or-nothing: a failure on any table rolls back the whole import.
    /// Imported rows get `syncStatus` reset to `synced`.
    async fn import_stores(&self, stores: BTreeMap<String, Vec<Value>>) -> anyhow::Result<()>;

    /// Clears every owned table, the queue, and metadata
    async fn clear_all(&self) -> anyhow::Result<()>;

    /// Row counts per owned table
    async fn table_counts(&self) -> anyhow::Result<BTreeMap<String, u64>>;
}

// ============================================================================
// Well-known metadata keys
// ============================================================================

/// Timestamp of the last successful pull (server clock)
pub const META_LAST_PULL_AT: &str = "last_pull_at";

/// Wall-clock time the last full sync cycle completed
pub const META_LAST_SYNC_COMPLETED_AT: &str = "last_sync_completed_at";

/// Wall-clock time of the background agent's last queue replay
pub const META_AGENT_LAST_REPLAY_AT: &str = "agent_last_replay_at";

/// Wall-clock time of the last auto-backup snapshot
pub const META_AUTO_BACKUP_AT: &str = "auto_backup_at";
