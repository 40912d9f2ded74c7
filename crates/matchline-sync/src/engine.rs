//! Pull-then-push synchronization engine
//!
//! The [`SyncEngine`] orchestrates one sync cycle at a time against the
//! local store and the backend gateway:
//!
//! 1. **Pull**: fetch server deltas since the last recorded pull watermark
//!    and bulk-apply them, routing diverged rows through the conflict
//!    resolver instead of overwriting queued local work
//! 2. **Push**: drain the sync queue one item at a time in priority order,
//!    reconciling temporary ids on create acks; item failures never abort
//!    the drain
//! 3. **Metadata**: record the new pull watermark and completion time only
//!    when the cycle did not abort
//!
//! A pull failure aborts the whole cycle and leaves the queue untouched.
//! Only one cycle runs at a time; triggers arriving while `Syncing` are
//! no-ops, as are triggers while offline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use matchline_conflict::{ConflictDetector, ConflictResolver, DetectionResult, Resolution, StrategyPolicy};
use matchline_core::config::Config;
use matchline_core::domain::{
    conflict::Conflict,
    entity::{row_id, row_updated_at, SyncStatus},
    newtypes::{EntityId, EntityKind},
    queue::{Operation, QueueStatus},
};
use matchline_core::ports::backend::{BackendGateway, PullResponse};
use matchline_core::ports::local_store::{
    LocalStore, META_LAST_PULL_AT, META_LAST_SYNC_COMPLETED_AT,
};

use crate::network::NetworkMonitor;

// ============================================================================
// Cycle summaries and status events
// ============================================================================

/// Summary of a completed sync cycle
#[derive(Debug, Default)]
pub struct SyncSummary {
    /// Server rows applied into the local store
    pub pulled: u64,
    /// Queue items pushed successfully
    pub pushed: u64,
    /// Queue items that failed this drain (rescheduled or parked)
    pub push_failed: u64,
    /// Conflicts resolved automatically
    pub conflicts_resolved: u64,
    /// Conflicts deferred to manual resolution
    pub deferred_conflicts: Vec<Conflict>,
    /// Non-fatal errors encountered during the cycle
    pub errors: Vec<String>,
    /// Wall-clock duration of the cycle in milliseconds
    pub duration_ms: u64,
}

/// Summary of one queue drain (also used by the background agent)
#[derive(Debug, Default)]
pub struct PushSummary {
    pub pushed: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

/// Result of a sync trigger
#[derive(Debug)]
pub enum SyncOutcome {
    /// A full cycle ran
    Completed(SyncSummary),
    /// The device is offline; nothing was attempted
    SkippedOffline,
    /// Another cycle is already running
    SkippedBusy,
}

/// Live status broadcast to subscribers on every cycle boundary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusEvent {
    pub is_online: bool,
    pub is_syncing: bool,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_successful_sync_at: Option<DateTime<Utc>>,
    /// Items awaiting push (pending + processing)
    pub pending: u64,
    /// Items parked after exhausting their attempts
    pub failed: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct SyncTimes {
    last_sync_at: Option<DateTime<Utc>>,
    last_successful_sync_at: Option<DateTime<Utc>>,
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Orchestrates pull-then-push synchronization cycles
///
/// Explicitly constructed with its dependencies; owns no global state and
/// has no import-time side effects. Scheduling lives in
/// [`SyncScheduler`](crate::scheduler::SyncScheduler).
pub struct SyncEngine {
    store: Arc<dyn LocalStore>,
    gateway: Arc<dyn BackendGateway>,
    network: Arc<NetworkMonitor>,
    resolver: ConflictResolver,
    policy: StrategyPolicy,
    /// Concurrency guard: only one cycle may be active at a time
    syncing: AtomicBool,
    events: broadcast::Sender<SyncStatusEvent>,
    times: Mutex<SyncTimes>,
}

impl SyncEngine {
    /// Creates a new engine with the given dependencies
    pub fn new(
        store: Arc<dyn LocalStore>,
        gateway: Arc<dyn BackendGateway>,
        network: Arc<NetworkMonitor>,
        config: &Config,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            resolver: ConflictResolver::new(store.clone()),
            policy: StrategyPolicy::from_config(&config.conflicts),
            store,
            gateway,
            network,
            syncing: AtomicBool::new(false),
            events,
            times: Mutex::new(SyncTimes::default()),
        }
    }

    /// Subscribes to status change events
    ///
    /// Any number of listeners may subscribe; dropping the receiver
    /// unsubscribes deterministically.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatusEvent> {
        self.events.subscribe()
    }

    /// Returns the current sync status
    pub async fn status(&self) -> Result<SyncStatusEvent> {
        let counts = self.store.queue_counts().await?;
        let mut times = *self.times.lock().expect("times lock poisoned");

        // Before the first in-process cycle, fall back to the durable record.
        if times.last_successful_sync_at.is_none() {
            times.last_successful_sync_at = self
                .store
                .get_meta(META_LAST_SYNC_COMPLETED_AT)
                .await?
                .and_then(|v| v.as_i64())
                .and_then(DateTime::<Utc>::from_timestamp_millis);
        }

        Ok(SyncStatusEvent {
            is_online: self.network.is_online(),
            is_syncing: self.syncing.load(Ordering::Acquire),
            last_sync_at: times.last_sync_at,
            last_successful_sync_at: times.last_successful_sync_at,
            pending: counts.pending + counts.processing,
            failed: counts.failed,
        })
    }

    /// Attempts to run one sync cycle
    ///
    /// No-op while offline or while another cycle is active. A network flip
    /// mid-cycle lets the in-flight cycle finish; the next trigger is gated
    /// again.
    pub async fn try_sync(&self) -> Result<SyncOutcome> {
        if !self.network.is_online() {
            debug!("Skipping sync: offline");
            return Ok(SyncOutcome::SkippedOffline);
        }
        if self.syncing.swap(true, Ordering::AcqRel) {
            debug!("Skipping sync: cycle already running");
            return Ok(SyncOutcome::SkippedBusy);
        }

        self.broadcast_status().await;
        let started = Instant::now();

        let result = self.run_cycle().await;

        {
            let mut times = self.times.lock().expect("times lock poisoned");
            let now = Utc::now();
            times.last_sync_at = Some(now);
            if result.is_ok() {
                times.last_successful_sync_at = Some(now);
            }
        }
        self.syncing.store(false, Ordering::Release);
        self.broadcast_status().await;

        match result {
            Ok(mut summary) => {
                summary.duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    pulled = summary.pulled,
                    pushed = summary.pushed,
                    push_failed = summary.push_failed,
                    conflicts_resolved = summary.conflicts_resolved,
                    deferred = summary.deferred_conflicts.len(),
                    duration_ms = summary.duration_ms,
                    "Sync cycle completed"
                );
                Ok(SyncOutcome::Completed(summary))
            }
            Err(e) => Err(e),
        }
    }

    /// One full cycle: pull, push, metadata
    async fn run_cycle(&self) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        // Step 1: Pull. A failure here aborts the whole cycle - subsequent
        // push results would be based on possibly-stale local state.
        let since = self
            .store
            .get_meta(META_LAST_PULL_AT)
            .await?
            .and_then(|v| v.as_i64())
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        let response = self
            .gateway
            .pull(since)
            .await
            .context("Pull failed, sync cycle aborted")?;

        debug!(rows = response.total(), "Pull returned");
        let watermark = self.apply_pull(&response, &mut summary).await?;

        // Step 2: Push.
        let push = self.drain_queue().await?;
        summary.pushed = push.pushed;
        summary.push_failed = push.failed;
        summary.errors.extend(push.errors);

        // Step 3: Metadata, only reached when steps 1-2 did not abort.
        let now = Utc::now();
        if let Some(watermark) = watermark {
            self.store
                .set_meta(
                    META_LAST_PULL_AT,
                    Value::from(watermark.timestamp_millis()),
                    now,
                )
                .await?;
        }
        self.store
            .set_meta(
                META_LAST_SYNC_COMPLETED_AT,
                Value::from(now.timestamp_millis()),
                now,
            )
            .await?;

        Ok(summary)
    }

    /// Applies pulled server rows, routing diverged rows to the resolver
    ///
    /// Returns the new pull watermark: the newest `updatedAt` seen across
    /// the response, so the next pull resumes where the server left off
    /// regardless of client clock skew.
    async fn apply_pull(
        &self,
        response: &PullResponse,
        summary: &mut SyncSummary,
    ) -> Result<Option<DateTime<Utc>>> {
        let now = Utc::now();

        // Outstanding mutations, indexed for the conflict check. The newest
        // creation time per row is the moment of the local edit.
        let mut pending: HashMap<(EntityKind, String), DateTime<Utc>> = HashMap::new();
        for item in self.store.list_queue(None).await? {
            if item.status == QueueStatus::Completed {
                continue;
            }
            let key = (item.entity, item.entity_id.to_string());
            let entry = pending.entry(key).or_insert(item.created_at);
            if item.created_at > *entry {
                *entry = item.created_at;
            }
        }

        let mut watermark: Option<DateTime<Utc>> = None;

        for (kind, rows) in response.collections() {
            let mut clean: Vec<Value> = Vec::with_capacity(rows.len());

            for doc in rows {
                let Some(id) = row_id(doc) else {
                    warn!(entity = %kind, "Pulled row without id, skipping");
                    summary.errors.push(format!("{kind} row without id"));
                    continue;
                };

                if let Some(updated_at) = row_updated_at(doc) {
                    watermark = Some(watermark.map_or(updated_at, |w| w.max(updated_at)));
                }

                let local = self.store.get_row(kind, &id).await?;
                let pending_since = pending.get(&(kind, id.to_string())).copied();

                match ConflictDetector::check_pulled_row(
                    kind,
                    local.as_ref(),
                    doc,
                    pending_since.is_some(),
                    pending_since,
                    &self.policy,
                ) {
                    DetectionResult::NoConflict => {
                        let mut doc = doc.clone();
                        stamp_synced(&mut doc, now);
                        clean.push(doc);
                        summary.pulled += 1;
                    }
                    DetectionResult::Conflicted(conflict) => {
                        match self.resolver.resolve(*conflict, now).await {
                            Ok(Resolution::Applied(_)) | Ok(Resolution::KeptBoth) => {
                                summary.conflicts_resolved += 1;
                            }
                            Ok(Resolution::Deferred(conflict)) => {
                                // Surface the conflict; never silently pick
                                // a winner.
                                self.store
                                    .set_row_status(kind, &id, SyncStatus::Conflict)
                                    .await?;
                                summary.deferred_conflicts.push(conflict);
                            }
                            Err(e) => {
                                summary
                                    .errors
                                    .push(format!("Conflict resolution for {kind} {id}: {e}"));
                            }
                        }
                    }
                }
            }

            if !clean.is_empty() {
                self.store.bulk_put(kind, clean).await?;
            }
        }

        Ok(watermark)
    }

    /// Drains the sync queue, one item at a time
    ///
    /// Serial on purpose: per-entity ordering (create before update before
    /// delete) relies on FIFO processing of each entity's items. Failures
    /// are recorded on the item and the drain continues - independent items
    /// fail independently.
    pub async fn drain_queue(&self) -> Result<PushSummary> {
        let mut summary = PushSummary::default();

        loop {
            let now = Utc::now();
            let Some(item) = self.store.claim_next(now).await? else {
                break;
            };

            debug!(
                queue_id = %item.id,
                entity = %item.entity,
                entity_id = %item.entity_id,
                operation = %item.operation,
                attempt = item.attempts + 1,
                "Pushing queue item"
            );

            match self.gateway.push(&item).await {
                Ok(ack) => {
                    self.store.complete(&item.id).await?;

                    let mut final_id = item.entity_id.clone();
                    if item.operation == Operation::Create {
                        if let Some(server_id) = ack.server_id {
                            if server_id != item.entity_id {
                                self.store
                                    .reconcile_entity_id(item.entity, &item.entity_id, &server_id)
                                    .await?;
                                final_id = server_id;
                            }
                        }
                    }

                    if item.operation != Operation::Delete {
                        self.mark_row_synced(item.entity, &final_id, now).await?;
                    }
                    summary.pushed += 1;
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    self.store.fail(&item.id, &message, Utc::now()).await?;

                    // A parked item surfaces on the entity row for the UI.
                    if let Some(parked) = self.store.get_queue_item(&item.id).await? {
                        if parked.status == QueueStatus::Failed {
                            self.store
                                .set_row_status(item.entity, &item.entity_id, SyncStatus::Error)
                                .await?;
                        }
                    }

                    summary.failed += 1;
                    summary.errors.push(message);
                }
            }
        }

        if summary.pushed > 0 || summary.failed > 0 {
            info!(
                pushed = summary.pushed,
                failed = summary.failed,
                "Queue drain finished"
            );
        }
        Ok(summary)
    }

    /// Marks a row as in agreement with the server after a successful push
    async fn mark_row_synced(
        &self,
        kind: EntityKind,
        id: &EntityId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(mut doc) = self.store.get_row(kind, id).await? else {
            return Ok(());
        };
        stamp_synced(&mut doc, now);
        self.store.bulk_put(kind, vec![doc]).await?;
        Ok(())
    }

    /// Broadcasts the current status to subscribers
    async fn broadcast_status(&self) {
        match self.status().await {
            Ok(event) => {
                // No receivers is fine.
                let _ = self.events.send(event);
            }
            Err(e) => warn!(error = %e, "Failed to compute sync status"),
        }
    }
}

/// Stamps a document as in agreement with the server
fn stamp_synced(doc: &mut Value, now: DateTime<Utc>) {
    if let Some(obj) = doc.as_object_mut() {
        obj.insert("syncStatus".to_string(), Value::from("synced"));
        obj.insert(
            "lastSyncedAt".to_string(),
            Value::from(now.timestamp_millis()),
        );
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stamp_synced_sets_status_and_timestamp() {
        let mut doc = json!({"id": "x", "syncStatus": "pending"});
        let now = Utc::now();
        stamp_synced(&mut doc, now);
        assert_eq!(doc["syncStatus"], "synced");
        assert_eq!(doc["lastSyncedAt"], now.timestamp_millis());
    }

    #[test]
    fn test_stamp_synced_ignores_non_objects() {
        let mut doc = json!("scalar");
        stamp_synced(&mut doc, Utc::now());
        assert_eq!(doc, json!("scalar"));
    }

    #[test]
    fn test_status_event_serializes_for_ui() {
        let event = SyncStatusEvent {
            is_online: true,
            is_syncing: false,
            last_sync_at: None,
            last_successful_sync_at: None,
            pending: 3,
            failed: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["pending"], 3);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["lastSyncAt"], Value::Null);
    }
}
