//! Conflict detection logic
//!
//! Runs during pull application. A pulled server row conflicts with the
//! local one when both sides changed since the last agreement point: the
//! server version is newer than the local `lastSyncedAt` AND a queued local
//! mutation for the same row is still outstanding.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use matchline_core::domain::conflict::Conflict;
use matchline_core::domain::entity::{row_id, row_updated_at};
use matchline_core::domain::newtypes::EntityKind;

use crate::policy::StrategyPolicy;

/// Result of checking one pulled row against local state
#[derive(Debug, Clone)]
pub enum DetectionResult {
    /// Safe to apply the server row (server authority)
    NoConflict,
    /// Both sides changed; route through the resolver
    Conflicted(Box<Conflict>),
}

/// Detects conflicts between pulled server rows and local state
pub struct ConflictDetector;

impl ConflictDetector {
    /// Checks a pulled server row against the local version
    ///
    /// `local` is the current local document (if any),
    /// `has_pending_mutation` whether the queue still holds an outstanding
    /// mutation for this row, and `pending_since` the creation time of the
    /// newest such mutation - the moment of the local edit, which is what
    /// the merge compares against the server's `updatedAt`.
    pub fn check_pulled_row(
        kind: EntityKind,
        local: Option<&Value>,
        server: &Value,
        has_pending_mutation: bool,
        pending_since: Option<DateTime<Utc>>,
        policy: &StrategyPolicy,
    ) -> DetectionResult {
        let Some(local_doc) = local else {
            return DetectionResult::NoConflict;
        };

        // Without an outstanding local mutation the server is simply newer;
        // last-write-wins by server authority.
        if !has_pending_mutation {
            return DetectionResult::NoConflict;
        }

        let Some(server_updated_at) = row_updated_at(server) else {
            return DetectionResult::NoConflict;
        };

        let last_synced_at = local_doc
            .get("lastSyncedAt")
            .and_then(Value::as_i64)
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        // Server changed since the last agreement point? A row never synced
        // counts as agreed at the epoch.
        let server_diverged = match last_synced_at {
            Some(agreed) => server_updated_at > agreed,
            None => true,
        };

        if !server_diverged {
            debug!(
                entity = %kind,
                "Server row predates last agreement point, no conflict"
            );
            return DetectionResult::NoConflict;
        }

        let Some(entity_id) = row_id(server).or_else(|| row_id(local_doc)) else {
            return DetectionResult::NoConflict;
        };

        // The local mutation time is the queued write, falling back to the
        // document's own updatedAt.
        let local_updated_at = pending_since
            .into_iter()
            .chain(row_updated_at(local_doc))
            .max()
            .unwrap_or(server_updated_at);

        info!(
            entity = %kind,
            entity_id = %entity_id,
            local_updated_at = %local_updated_at,
            server_updated_at = %server_updated_at,
            "Conflict detected: both local and server versions changed"
        );

        let conflict = Conflict::new(
            kind,
            entity_id,
            local_doc.clone(),
            server.clone(),
            local_updated_at,
            server_updated_at,
            policy.strategy_for(kind),
        );
        DetectionResult::Conflicted(Box::new(conflict))
    }
}

// ============================================================================
// Tests
// ============================================================================
