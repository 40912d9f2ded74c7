//! Sync queue item state machine
//!
//! A [`SyncQueueItem`] is one outstanding local mutation awaiting server
//! application. Its lifecycle:
//!
//! ```text
//!   ┌─────────┐  claim   ┌────────────┐  success  ┌───────────┐
//!   │ Pending │ ───────► │ Processing │ ────────► │ Completed │
//!   └─────────┘          └────────────┘           └───────────┘
//!        ▲                     │ failure
//!        │  attempts < max     ▼
//!        └──────────── record_failure ────► Failed (attempts == max)
//! ```
//!
//! Retry admission is driven entirely by `next_retry_at`: an item whose
//! retry time lies in the future is invisible to the claim query until the
//! time passes. There is no separate retry scheduler.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use super::errors::DomainError;
use super::newtypes::{EntityId, EntityKind, QueueItemId};

// ============================================================================
// Operation
// ============================================================================

/// The kind of mutation a queue item carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Returns the operation name as stored in the database
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(DomainError::UnknownOperation(other.to_string())),
        }
    }
}

// ============================================================================
// Priority
// ============================================================================

/// Drain priority of a queue item
///
/// The claim query orders by [`Priority::rank`] first, creation time second,
/// so critical items always drain before low-priority housekeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Stable ordering rank; lower drains first
    #[must_use]
    pub fn rank(&self) -> i64 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    /// Returns the priority name as stored in the database
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(DomainError::UnknownPriority(other.to_string())),
        }
    }
}

// ============================================================================
// QueueStatus
// ============================================================================

/// Lifecycle state of a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Awaiting claim (possibly gated by `next_retry_at`)
    Pending,
    /// Claimed by a drain; at most one per entity id at any time
    Processing,
    /// Attempts exhausted; parked for manual retry or discard
    Failed,
    /// Successfully pushed
    Completed,
}

impl QueueStatus {
    /// Returns the status name as stored in the database
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Failed => "failed",
            QueueStatus::Completed => "completed",
        }
    }
}

impl Display for QueueStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "failed" => Ok(QueueStatus::Failed),
            "completed" => Ok(QueueStatus::Completed),
            other => Err(DomainError::UnknownQueueStatus(other.to_string())),
        }
    }
}

// ============================================================================
// SyncQueueItem
// ============================================================================

/// Retry backoff schedule in seconds; the last step repeats once exhausted
pub const BACKOFF_SCHEDULE_SECS: [i64; 5] = [1, 5, 15, 60, 300];

/// Default maximum delivery attempts before an item is parked
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// One outstanding local mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    /// Queue item identifier
    pub id: QueueItemId,
    /// The mutation kind
    pub operation: Operation,
    /// Which owned table the mutation targets
    pub entity: EntityKind,
    /// The target row (local or server id)
    pub entity_id: EntityId,
    /// Mutation payload, opaque to the engine
    pub payload: Value,
    /// Drain priority
    pub priority: Priority,
    /// Delivery attempts made so far; never exceeds `max_attempts`
    pub attempts: u32,
    /// Attempts after which the item is parked as `Failed`
    pub max_attempts: u32,
    /// When the item was enqueued
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// When delivery was last attempted
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Earliest time the item may be claimed again
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Lifecycle state
    pub status: QueueStatus,
    /// Last delivery error, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncQueueItem {
    /// Creates a pending queue item for a mutation
    #[must_use]
    pub fn new(
        operation: Operation,
        entity: EntityKind,
        entity_id: EntityId,
        payload: Value,
        priority: Priority,
    ) -> Self {
        Self {
            id: QueueItemId::new(),
            operation,
            entity,
            entity_id,
            payload,
            priority,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_at: Utc::now(),
            last_attempt_at: None,
            next_retry_at: None,
            status: QueueStatus::Pending,
            error: None,
        }
    }

    /// Overrides the attempt budget
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Returns true if the item may be claimed at `now`
    ///
    /// Pending items gated by a future `next_retry_at` are excluded; this is
    /// the sole retry admission mechanism.
    #[must_use]
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Pending
            && self.next_retry_at.map_or(true, |at| at <= now)
    }

    /// Transitions the item to `Processing` when claimed by a drain
    pub fn mark_processing(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != QueueStatus::Pending {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: QueueStatus::Processing.to_string(),
            });
        }
        self.status = QueueStatus::Processing;
        self.last_attempt_at = Some(now);
        Ok(())
    }

    /// Transitions the item to `Completed` after a successful push
    pub fn mark_completed(&mut self) -> Result<(), DomainError> {
        if self.status != QueueStatus::Processing {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: QueueStatus::Completed.to_string(),
            });
        }
        self.status = QueueStatus::Completed;
        self.error = None;
        Ok(())
    }

    /// Records a delivery failure
    ///
    /// Increments `attempts`, schedules the next retry from
    /// [`BACKOFF_SCHEDULE_SECS`] (indexed by the new attempt count,
    /// saturating at the last step), and parks the item as `Failed` once the
    /// attempt budget is exhausted. A `Failed` item keeps its final
    /// `next_retry_at` frozen; it can only re-enter the queue through an
    /// explicit requeue.
    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.attempts = (self.attempts + 1).min(self.max_attempts);
        self.last_attempt_at = Some(now);
        self.error = Some(error.into());

        let idx = (self.attempts as usize).min(BACKOFF_SCHEDULE_SECS.len() - 1);
        self.next_retry_at = Some(now + Duration::seconds(BACKOFF_SCHEDULE_SECS[idx]));

        self.status = if self.attempts >= self.max_attempts {
            QueueStatus::Failed
        } else {
            QueueStatus::Pending
        };
    }

    /// Resets a parked item back to `Pending` for a manual retry
    pub fn requeue(&mut self) -> Result<(), DomainError> {
        if self.status != QueueStatus::Failed {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: QueueStatus::Pending.to_string(),
            });
        }
        self.status = QueueStatus::Pending;
        self.attempts = 0;
        self.next_retry_at = None;
        self.error = None;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
