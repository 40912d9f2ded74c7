//! Conflict domain entities
//!
//! A conflict records a divergence between the local and server versions of
//! the same row, discovered during pull application. It carries both full
//! versions as JSON documents plus the timestamps needed by the resolver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use super::errors::DomainError;
use super::newtypes::{ConflictId, EntityId, EntityKind};

// ============================================================================
// ConflictStrategy
// ============================================================================

/// How a conflict should be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Keep the local version wholesale
    LocalWins,
    /// Keep the server version wholesale
    ServerWins,
    /// Field-by-field reconciliation
    MergeFields,
    /// Both versions are retained (append-only entities)
    KeepBoth,
    /// Defer to the caller; never auto-pick a winner
    Manual,
}

impl Display for ConflictStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConflictStrategy::LocalWins => "local-wins",
            ConflictStrategy::ServerWins => "server-wins",
            ConflictStrategy::MergeFields => "merge-fields",
            ConflictStrategy::KeepBoth => "keep-both",
            ConflictStrategy::Manual => "manual",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ConflictStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local-wins" => Ok(ConflictStrategy::LocalWins),
            "server-wins" => Ok(ConflictStrategy::ServerWins),
            "merge-fields" => Ok(ConflictStrategy::MergeFields),
            "keep-both" => Ok(ConflictStrategy::KeepBoth),
            "manual" => Ok(ConflictStrategy::Manual),
            other => Err(DomainError::UnknownStrategy(other.to_string())),
        }
    }
}

// ============================================================================
// Conflict
// ============================================================================

/// A divergence between the local and server versions of one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Unique identifier for this conflict record
    pub id: ConflictId,
    /// Which owned table the row belongs to
    pub entity: EntityKind,
    /// The row both sides disagree about
    pub entity_id: EntityId,
    /// The local version as a JSON document
    pub local_version: Value,
    /// The server version as a JSON document
    pub server_version: Value,
    /// `updatedAt` of the local version
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub local_updated_at: DateTime<Utc>,
    /// `updatedAt` of the server version
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub server_updated_at: DateTime<Utc>,
    /// The strategy chosen by policy for this entity kind
    pub strategy: ConflictStrategy,
    /// The winning version, once resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_version: Option<Value>,
    /// When the conflict was resolved
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    /// Creates a new unresolved conflict
    #[must_use]
    pub fn new(
        entity: EntityKind,
        entity_id: EntityId,
        local_version: Value,
        server_version: Value,
        local_updated_at: DateTime<Utc>,
        server_updated_at: DateTime<Utc>,
        strategy: ConflictStrategy,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            entity,
            entity_id,
            local_version,
            server_version,
            local_updated_at,
            server_updated_at,
            strategy,
            resolved_version: None,
            resolved_at: None,
        }
    }

    /// Returns true if this conflict has been resolved
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved_version.is_some()
    }

    /// Records the resolved version and resolution time
    #[must_use]
    pub fn resolve(mut self, resolved: Value, now: DateTime<Utc>) -> Self {
        self.resolved_version = Some(resolved);
        self.resolved_at = Some(now);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
