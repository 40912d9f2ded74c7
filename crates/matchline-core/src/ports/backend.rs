//! Backend gateway port (driven/secondary port)
//!
//! The server is reachable through exactly two surfaces: a pull endpoint
//! returning per-collection deltas, and per-entity push endpoints mapped
//! from the operation kind. Credential lifecycle is owned by an external
//! collaborator; the gateway only forwards whatever token the
//! [`TokenProvider`] hands it at call time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    newtypes::{EntityId, EntityKind},
    queue::SyncQueueItem,
};

// ============================================================================
// PullResponse
// ============================================================================

/// Server deltas since a given timestamp, one array per owned collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullResponse {
    #[serde(default)]
    pub profiles: Vec<Value>,
    #[serde(default)]
    pub matches: Vec<Value>,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub jobs: Vec<Value>,
}

impl PullResponse {
    /// The response collections paired with their entity kinds, in apply
    /// order (referenced tables before referencing ones)
    #[must_use]
    pub fn collections(&self) -> [(EntityKind, &Vec<Value>); 4] {
        [
            (EntityKind::Profile, &self.profiles),
            (EntityKind::Job, &self.jobs),
            (EntityKind::JobMatch, &self.matches),
            (EntityKind::Message, &self.messages),
        ]
    }

    /// Total rows across all collections
    #[must_use]
    pub fn total(&self) -> usize {
        self.profiles.len() + self.matches.len() + self.messages.len() + self.jobs.len()
    }
}

// ============================================================================
// PushAck
// ============================================================================

/// Server acknowledgement of a pushed mutation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushAck {
    /// Server-assigned identifier, present on create acks when it differs
    /// from the client-supplied temporary one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<EntityId>,
}

// ============================================================================
// TokenProvider
// ============================================================================

/// Supplies the bearer credential for backend calls
///
/// Implementations read whatever the external authentication collaborator
/// last produced. Returning `None` fails the affected queue item; the
/// gateway never blocks waiting for a credential.
pub trait TokenProvider: Send + Sync {
    /// The current access token, if any
    fn access_token(&self) -> Option<String>;
}

/// A fixed token, for tests and single-session tools
pub struct StaticTokenProvider(pub String);

impl TokenProvider for StaticTokenProvider {
    fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

// ============================================================================
// BackendGateway trait
// ============================================================================

/// Port trait for the server's sync contract
#[async_trait::async_trait]
pub trait BackendGateway: Send + Sync {
    /// Fetches deltas changed since `since` (`None` means everything)
    async fn pull(&self, since: Option<DateTime<Utc>>) -> anyhow::Result<PullResponse>;

    /// Pushes one queued mutation to its entity endpoint
    ///
    /// The endpoint and HTTP verb are derived from the item's entity kind
    /// and operation (`create -> POST`, `update -> PUT`, `delete -> DELETE`).
    async fn push(&self, item: &SyncQueueItem) -> anyhow::Result<PushAck>;
}
