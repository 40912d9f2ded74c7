//! Domain newtypes with validation
//!
//! Strongly-typed identifiers for the sync subsystem. The central type is
//! [`EntityId`], a tagged union distinguishing client-minted temporary
//! identifiers from server-assigned ones, so that every foreign-key-like
//! reference can be rewritten in one pass when the server answers a create.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// EntityId
// ============================================================================

/// Prefix marking a client-generated temporary identifier in string form
const LOCAL_PREFIX: &str = "local:";

/// Identifier of a row in an owned table
///
/// A row created offline carries a `Local` id (random UUID) until the first
/// successful create push; the server then assigns the authoritative
/// `Server` id and the engine rewrites every reference. The string form is
/// `local:<uuid>` for temporary ids and the raw server string otherwise,
/// which keeps the two spaces disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityId {
    /// Client-minted temporary identifier, valid only on this device
    Local(Uuid),
    /// Server-assigned authoritative identifier
    Server(String),
}

impl EntityId {
    /// Mints a fresh temporary identifier for an offline create
    #[must_use]
    pub fn fresh_local() -> Self {
        Self::Local(Uuid::new_v4())
    }

    /// Wraps a server-assigned identifier
    pub fn server(id: impl Into<String>) -> Self {
        Self::Server(id.into())
    }

    /// Returns true if this id is still a temporary local one
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(uuid) => write!(f, "{LOCAL_PREFIX}{uuid}"),
            Self::Server(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for EntityId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DomainError::InvalidEntityId("empty id".to_string()));
        }
        if let Some(raw) = s.strip_prefix(LOCAL_PREFIX) {
            let uuid = Uuid::parse_str(raw)
                .map_err(|e| DomainError::InvalidEntityId(format!("{s}: {e}")))?;
            Ok(Self::Local(uuid))
        } else {
            Ok(Self::Server(s.to_string()))
        }
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// ============================================================================
// EntityKind
// ============================================================================

/// The owned tables of the local store
///
/// Each kind knows its table name and the base path of its push endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Profile,
    JobMatch,
    Message,
    Job,
    Swipe,
    Achievement,
    Conversation,
    Preference,
}

impl EntityKind {
    /// All owned table kinds, in snapshot order
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Profile,
        EntityKind::JobMatch,
        EntityKind::Message,
        EntityKind::Job,
        EntityKind::Swipe,
        EntityKind::Achievement,
        EntityKind::Conversation,
        EntityKind::Preference,
    ];

    /// SQL table name for this kind
    #[must_use]
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Profile => "profiles",
            EntityKind::JobMatch => "matches",
            EntityKind::Message => "messages",
            EntityKind::Job => "jobs",
            EntityKind::Swipe => "swipes",
            EntityKind::Achievement => "achievements",
            EntityKind::Conversation => "conversations",
            EntityKind::Preference => "preferences",
        }
    }

    /// Base path of the push endpoint for this kind
    ///
    /// Kinds without a dedicated endpoint fall back to `/api/<table>`.
    #[must_use]
    pub fn push_path(&self) -> &'static str {
        match self {
            EntityKind::Profile => "/api/profile/candidate",
            EntityKind::Message => "/api/messages",
            EntityKind::Swipe => "/api/swipe",
            EntityKind::Preference => "/api/preferences",
            EntityKind::Achievement => "/api/achievements",
            EntityKind::JobMatch => "/api/matches",
            EntityKind::Job => "/api/jobs",
            EntityKind::Conversation => "/api/conversations",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table())
    }
}

impl FromStr for EntityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profiles" | "profile" => Ok(EntityKind::Profile),
            "matches" | "match" => Ok(EntityKind::JobMatch),
            "messages" | "message" => Ok(EntityKind::Message),
            "jobs" | "job" => Ok(EntityKind::Job),
            "swipes" | "swipe" => Ok(EntityKind::Swipe),
            "achievements" | "achievement" => Ok(EntityKind::Achievement),
            "conversations" | "conversation" => Ok(EntityKind::Conversation),
            "preferences" | "preference" => Ok(EntityKind::Preference),
            other => Err(DomainError::UnknownEntityKind(other.to_string())),
        }
    }
}

// ============================================================================
// QueueItemId
// ============================================================================

/// Identifier for sync queue items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueItemId(Uuid);

impl QueueItemId {
    /// Create a new random QueueItemId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for QueueItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for QueueItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidEntityId(format!("Invalid queue item id: {e}")))
    }
}

// ============================================================================
// ConflictId
// ============================================================================

/// Identifier for conflict records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Create a new random ConflictId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ConflictId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
