//! Owned table rows and their sync metadata
//!
//! Every row in an owned table carries a [`SyncMeta`] block: creation and
//! update timestamps, the time of the last agreement with the server, a
//! [`SyncStatus`], and a monotonically increasing version used as an
//! optimistic-concurrency token on pushes.
//!
//! Rows serialize with camelCase field names and millisecond timestamps to
//! match the backend wire format, so a pulled JSON document deserializes
//! directly into these structs and vice versa.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use super::errors::DomainError;
use super::newtypes::{EntityId, EntityKind};

// ============================================================================
// SyncStatus
// ============================================================================

/// Synchronization state of a single row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Row agrees with the server
    Synced,
    /// Local change awaiting push
    #[default]
    Pending,
    /// Push in flight
    Syncing,
    /// Local and server versions diverged
    Conflict,
    /// Push permanently failed
    Error,
}

impl SyncStatus {
    /// Returns the status name as stored in the database
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Conflict => "conflict",
            SyncStatus::Error => "error",
        }
    }
}

impl Display for SyncStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(SyncStatus::Synced),
            "pending" => Ok(SyncStatus::Pending),
            "syncing" => Ok(SyncStatus::Syncing),
            "conflict" => Ok(SyncStatus::Conflict),
            "error" => Ok(SyncStatus::Error),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown sync status: {other}"
            ))),
        }
    }
}

// ============================================================================
// SyncMeta
// ============================================================================

/// Sync bookkeeping carried by every owned row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    /// When the row was first created (stamped by the store, never skipped)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// When the row was last modified (re-stamped on every write)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    /// Last point of agreement with the server
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Current synchronization state
    #[serde(default)]
    pub sync_status: SyncStatus,
    /// Optimistic-concurrency token, bumped on every local edit
    #[serde(default = "default_version")]
    pub version: i64,
}

fn default_version() -> i64 {
    1
}

impl SyncMeta {
    /// Metadata for a freshly created local row
    #[must_use]
    pub fn new_local(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            last_synced_at: None,
            sync_status: SyncStatus::Pending,
            version: 1,
        }
    }

    /// Metadata for a row received from the server (authoritative)
    #[must_use]
    pub fn from_server(now: DateTime<Utc>, updated_at: DateTime<Utc>, version: i64) -> Self {
        Self {
            created_at: updated_at,
            updated_at,
            last_synced_at: Some(now),
            sync_status: SyncStatus::Synced,
            version,
        }
    }

    /// Marks the row as in agreement with the server
    pub fn mark_synced(&mut self, now: DateTime<Utc>) {
        self.last_synced_at = Some(now);
        self.sync_status = SyncStatus::Synced;
    }

    /// Records a local edit: bumps the version and flags the row pending
    pub fn mark_edited(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
        self.sync_status = SyncStatus::Pending;
    }
}

// ============================================================================
// OwnedRow
// ============================================================================

/// Common surface of every owned table row
///
/// The store and engine mostly move rows around as opaque JSON documents;
/// this trait is the typed window used for stamping, integrity checks, and
/// tests.
pub trait OwnedRow: Serialize + DeserializeOwned {
    /// The table this row type belongs to
    const KIND: EntityKind;

    /// Row identifier
    fn id(&self) -> &EntityId;

    /// Sync metadata block
    fn meta(&self) -> &SyncMeta;

    /// Mutable sync metadata block
    fn meta_mut(&mut self) -> &mut SyncMeta;

    /// Serializes the row to its JSON document form
    fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("owned rows always serialize")
    }
}

// ============================================================================
// Row types
// ============================================================================

/// A candidate profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: EntityId,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

/// A candidate/job pairing produced by the matching service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMatch {
    pub id: EntityId,
    pub candidate_id: String,
    pub job_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

/// A chat message within a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: EntityId,
    pub match_id: EntityId,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

/// A job posting mirrored from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: EntityId,
    pub company_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: String,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

/// A recorded swipe decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swipe {
    pub id: EntityId,
    pub user_id: String,
    pub target_id: String,
    pub direction: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub swiped_at: DateTime<Utc>,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

/// An unlocked achievement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: EntityId,
    pub user_id: String,
    pub achievement_key: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub unlocked_at: DateTime<Utc>,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

/// A conversation summary for a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: EntityId,
    pub match_id: EntityId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity_at: DateTime<Utc>,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

/// Per-user preference document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preference {
    pub id: EntityId,
    pub user_id: String,
    #[serde(default)]
    pub settings: Value,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

macro_rules! impl_owned_row {
    ($ty:ident, $kind:expr) => {
        impl OwnedRow for $ty {
            const KIND: EntityKind = $kind;

            fn id(&self) -> &EntityId {
                &self.id
            }

            fn meta(&self) -> &SyncMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut SyncMeta {
                &mut self.meta
            }
        }
    };
}

impl_owned_row!(Profile, EntityKind::Profile);
impl_owned_row!(JobMatch, EntityKind::JobMatch);
impl_owned_row!(Message, EntityKind::Message);
impl_owned_row!(Job, EntityKind::Job);
impl_owned_row!(Swipe, EntityKind::Swipe);
impl_owned_row!(Achievement, EntityKind::Achievement);
impl_owned_row!(Conversation, EntityKind::Conversation);
impl_owned_row!(Preference, EntityKind::Preference);

// ============================================================================
// JSON document helpers
// ============================================================================

/// Extracts the row identifier from a JSON document
#[must_use]
pub fn row_id(doc: &Value) -> Option<EntityId> {
    doc.get("id")?.as_str()?.parse().ok()
}

/// Extracts the `updatedAt` millisecond timestamp from a JSON document
#[must_use]
pub fn row_updated_at(doc: &Value) -> Option<DateTime<Utc>> {
    let millis = doc.get("updatedAt")?.as_i64()?;
    DateTime::<Utc>::from_timestamp_millis(millis)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> Profile {
        Profile {
            id: EntityId::server("profile-1"),
            user_id: "user-1".to_string(),
            headline: Some("Systems engineer".to_string()),
            bio: None,
            skills: vec!["rust".to_string(), "sql".to_string()],
            location: None,
            meta: SyncMeta::new_local(Utc::now()),
        }
    }

    #[test]
    fn test_profile_serializes_camel_case() {
        let profile = sample_profile();
        let doc = profile.to_value();
        assert!(doc.get("userId").is_some());
        assert!(doc.get("updatedAt").is_some());
        assert!(doc.get("createdAt").is_some());
        assert_eq!(doc.get("syncStatus").unwrap(), "pending");
    }

    #[test]
    fn test_profile_round_trip() {
        let profile = sample_profile();
        let doc = profile.to_value();
        let back: Profile = serde_json::from_value(doc).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn test_row_id_and_updated_at_helpers() {
        let profile = sample_profile();
        let doc = profile.to_value();
        assert_eq!(row_id(&doc).unwrap(), EntityId::server("profile-1"));
        // ts_milliseconds truncates below a millisecond
        let extracted = row_updated_at(&doc).unwrap();
        assert_eq!(extracted.timestamp_millis(), profile.meta.updated_at.timestamp_millis());
    }

    #[test]
    fn test_mark_edited_bumps_version_and_flags_pending() {
        let mut profile = sample_profile();
        profile.meta.mark_synced(Utc::now());
        assert_eq!(profile.meta.sync_status, SyncStatus::Synced);

        let before = profile.meta.version;
        profile.meta.mark_edited(Utc::now());
        assert_eq!(profile.meta.version, before + 1);
        assert_eq!(profile.meta.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn test_server_row_deserializes_without_sync_fields() {
        // A pulled document has no syncStatus/lastSyncedAt; serde defaults apply.
        let doc = serde_json::json!({
            "id": "job-9",
            "companyId": "acme",
            "title": "Backend engineer",
            "status": "open",
            "createdAt": 1_700_000_000_000_i64,
            "updatedAt": 1_700_000_100_000_i64,
        });
        let job: Job = serde_json::from_value(doc).unwrap();
        assert_eq!(job.meta.sync_status, SyncStatus::Pending);
        assert_eq!(job.meta.version, 1);
        assert!(job.meta.last_synced_at.is_none());
    }

    #[test]
    fn test_sync_status_parse() {
        assert_eq!("synced".parse::<SyncStatus>().unwrap(), SyncStatus::Synced);
        assert_eq!("conflict".parse::<SyncStatus>().unwrap(), SyncStatus::Conflict);
        assert!("bogus".parse::<SyncStatus>().is_err());
    }
}
