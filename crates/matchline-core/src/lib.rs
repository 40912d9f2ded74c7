//! Matchline Core - Domain logic for the offline-first sync engine
//!
//! This crate contains the pure domain layer shared by every other
//! Matchline crate:
//!
//! - [`domain`] - Entities, identifiers, the sync queue item state machine,
//!   and conflict records
//! - [`ports`] - Interfaces to the outside world (local store, backend
//!   gateway, foreground notifier)
//! - [`config`] - Typed configuration loaded from YAML
//!
//! No I/O happens here; adapters live in `matchline-store`,
//! `matchline-api`, and the binaries.

pub mod config;
pub mod domain;
pub mod ports;

pub use domain::{
    conflict::{Conflict, ConflictStrategy},
    entity::{
        Achievement, Conversation, Job, JobMatch, Message, OwnedRow, Preference, Profile, Swipe,
        SyncMeta, SyncStatus,
    },
    errors::DomainError,
    newtypes::{ConflictId, EntityId, EntityKind, QueueItemId},
    queue::{Operation, Priority, QueueStatus, SyncQueueItem},
};
