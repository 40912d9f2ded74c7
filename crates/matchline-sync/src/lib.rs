//! Matchline Sync - Pull-then-push synchronization engine
//!
//! Provides:
//! - [`engine`] - The sync cycle orchestrator (pull, push, metadata) with
//!   conflict routing and temporary-id reconciliation
//! - [`network`] - Online/offline state tracking with change notifications
//! - [`scheduler`] - Periodic, connectivity, and manual sync triggers
//!
//! ## Cycle shape
//!
//! ```text
//! trigger ──► try_sync ──► Pull ──► Push (drain queue) ──► Metadata
//!                │            │
//!                │            └─ conflict? ──► ConflictResolver
//!                └─ offline or already syncing: no-op
//! ```

pub mod engine;
pub mod network;
pub mod scheduler;

pub use engine::{PushSummary, SyncEngine, SyncOutcome, SyncStatusEvent, SyncSummary};
pub use network::NetworkMonitor;
pub use scheduler::SyncScheduler;
