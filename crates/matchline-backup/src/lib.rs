//! Matchline Backup - Snapshots, integrity checking, and self-healing
//!
//! Provides:
//! - [`snapshot`] - Whole-store export/import as one versioned document
//! - [`integrity`] - Consistency scan over the owned tables and the queue
//! - [`repair`] - Deletes broken rows and recovers crashed sync claims
//! - [`service`] - File-based backups and the periodic auto-backup task

pub mod integrity;
pub mod repair;
pub mod service;
pub mod snapshot;

pub use integrity::{IntegrityChecker, IntegrityIssue, IntegrityReport, Severity};
pub use repair::{AutoRepairOutcome, RepairReport, Repairer};
pub use service::{AutoBackupInfo, BackupService};
pub use snapshot::{BackupDocument, EntityExport};

use thiserror::Error;

/// Errors raised by backup and recovery operations
#[derive(Debug, Error)]
pub enum BackupError {
    /// The backup document's version tag is not supported
    #[error("Unsupported backup version: {0}")]
    UnsupportedVersion(u32),

    /// A per-entity export targeted a different table than the restore
    #[error("Backup type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
    },

    /// The backup file could not be read or written
    #[error("Backup I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backup document could not be parsed
    #[error("Malformed backup document: {0}")]
    Malformed(String),

    /// The underlying store operation failed
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
