//! Matchline Store - SQLite implementation of the local store port
//!
//! Provides:
//! - [`pool`] - Connection pool with WAL mode and schema migration
//! - [`repository`] - [`SqliteLocalStore`], the durable typed table set
//!
//! The store owns every table of the sync subsystem: the eight entity
//! tables, the sync queue, and the metadata key-value table. All writes go
//! through SQL transactions; the entity-write-plus-enqueue path commits
//! atomically or not at all.

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteLocalStore;

use thiserror::Error;

/// Errors raised by the SQLite store adapter
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not open or create the database
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A row or queue item could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A document is missing its identifying field
    #[error("Row has no usable id: {0}")]
    MissingId(String),

    /// A snapshot referenced a table the store does not own
    #[error("Unknown table in snapshot: {0}")]
    UnknownTable(String),

    /// Underlying SQL error
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}
