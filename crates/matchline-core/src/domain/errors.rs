//! Domain error types
//!
//! Validation failures and invalid state transitions raised by domain
//! constructors and entity methods.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid entity identifier format
    #[error("Invalid entity id: {0}")]
    InvalidEntityId(String),

    /// Unknown entity kind name
    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Unknown queue status name
    #[error("Unknown queue status: {0}")]
    UnknownQueueStatus(String),

    /// Unknown operation name
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Unknown priority name
    #[error("Unknown priority: {0}")]
    UnknownPriority(String),

    /// Unknown conflict strategy name
    #[error("Unknown conflict strategy: {0}")]
    UnknownStrategy(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
