//! Matchline Conflict - Conflict detection and resolution
//!
//! Provides:
//! - [`detector`] - Flags rows where both sides changed since the last
//!   agreement point
//! - [`policy`] - Per-entity-kind strategy table
//! - [`merge`] - Field-by-field reconciliation of two row versions
//! - [`resolver`] - Applies the chosen strategy and writes the winner back

pub mod detector;
pub mod merge;
pub mod policy;
pub mod resolver;

pub use detector::{ConflictDetector, DetectionResult};
pub use policy::StrategyPolicy;
pub use resolver::{ConflictResolver, Resolution};

use thiserror::Error;

/// Errors that can occur during conflict handling
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The conflict was already resolved
    #[error("Conflict already resolved: {0}")]
    AlreadyResolved(String),

    /// A version document was malformed
    #[error("Malformed version document: {0}")]
    MalformedVersion(String),

    /// Writing the resolution back to the store failed
    #[error("Resolution failed: {0}")]
    ResolutionFailed(String),
}
