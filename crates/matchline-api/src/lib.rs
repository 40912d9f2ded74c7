//! Matchline API - HTTP gateway to the backend sync contract
//!
//! Provides:
//! - [`client`] - Typed HTTP client for the pull endpoint and the
//!   per-entity push endpoints
//! - [`provider`] - [`HttpBackendGateway`], the port adapter, plus token
//!   provider implementations
//!
//! The gateway treats the backend purely as a pair of HTTP surfaces; it
//! forwards whatever bearer credential the token provider hands it and
//! never manages credential lifecycle itself.

pub mod client;
pub mod provider;

pub use client::ApiClient;
pub use provider::{FileTokenProvider, HttpBackendGateway};

use thiserror::Error;

/// Errors raised by backend calls
#[derive(Debug, Error)]
pub enum ApiError {
    /// The HTTP client could not be constructed
    #[error("HTTP client initialization failed: {0}")]
    Init(String),

    /// No network path to the backend
    #[error("Backend unreachable: {0}")]
    Offline(String),

    /// The request exceeded its bounded timeout
    #[error("Request timed out")]
    Timeout,

    /// The server rejected the request
    #[error("API error: {status} - {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, for the queue item's error field
        body: String,
    },

    /// No bearer credential was available at call time
    #[error("No access token available")]
    MissingToken,

    /// The response body could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Classifies a reqwest error into the connectivity taxonomy
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_connect() {
            ApiError::Offline(err.to_string())
        } else {
            ApiError::InvalidResponse(err.to_string())
        }
    }
}
