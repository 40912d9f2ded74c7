//! Port adapters around the API client
//!
//! [`HttpBackendGateway`] implements the `BackendGateway` port on top of
//! [`ApiClient`]; [`FileTokenProvider`] reads the bearer credential the
//! external authentication collaborator drops into a file, re-read at
//! every call so token rotation needs no process restart.

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};

use matchline_core::domain::queue::SyncQueueItem;
use matchline_core::ports::backend::{BackendGateway, PullResponse, PushAck, TokenProvider};

use crate::ApiClient;

// ============================================================================
// HttpBackendGateway
// ============================================================================

/// The production backend gateway
pub struct HttpBackendGateway {
    client: ApiClient,
}

impl HttpBackendGateway {
    /// Wraps an API client as the backend gateway port
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl BackendGateway for HttpBackendGateway {
    async fn pull(&self, since: Option<DateTime<Utc>>) -> anyhow::Result<PullResponse> {
        self.client
            .pull(since)
            .await
            .context("Pull request failed")
    }

    async fn push(&self, item: &SyncQueueItem) -> anyhow::Result<PushAck> {
        self.client
            .push(item)
            .await
            .with_context(|| format!("Push failed for {} {}", item.entity, item.entity_id))
    }
}

// ============================================================================
// FileTokenProvider
// ============================================================================

/// Reads the bearer token from a file owned by the auth collaborator
///
/// Returns `None` when the file is missing or empty, which fails the
/// affected queue item instead of blocking the drain.
pub struct FileTokenProvider {
    path: PathBuf,
}

impl FileTokenProvider {
    /// Creates a provider reading from the given path
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TokenProvider for FileTokenProvider {
    fn access_token(&self) -> Option<String> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let token = raw.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }
}
