//! Backend API client
//!
//! Provides a typed HTTP client for the sync contract: one pull endpoint
//! returning per-collection deltas, and per-entity push endpoints whose
//! verb follows the operation kind (`create -> POST`, `update -> PUT`,
//! `delete -> DELETE`).
//!
//! Every request carries a bearer credential obtained from the
//! [`TokenProvider`] at call time and runs under a bounded timeout; a
//! timeout is reported like any other failure so the queue's backoff
//! bookkeeping treats them uniformly.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use matchline_core::domain::queue::{Operation, SyncQueueItem};
use matchline_core::ports::backend::{PullResponse, PushAck, TokenProvider};

use crate::ApiError;

/// Default per-request timeout (seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Typed HTTP client for the Matchline backend
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl ApiClient {
    /// Creates a client with the default timeout
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, tokens, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a client with an explicit per-request timeout
    pub fn with_timeout(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Init(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Attaches the bearer credential to a request
    ///
    /// A missing token fails the call immediately; the engine parks the
    /// affected queue item rather than waiting for authentication.
    fn authorize(&self, builder: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.tokens.access_token().ok_or(ApiError::MissingToken)?;
        Ok(builder.bearer_auth(token))
    }

    /// Fetches server deltas changed since `since`
    ///
    /// `None` means "everything" and is sent as `since: 0`, matching the
    /// first-sync behavior the backend expects.
    pub async fn pull(&self, since: Option<DateTime<Utc>>) -> Result<PullResponse, ApiError> {
        let since_ms = since.map_or(0, |t| t.timestamp_millis());
        let url = format!("{}/api/sync/pull", self.base_url);

        debug!(%url, since_ms, "Pulling server deltas");

        let request = self
            .authorize(self.http.post(&url))?
            .json(&serde_json::json!({ "since": since_ms }));

        let response = request.send().await.map_err(ApiError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<PullResponse>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Pushes one queued mutation to its entity endpoint
    pub async fn push(&self, item: &SyncQueueItem) -> Result<PushAck, ApiError> {
        let (method, url) = self.endpoint_for(item);

        debug!(
            %url,
            method = %method,
            entity = %item.entity,
            entity_id = %item.entity_id,
            "Pushing queued mutation"
        );

        let mut request = self.authorize(self.http.request(method, &url))?;

        if item.operation != Operation::Delete {
            // The row version rides along as an optimistic-concurrency
            // token; a stale push comes back as a 409 and is handled like
            // any other rejection.
            if let Some(version) = item.payload.get("version").and_then(Value::as_i64) {
                request = request.header("If-Match", version.to_string());
            }
            request = request.json(&item.payload);
        }

        let response = request.send().await.map_err(ApiError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // Delete acks carry no body worth parsing.
        if item.operation == Operation::Delete {
            return Ok(PushAck::default());
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        Ok(PushAck {
            server_id: extract_server_id(&body),
        })
    }

    /// Resolves the HTTP verb and URL for a queued mutation
    ///
    /// Creates post to the entity's base path; updates and deletes address
    /// the specific row.
    fn endpoint_for(&self, item: &SyncQueueItem) -> (Method, String) {
        let base = format!("{}{}", self.base_url, item.entity.push_path());
        match item.operation {
            Operation::Create => (Method::POST, base),
            Operation::Update => (Method::PUT, format!("{base}/{}", item.entity_id)),
            Operation::Delete => (Method::DELETE, format!("{base}/{}", item.entity_id)),
        }
    }
}

/// Pulls the server-assigned id out of a push acknowledgement
///
/// The backend wraps created rows as `{"data": {"id": ...}}`; a bare
/// top-level `id` is accepted as well.
fn extract_server_id(body: &Value) -> Option<matchline_core::domain::newtypes::EntityId> {
    let id = body
        .get("data")
        .and_then(|d| d.get("id"))
        .or_else(|| body.get("id"))?
        .as_str()?;
    id.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchline_core::domain::newtypes::{EntityId, EntityKind};
    use matchline_core::domain::queue::Priority;
    use matchline_core::ports::backend::StaticTokenProvider;

    fn client() -> ApiClient {
        ApiClient::new(
            "https://api.example.com/",
            Arc::new(StaticTokenProvider("token".to_string())),
        )
        .unwrap()
    }

    fn item(operation: Operation) -> SyncQueueItem {
        SyncQueueItem::new(
            operation,
            EntityKind::Swipe,
            EntityId::server("swipe-1"),
            serde_json::json!({"id": "swipe-1"}),
            Priority::High,
        )
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = client();
        let (_, url) = client.endpoint_for(&item(Operation::Create));
        assert_eq!(url, "https://api.example.com/api/swipe");
    }

    #[test]
    fn test_endpoint_verbs() {
        let client = client();

        let (method, url) = client.endpoint_for(&item(Operation::Create));
        assert_eq!(method, Method::POST);
        assert_eq!(url, "https://api.example.com/api/swipe");

        let (method, url) = client.endpoint_for(&item(Operation::Update));
        assert_eq!(method, Method::PUT);
        assert_eq!(url, "https://api.example.com/api/swipe/swipe-1");

        let (method, url) = client.endpoint_for(&item(Operation::Delete));
        assert_eq!(method, Method::DELETE);
        assert_eq!(url, "https://api.example.com/api/swipe/swipe-1");
    }

    #[test]
    fn test_extract_server_id_wrapped_and_bare() {
        let wrapped = serde_json::json!({"data": {"id": "srv-1"}});
        assert_eq!(
            extract_server_id(&wrapped),
            Some(EntityId::server("srv-1"))
        );

        let bare = serde_json::json!({"id": "srv-2"});
        assert_eq!(extract_server_id(&bare), Some(EntityId::server("srv-2")));

        let empty = serde_json::json!({"ok": true});
        assert_eq!(extract_server_id(&empty), None);
    }
}
