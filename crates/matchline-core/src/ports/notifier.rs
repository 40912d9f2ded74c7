//! Foreground notification port
//!
//! The background agent replays the queue while the foreground engine is
//! not running; when a replay finishes it signals the foreground so cached
//! in-memory state can be refreshed from the now-current local store.
//! Coordination stays storage-level, so the default implementation is a
//! metadata write rather than an in-process channel.

#[async_trait::async_trait]
pub trait ForegroundNotifier: Send + Sync {
    /// Signals that a background queue replay finished
    async fn replay_completed(&self, pushed: u64, failed: u64) -> anyhow::Result<()>;
}
