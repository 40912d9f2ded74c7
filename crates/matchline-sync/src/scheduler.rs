//! Sync scheduler - turns time, connectivity, and user intent into cycles
//!
//! The [`SyncScheduler`] owns every trigger into the engine's `Syncing`
//! state:
//!
//! - application-launch bootstrap (one cycle at startup)
//! - a periodic interval timer
//! - the device coming online
//! - explicit manual invocation via [`request_sync`](SyncScheduler::request_sync)
//!
//! The engine's own concurrency guard makes overlapping triggers harmless,
//! so the scheduler fires them without further coordination. The run loop
//! terminates on cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{SyncEngine, SyncOutcome};
use crate::network::NetworkMonitor;

/// Schedules sync cycles from periodic, connectivity, and manual triggers
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    network: Arc<NetworkMonitor>,
    interval: Duration,
    manual: Arc<Notify>,
    shutdown: CancellationToken,
}

impl SyncScheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    /// * `engine` - The engine to trigger
    /// * `network` - Connectivity source for online-transition triggers
    /// * `interval` - Period between timer-driven cycles
    /// * `shutdown` - Token that terminates the run loop
    pub fn new(
        engine: Arc<SyncEngine>,
        network: Arc<NetworkMonitor>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine,
            network,
            interval,
            manual: Arc::new(Notify::new()),
            shutdown,
        }
    }

    /// Requests an immediate sync, bypassing the interval timer
    ///
    /// Used for user-initiated "sync now" actions. Safe to call from any
    /// task; coalesces with an already-waiting notification.
    pub fn request_sync(&self) {
        info!("Manual sync requested");
        self.manual.notify_one();
    }

    /// Main scheduling loop
    ///
    /// Runs until the shutdown token is cancelled. The first tick fires
    /// immediately, giving the application-launch bootstrap sync.
    pub async fn run(&self) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Sync scheduler starting"
        );

        let mut timer = tokio::time::interval(self.interval);
        let mut online_rx = self.network.subscribe();

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.trigger("interval").await;
                }
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        // Monitor dropped; timer and manual triggers remain.
                        continue;
                    }
                    if *online_rx.borrow() {
                        self.trigger("online").await;
                    }
                }
                _ = self.manual.notified() => {
                    self.trigger("manual").await;
                }
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received, scheduler stopping");
                    break;
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    /// Fires one sync attempt, logging the outcome
    async fn trigger(&self, source: &str) {
        debug!(source, "Sync trigger");
        match self.engine.try_sync().await {
            Ok(SyncOutcome::Completed(_)) => {}
            Ok(SyncOutcome::SkippedOffline) => debug!(source, "Trigger skipped: offline"),
            Ok(SyncOutcome::SkippedBusy) => debug!(source, "Trigger skipped: cycle running"),
            Err(e) => warn!(source, error = format!("{e:#}"), "Sync cycle failed"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_stops_future_runs() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_manual_notify_coalesces() {
        let notify = Arc::new(Notify::new());
        notify.notify_one();
        notify.notify_one();

        // One permit is stored; the first wait consumes it...
        tokio::time::timeout(Duration::from_millis(100), notify.notified())
            .await
            .expect("Stored permit should wake immediately");
        // ...and a second wait would block.
        assert!(
            tokio::time::timeout(Duration::from_millis(50), notify.notified())
                .await
                .is_err()
        );
    }
}
