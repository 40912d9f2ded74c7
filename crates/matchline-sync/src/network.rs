//! Network state tracking
//!
//! Online/offline is an orthogonal dimension of the engine's state machine:
//! it gates whether a sync cycle may start, but may flip at any moment,
//! including mid-cycle. The monitor is a thin wrapper over a watch channel;
//! the platform integration (or a test) feeds it via [`set_online`].
//!
//! [`set_online`]: NetworkMonitor::set_online

use tokio::sync::watch;
use tracing::info;

/// Tracks device connectivity and notifies subscribers of changes
pub struct NetworkMonitor {
    tx: watch::Sender<bool>,
}

impl NetworkMonitor {
    /// Creates a monitor with the given initial state
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx }
    }

    /// Reports a connectivity change
    ///
    /// Subscribers are only woken when the state actually flips.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                info!("Network restored");
            } else {
                info!("Network lost, switching to offline mode");
            }
        }
    }

    /// Current connectivity state
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribes to connectivity changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Waits until the device is online
    pub async fn wait_until_online(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
