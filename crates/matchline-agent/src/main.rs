//! Matchline Agent - Background queue replay service
//!
//! This binary replays the sync queue while the foreground application is
//! not running. It shares the same SQLite file as the foreground engine
//! (WAL mode) and coordinates with it purely through storage-level
//! invariants - the one-processing-claim-per-entity rule in the queue's
//! claim query - never through in-memory locks, since the two are separate
//! OS processes.
//!
//! # Behavior
//!
//! - On startup, stale `processing` claims left by a crashed foreground
//!   cycle are reset to `pending`
//! - On each wake (periodic timer or connectivity restoration) the queue
//!   is drained through the same push path as the foreground engine, with
//!   identical retry/backoff bookkeeping
//! - After a replay that moved items, the foreground is notified through
//!   a metadata write so cached state can be refreshed
//! - An hourly auto-backup snapshot runs alongside, bounded by the
//!   configured row limit
//! - Graceful shutdown on SIGTERM/SIGINT via a `CancellationToken`

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use matchline_api::{ApiClient, FileTokenProvider, HttpBackendGateway};
use matchline_backup::BackupService;
use matchline_core::config::Config;
use matchline_core::ports::local_store::{LocalStore, META_AGENT_LAST_REPLAY_AT};
use matchline_core::ports::notifier::ForegroundNotifier;
use matchline_store::{DatabasePool, SqliteLocalStore};
use matchline_sync::{NetworkMonitor, SyncEngine};

/// Stale processing claims older than this are recovered at startup
const STALE_CLAIM_MINUTES: i64 = 5;

// ============================================================================
// Foreground notification
// ============================================================================

/// Notifies the foreground through the shared metadata table
///
/// The foreground polls `agent_last_replay_at` (or observes it on its next
/// cycle) and refreshes cached in-memory state from the store.
struct MetadataNotifier {
    store: Arc<dyn LocalStore>,
}

#[async_trait::async_trait]
impl ForegroundNotifier for MetadataNotifier {
    async fn replay_completed(&self, pushed: u64, failed: u64) -> Result<()> {
        let now = Utc::now();
        self.store
            .set_meta(
                META_AGENT_LAST_REPLAY_AT,
                serde_json::json!({
                    "at": now.timestamp_millis(),
                    "pushed": pushed,
                    "failed": failed,
                }),
                now,
            )
            .await?;
        info!(pushed, failed, "Foreground notified of background replay");
        Ok(())
    }
}

// ============================================================================
// AgentService
// ============================================================================

/// Main agent service owning the replay loop
struct AgentService {
    config: Config,
    store: Arc<SqliteLocalStore>,
    engine: Arc<SyncEngine>,
    network: Arc<NetworkMonitor>,
    notifier: MetadataNotifier,
    shutdown: CancellationToken,
}

impl AgentService {
    /// Loads configuration, opens the shared database, and wires the engine
    async fn new(shutdown: CancellationToken) -> Result<Self> {
        let config_path = Config::default_path();
        let config = Config::load_or_default(&config_path);
        info!(config_path = %config_path.display(), "Loaded configuration");

        let db_path = config.db_path();
        let pool = DatabasePool::new(&db_path)
            .await
            .context("Failed to open database")?;
        let store = Arc::new(SqliteLocalStore::new(pool.pool().clone()));

        let token_path = config.api.token_file.clone().unwrap_or_else(|| {
            Config::default_path()
                .with_file_name("token")
        });
        let client = ApiClient::with_timeout(
            config.api.base_url.clone(),
            Arc::new(FileTokenProvider::new(token_path)),
            Duration::from_secs(config.api.request_timeout_secs),
        )
        .context("Failed to build API client")?;
        let gateway = Arc::new(HttpBackendGateway::new(client));

        let network = Arc::new(NetworkMonitor::new(true));
        let engine = Arc::new(SyncEngine::new(
            store.clone() as Arc<dyn LocalStore>,
            gateway,
            network.clone(),
            &config,
        ));

        Ok(Self {
            notifier: MetadataNotifier {
                store: store.clone(),
            },
            config,
            store,
            engine,
            network,
            shutdown,
        })
    }

    /// Runs the agent until shutdown
    async fn run(&self) -> Result<()> {
        // Recover claims left behind by a crashed foreground cycle before
        // touching the queue ourselves.
        let recovered = self
            .store
            .reset_stale_processing(chrono::Duration::minutes(STALE_CLAIM_MINUTES), Utc::now())
            .await
            .context("Failed to reset stale processing claims")?;
        if recovered > 0 {
            warn!(recovered, "Recovered stale queue claims at startup");
        }

        // Hourly auto-backup alongside the replay loop.
        let backup = BackupService::new(
            self.store.clone() as Arc<dyn LocalStore>,
            &self.config.backup,
            self.config.auto_backup_path(),
        );
        let backup_shutdown = self.shutdown.clone();
        let backup_task = tokio::spawn(async move {
            backup.run_auto_backup_loop(backup_shutdown).await;
        });

        self.replay_loop().await;

        backup_task.await.ok();
        Ok(())
    }

    /// Wake loop: periodic timer plus connectivity-restored events
    async fn replay_loop(&self) {
        let wake = Duration::from_secs(self.config.sync.agent_wake_secs);
        info!(wake_secs = wake.as_secs(), "Agent replay loop starting");

        let mut timer = tokio::time::interval(wake);
        let mut online_rx = self.network.subscribe();

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.replay("wake").await;
                }
                changed = online_rx.changed() => {
                    if changed.is_ok() && *online_rx.borrow() {
                        self.replay("online").await;
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!("Agent replay loop stopped");
    }

    /// Drains the queue once and notifies the foreground
    async fn replay(&self, source: &str) {
        if !self.network.is_online() {
            debug!(source, "Skipping replay: offline");
            return;
        }

        match self.engine.drain_queue().await {
            Ok(summary) => {
                if summary.pushed == 0 && summary.failed == 0 {
                    debug!(source, "Queue empty, nothing to replay");
                    return;
                }
                if let Err(e) = self
                    .notifier
                    .replay_completed(summary.pushed, summary.failed)
                    .await
                {
                    warn!(error = %e, "Failed to notify foreground");
                }
            }
            Err(e) => {
                error!(source, error = format!("{e:#}"), "Queue replay failed");
            }
        }
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!("Matchline agent starting (matchlined)");

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = AgentService::new(shutdown_token.clone()).await?;
    let result = service.run().await;

    match &result {
        Ok(()) => info!("Matchline agent shut down gracefully"),
        Err(e) => error!(error = %e, "Matchline agent exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
