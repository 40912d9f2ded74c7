//! CLI command implementations

pub mod backup;
pub mod doctor;
pub mod queue;
pub mod status;
pub mod sync;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use matchline_api::{ApiClient, FileTokenProvider, HttpBackendGateway};
use matchline_core::config::Config;
use matchline_core::ports::local_store::LocalStore;
use matchline_store::{DatabasePool, SqliteLocalStore};
use matchline_sync::{NetworkMonitor, SyncEngine};

/// Shared setup for every command: configuration plus an open store
pub struct CliContext {
    pub config: Config,
    pub store: Arc<SqliteLocalStore>,
}

impl CliContext {
    /// Loads configuration and opens the database
    pub async fn open(config_path: &Path) -> Result<Self> {
        let config = Config::load_or_default(config_path);
        let pool = DatabasePool::new(&config.db_path())
            .await
            .context("Failed to open database")?;
        let store = Arc::new(SqliteLocalStore::new(pool.pool().clone()));
        Ok(Self { config, store })
    }

    /// Builds a sync engine against the configured backend
    pub fn engine(&self) -> Result<SyncEngine> {
        let token_path = self
            .config
            .api
            .token_file
            .clone()
            .unwrap_or_else(|| Config::default_path().with_file_name("token"));

        let client = ApiClient::with_timeout(
            self.config.api.base_url.clone(),
            Arc::new(FileTokenProvider::new(token_path)),
            Duration::from_secs(self.config.api.request_timeout_secs),
        )
        .context("Failed to build API client")?;

        Ok(SyncEngine::new(
            self.store.clone() as Arc<dyn LocalStore>,
            Arc::new(HttpBackendGateway::new(client)),
            Arc::new(NetworkMonitor::new(true)),
            &self.config,
        ))
    }

    /// The store as its port type
    pub fn store(&self) -> Arc<dyn LocalStore> {
        self.store.clone()
    }
}
