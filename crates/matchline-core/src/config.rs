//! Configuration module for Matchline.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation, and sensible defaults for every section.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration for Matchline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub sync: SyncConfig,
    pub api: ApiConfig,
    pub queue: QueueConfig,
    pub conflicts: ConflictsConfig,
    pub backup: BackupConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between periodic sync cycles.
    pub interval_secs: u64,
    /// Seconds the background agent waits between wake-ups.
    pub agent_wake_secs: u64,
}

/// Backend API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the backend, e.g. `https://api.matchline.app`.
    pub base_url: String,
    /// Seconds before an individual request is abandoned.
    pub request_timeout_secs: u64,
    /// File the authentication collaborator drops the bearer token into.
    /// `None` means no token is available and pushes will park.
    pub token_file: Option<PathBuf>,
}

/// Sync queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Delivery attempts before an item is parked as failed.
    pub max_attempts: u32,
}

/// Conflict resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictsConfig {
    /// Default strategy when no per-entity rule matches: `local-wins`,
    /// `server-wins`, `merge-fields`, `keep-both`, or `manual`.
    pub default_strategy: String,
    /// Per-entity overrides, keyed by table name.
    #[serde(default)]
    pub strategies: BTreeMap<String, String>,
}

/// Backup and recovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Seconds between automatic snapshots.
    pub auto_interval_secs: u64,
    /// Auto-backup is skipped when the store holds more rows than this.
    pub auto_row_limit: u64,
    /// Path of the auto-backup side-channel file.
    pub auto_path: Option<PathBuf>,
}

/// Local storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the SQLite database file.
    pub db_path: Option<PathBuf>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            agent_wake_secs: 300,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            request_timeout_secs: 30,
            token_file: None,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl Default for ConflictsConfig {
    fn default() -> Self {
        let mut strategies = BTreeMap::new();
        strategies.insert("profiles".to_string(), "merge-fields".to_string());
        strategies.insert("preferences".to_string(), "merge-fields".to_string());
        strategies.insert("messages".to_string(), "keep-both".to_string());
        strategies.insert("swipes".to_string(), "keep-both".to_string());
        strategies.insert("achievements".to_string(), "keep-both".to_string());
        Self {
            default_strategy: "server-wins".to_string(),
            strategies,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            auto_interval_secs: 3600,
            auto_row_limit: 1000,
            auto_path: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: None }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Default path of the configuration file
    /// (`~/.config/matchline/config.yaml`).
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("matchline")
            .join("config.yaml")
    }

    /// Default path of the database file
    /// (`~/.local/share/matchline/matchline.db`).
    #[must_use]
    pub fn default_db_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("matchline")
            .join("matchline.db")
    }

    /// Resolves the database path, falling back to the default location.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.storage
            .db_path
            .clone()
            .unwrap_or_else(Self::default_db_path)
    }

    /// Resolves the auto-backup path, defaulting next to the database file.
    #[must_use]
    pub fn auto_backup_path(&self) -> PathBuf {
        self.backup
            .auto_path
            .clone()
            .unwrap_or_else(|| self.db_path().with_extension("backup.json"))
    }

    /// Loads configuration from a YAML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration, falling back to defaults if the file is missing
    /// or invalid.
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Saves the configuration as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_yaml::to_string(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sync.interval_secs == 0 {
            anyhow::bail!("sync.interval_secs must be positive");
        }
        if self.api.base_url.is_empty() {
            anyhow::bail!("api.base_url must not be empty");
        }
        if self.api.request_timeout_secs == 0 || self.api.request_timeout_secs > 300 {
            anyhow::bail!("api.request_timeout_secs must be between 1 and 300");
        }
        if self.queue.max_attempts == 0 {
            anyhow::bail!("queue.max_attempts must be positive");
        }
        if self.backup.auto_row_limit == 0 {
            anyhow::bail!("backup.auto_row_limit must be positive");
        }
        Ok(())
    }
}
