use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use blobs_store::{
    Database, DatabaseError, ExternalStorageConfig, HybridDataProvider, RetryPolicy,
    SqlBlobPersistence, DEFAULT_SCOPE,
};

/// Directory name under the platform config/data dirs
pub const APP_DIR_NAME: &str = "mediastore";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "mediastore.db";

/// Logging settings. `RUST_LOG` takes precedence when set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// On-disk application configuration (`config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite metadata database
    pub database: PathBuf,
    /// Template scope scanned for live blob references
    pub scope: String,
    /// Seconds between scheduled cleanup runs
    pub cleanup_interval_secs: u64,
    pub cleanup_retry: RetryPolicy,
    pub logging: LoggingConfig,
    pub external: ExternalStorageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let database = dirs::data_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DB_FILE_NAME);

        Self {
            database,
            scope: DEFAULT_SCOPE.to_string(),
            cleanup_interval_secs: 3600,
            cleanup_retry: RetryPolicy::default(),
            logging: LoggingConfig::default(),
            external: ExternalStorageConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

/// Loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config_path: PathBuf,
    pub config: AppConfig,
}

impl AppState {
    /// Resolve the config file path, defaulting to
    /// `<config dir>/mediastore/config.toml`.
    pub fn config_path(custom: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom {
            return Ok(path);
        }
        let dir = dirs::config_dir().ok_or(StateError::NoConfigDir)?;
        Ok(dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load an existing configuration.
    pub fn load(custom: Option<PathBuf>) -> Result<Self, StateError> {
        let config_path = Self::config_path(custom)?;
        if !config_path.exists() {
            return Err(StateError::NotInitialized(config_path));
        }

        let raw = std::fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&raw)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Write `config` (or the defaults) to the config path.
    ///
    /// Refuses to overwrite an existing file unless `force` is set.
    pub fn init(
        custom: Option<PathBuf>,
        config: Option<AppConfig>,
        force: bool,
    ) -> Result<Self, StateError> {
        let config_path = Self::config_path(custom)?;
        if config_path.exists() && !force {
            return Err(StateError::AlreadyInitialized(config_path));
        }

        let config = config.unwrap_or_default();
        write_config(&config_path, &config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Open the metadata database and build the blob data provider.
    pub async fn open_provider(&self) -> Result<HybridDataProvider, StateError> {
        let db = Database::new(&self.config.database).await?;
        let fallback = Arc::new(SqlBlobPersistence::new(db.clone()));

        Ok(HybridDataProvider::from_config(
            db,
            fallback,
            &self.config.external,
            self.config.scope.clone(),
            self.config.cleanup_retry,
        ))
    }
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw = toml::to_string_pretty(config)?;
    std::fs::write(path, raw)?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("could not determine the user config directory")]
    NoConfigDir,

    #[error("no config at {0}, run `mediastore init` first")]
    NotInitialized(PathBuf),

    #[error("config already exists at {0}, pass --force to overwrite")]
    AlreadyInitialized(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}
