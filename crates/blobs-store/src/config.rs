//! Configuration for the external object store.
//!
//! Everything in [`RequestOptions`] is handed through to the object store
//! client; the provider does not re-implement retries or timeouts itself
//! beyond bounding each call by `max_execution_time_secs`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level external storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalStorageConfig {
    /// Master switch. When false every operation goes to default persistence.
    #[serde(default)]
    pub enabled: bool,
    /// Which backend to use; `None` behaves like `enabled = false`.
    #[serde(default)]
    pub provider: Option<ObjectStoreConfig>,
    #[serde(default)]
    pub options: RequestOptions,
}

impl ExternalStorageConfig {
    /// The configured provider, if external storage is switched on.
    pub fn active_provider(&self) -> Option<&ObjectStoreConfig> {
        if self.enabled {
            self.provider.as_ref()
        } else {
            None
        }
    }
}

/// Object storage backend selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ObjectStoreConfig {
    /// S3 or any S3-compatible service (MinIO, R2, ...).
    S3 {
        endpoint: Option<String>,
        access_key: String,
        secret_key: String,
        bucket: String,
        region: Option<String>,
    },
    /// Azure Blob Storage.
    Azure {
        account: String,
        access_key: String,
        container: String,
        #[serde(default)]
        use_emulator: bool,
    },
    /// Local directory, mostly for development.
    Local { path: PathBuf },
    /// Process-local memory. Data is lost on exit.
    Memory,
}

impl ObjectStoreConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ObjectStoreConfig::S3 { .. } => "s3",
            ObjectStoreConfig::Azure { .. } => "azure",
            ObjectStoreConfig::Local { .. } => "local",
            ObjectStoreConfig::Memory => "memory",
        }
    }

    /// Container or bucket name, for logging.
    pub fn container(&self) -> String {
        match self {
            ObjectStoreConfig::S3 { bucket, .. } => bucket.clone(),
            ObjectStoreConfig::Azure { container, .. } => container.clone(),
            ObjectStoreConfig::Local { path } => path.display().to_string(),
            ObjectStoreConfig::Memory => "memory".to_string(),
        }
    }
}

/// Verbosity of per-operation store events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationLogLevel {
    Off,
    #[default]
    Info,
    Debug,
}

/// Attempt count plus exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
            max_backoff_ms: 15_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling each time.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }

    pub fn to_object_store(&self) -> object_store::RetryConfig {
        object_store::RetryConfig {
            backoff: object_store::BackoffConfig {
                init_backoff: Duration::from_millis(self.backoff_ms),
                max_backoff: Duration::from_millis(self.max_backoff_ms),
                base: 2.0,
            },
            max_retries: self.max_attempts.saturating_sub(1) as usize,
            retry_timeout: Duration::from_millis(
                self.max_backoff_ms
                    .saturating_mul(self.max_attempts.max(1) as u64),
            ),
        }
    }
}

/// Per-request options passed to the object store client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    /// Upper bound on any single provider call, retries included.
    pub max_execution_time_secs: u64,
    /// Timeout of one HTTP request.
    pub request_timeout_secs: u64,
    /// Concurrent part uploads for multipart puts.
    pub parallel_operations: usize,
    pub retry: RetryPolicy,
    /// Payloads strictly larger than this are uploaded in parts.
    pub upload_chunk_threshold: usize,
    /// Part size for multipart uploads; `None` uses the client default.
    pub stream_write_size: Option<usize>,
    /// Ask the service to verify payload checksums.
    pub integrity_check: bool,
    pub log_level: OperationLogLevel,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            max_execution_time_secs: 120,
            request_timeout_secs: 30,
            parallel_operations: 4,
            retry: RetryPolicy::default(),
            upload_chunk_threshold: 32 * 1024 * 1024,
            stream_write_size: None,
            integrity_check: false,
            log_level: OperationLogLevel::default(),
        }
    }
}

impl RequestOptions {
    pub fn max_execution_time(&self) -> Duration {
        Duration::from_secs(self.max_execution_time_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn client_options(&self) -> object_store::ClientOptions {
        object_store::ClientOptions::new().with_timeout(self.request_timeout())
    }
}
