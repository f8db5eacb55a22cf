//! Routes blob operations between external storage and default persistence.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::{ExternalStorageConfig, RetryPolicy};
use crate::database::Database;
use crate::error::Result;
use crate::fallback::DefaultBlobPersistence;
use crate::key::BlobKey;
use crate::locks::KeyLockTable;
use crate::object_store::ObjectStoreProvider;
use crate::provider::BlobStorageProvider;
use crate::reconcile::{with_retry, ReconcileStats, ReconciliationJob};

/// Template scope scanned by cleanup unless configured otherwise.
pub const DEFAULT_SCOPE: &str = "master";

/// Blob data provider for the CMS.
///
/// With external storage configured, payloads go to the object store and
/// reads fall back to default persistence on a miss. Without it, every
/// call is delegated to default persistence unchanged.
#[derive(Debug, Clone)]
pub struct HybridDataProvider {
    db: Database,
    fallback: Arc<dyn DefaultBlobPersistence>,
    external: Option<Arc<dyn BlobStorageProvider>>,
    locks: KeyLockTable,
    scope: String,
    cleanup_retry: RetryPolicy,
}

impl HybridDataProvider {
    /// Build a provider around an already constructed external store.
    pub fn new(
        db: Database,
        fallback: Arc<dyn DefaultBlobPersistence>,
        external: Option<Arc<dyn BlobStorageProvider>>,
    ) -> Self {
        Self {
            db,
            fallback,
            external,
            locks: KeyLockTable::new(),
            scope: DEFAULT_SCOPE.to_string(),
            cleanup_retry: RetryPolicy::default(),
        }
    }

    /// Build a provider from configuration.
    ///
    /// A disabled or unusable external store leaves the provider
    /// unconfigured instead of failing.
    pub fn from_config(
        db: Database,
        fallback: Arc<dyn DefaultBlobPersistence>,
        config: &ExternalStorageConfig,
        scope: impl Into<String>,
        cleanup_retry: RetryPolicy,
    ) -> Self {
        let external = match config.active_provider() {
            None => {
                info!("external blob storage not configured, using default persistence");
                None
            }
            Some(provider) => {
                match ObjectStoreProvider::from_config(provider.clone(), config.options.clone()) {
                    Ok(storage) => Some(Arc::new(storage) as Arc<dyn BlobStorageProvider>),
                    Err(e) => {
                        error!(
                            kind = provider.kind(),
                            error = %e,
                            "external blob storage failed to initialize, using default persistence"
                        );
                        None
                    }
                }
            }
        };

        Self::new(db, fallback, external)
            .with_scope(scope)
            .with_cleanup_retry(cleanup_retry)
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_cleanup_retry(mut self, policy: RetryPolicy) -> Self {
        self.cleanup_retry = policy;
        self
    }

    pub fn is_external_configured(&self) -> bool {
        self.external.is_some()
    }

    pub fn external(&self) -> Option<&Arc<dyn BlobStorageProvider>> {
        self.external.as_ref()
    }

    pub fn locks(&self) -> &KeyLockTable {
        &self.locks
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Reconciliation job sharing this provider's lock table, if external
    /// storage is configured.
    pub fn reconciliation_job(&self) -> Option<ReconciliationJob> {
        self.external.as_ref().map(|storage| {
            ReconciliationJob::new(
                self.db.clone(),
                storage.clone(),
                self.locks.clone(),
                self.scope.clone(),
            )
        })
    }

    /// Blob contents, or `None` if neither store has them.
    ///
    /// An empty or unreachable external object counts as a miss.
    pub async fn get_blob_stream(&self, key: &BlobKey) -> Result<Option<Bytes>> {
        if let Some(storage) = &self.external {
            let mut buffer = Vec::new();
            match storage.get(&key.to_string(), &mut buffer).await {
                Ok(written) if written > 0 => return Ok(Some(Bytes::from(buffer))),
                Ok(_) => debug!(key = %key, "blob not in external storage, falling back"),
                Err(e) if e.is_store_unavailable() => {
                    warn!(key = %key, error = %e, "external read failed, falling back")
                }
                Err(e) => return Err(e),
            }
        }

        self.fallback.get_stream(key).await
    }

    /// Whether either store has the blob.
    pub async fn blob_stream_exists(&self, key: &BlobKey) -> Result<bool> {
        if let Some(storage) = &self.external {
            match storage.exists(&key.to_string()).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) if e.is_store_unavailable() => {
                    warn!(key = %key, error = %e, "external exists check failed, falling back")
                }
                Err(e) => return Err(e),
            }
        }

        self.fallback.exists(key).await
    }

    /// Delete the blob.
    ///
    /// With external storage configured only the external object is
    /// deleted, and its result is final.
    pub async fn remove_blob_stream(&self, key: &BlobKey) -> Result<bool> {
        match &self.external {
            Some(storage) => storage.delete(&key.to_string()).await,
            None => self.fallback.delete(key).await,
        }
    }

    /// Store `payload` under `key`.
    ///
    /// Writes to the same key are serialized. The payload is uploaded
    /// before the ledger row is inserted, so a ledger failure leaves the
    /// payload in place and returns the error.
    pub async fn set_blob_stream(&self, payload: Bytes, key: &BlobKey) -> Result<bool> {
        let Some(storage) = &self.external else {
            self.fallback.put(payload, key).await?;
            return Ok(true);
        };

        let lock = self.locks.get_lock(key);
        let _guard = lock.lock().await;

        storage.put(payload, &key.to_string()).await?;
        self.db.insert_ledger_row(key, 0, Utc::now(), &[]).await?;

        Ok(true)
    }

    /// Run blob cleanup for the configured scope.
    ///
    /// Returns `None` when default persistence handled it, or when every
    /// attempt failed and the run was abandoned.
    pub async fn cleanup_blobs(&self) -> Option<ReconcileStats> {
        let Some(job) = self.reconciliation_job() else {
            if let Err(e) = self.fallback.cleanup(&self.scope).await {
                warn!(scope = %self.scope, error = %e, "default blob cleanup failed");
            }
            return None;
        };

        let stats = with_retry(&self.cleanup_retry, "blob reconciliation", || job.run()).await;
        if stats.is_none() {
            warn!(scope = %self.scope, "blob reconciliation abandoned");
        }
        stats
    }
}
