//! The CMS default blob persistence.
//!
//! Used for every operation while external storage is not configured, and
//! for reads and existence checks that miss in external storage.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use crate::database::{Database, LiveKeyStaging};
use crate::error::Result;
use crate::key::BlobKey;
use crate::reconcile::collect_live_keys;

/// Blob persistence the hybrid provider falls back to.
#[async_trait]
pub trait DefaultBlobPersistence: Send + Sync + std::fmt::Debug {
    /// Blob contents, or `None` when the key is unknown.
    async fn get_stream(&self, key: &BlobKey) -> Result<Option<Bytes>>;

    async fn exists(&self, key: &BlobKey) -> Result<bool>;

    /// Remove the blob. Returns `false` if there was nothing to remove.
    async fn delete(&self, key: &BlobKey) -> Result<bool>;

    /// Store `payload` under `key`, replacing previous contents.
    async fn put(&self, payload: Bytes, key: &BlobKey) -> Result<()>;

    /// Remove blobs that no field in `scope` references. Returns the number
    /// of rows removed.
    async fn cleanup(&self, scope: &str) -> Result<u64>;
}

/// Default persistence keeping payloads inline in the `blobs` table.
///
/// Empty rows left by external writes are not payloads and are ignored
/// by reads.
#[derive(Debug, Clone)]
pub struct SqlBlobPersistence {
    db: Database,
}

impl SqlBlobPersistence {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DefaultBlobPersistence for SqlBlobPersistence {
    async fn get_stream(&self, key: &BlobKey) -> Result<Option<Bytes>> {
        Ok(self.db.read_blob_data(key).await?.map(Bytes::from))
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool> {
        Ok(self.db.blob_data_exists(key).await?)
    }

    async fn delete(&self, key: &BlobKey) -> Result<bool> {
        let removed = self.db.delete_blob_rows(key).await?;
        debug!(key = %key, removed, "default persistence delete");
        Ok(removed)
    }

    async fn put(&self, payload: Bytes, key: &BlobKey) -> Result<()> {
        self.db.replace_blob_data(key, &payload).await?;
        debug!(key = %key, size = payload.len(), "default persistence write");
        Ok(())
    }

    async fn cleanup(&self, scope: &str) -> Result<u64> {
        let live = collect_live_keys(&self.db, scope).await?;

        let mut tx = self.db.begin().await?;
        let mut staging = LiveKeyStaging::create(&mut tx).await?;
        staging.insert_live_keys(&live).await?;
        let removed = staging.delete_unreferenced_rows().await?;
        staging.drop_table().await?;
        tx.commit().await?;

        info!(scope, live = live.len(), removed, "default blob cleanup complete");
        Ok(removed)
    }
}
