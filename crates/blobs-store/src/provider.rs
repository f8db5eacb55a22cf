//! The external blob storage capability.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWrite;

use crate::error::Result;

/// A byte sink that blob contents can be streamed into.
pub type BlobSink<'a> = dyn AsyncWrite + Send + Unpin + 'a;

/// Stores blob payloads in an external object store, addressed by key.
///
/// Absence is never an error here. Transport failures are returned to the
/// caller untouched; deciding whether to fall back is the caller's job.
#[async_trait]
pub trait BlobStorageProvider: Send + Sync + std::fmt::Debug {
    /// Whether an object exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Stream the object into `sink` and return the number of bytes written.
    ///
    /// Writes nothing and returns `Ok(0)` when the object does not exist.
    async fn get(&self, key: &str, sink: &mut BlobSink<'_>) -> Result<u64>;

    /// Upload `payload` under `key`, replacing any existing object.
    async fn put(&self, payload: Bytes, key: &str) -> Result<()>;

    /// Delete the object. Returns `false` if there was nothing to delete.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Stream the object to `path`, overwriting it. No-op when absent.
    async fn download_to_file(&self, key: &str, path: &Path) -> Result<()>;

    /// Every object key currently in the store.
    async fn list_keys(&self) -> Result<Vec<String>>;
}
