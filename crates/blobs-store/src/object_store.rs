//! [`BlobStorageProvider`] backed by the `object_store` crate.
//!
//! One implementation covers S3/MinIO, Azure Blob Storage, a local
//! directory and process memory; the backend is picked from
//! [`ObjectStoreConfig`] at construction time.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use object_store::aws::{AmazonS3Builder, Checksum};
use object_store::azure::MicrosoftAzureBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload, WriteMultipart};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::config::{ObjectStoreConfig, OperationLogLevel, RequestOptions};
use crate::error::{BlobStoreError, Result};
use crate::provider::{BlobSink, BlobStorageProvider};

/// Part size used for multipart uploads when none is configured (5MiB,
/// the S3 minimum).
const DEFAULT_PART_SIZE: usize = 5 * 1024 * 1024;

/// Emit a store operation event at the configured verbosity.
macro_rules! op_event {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            OperationLogLevel::Off => {}
            OperationLogLevel::Info => tracing::info!($($arg)+),
            OperationLogLevel::Debug => tracing::debug!($($arg)+),
        }
    };
}

/// Blob storage on an external object store.
#[derive(Clone)]
pub struct ObjectStoreProvider {
    inner: Arc<dyn ObjectStore>,
    config: ObjectStoreConfig,
    options: RequestOptions,
}

impl fmt::Debug for ObjectStoreProvider {
    // credentials stay out of logs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreProvider")
            .field("kind", &self.config.kind())
            .field("container", &self.config.container())
            .field("options", &self.options)
            .finish()
    }
}

impl ObjectStoreProvider {
    /// Build the provider for the configured backend.
    pub fn from_config(config: ObjectStoreConfig, options: RequestOptions) -> Result<Self> {
        let inner = build_store(&config, &options)?;
        info!(
            kind = config.kind(),
            container = %config.container(),
            "external blob storage initialized"
        );
        Ok(Self {
            inner,
            config,
            options,
        })
    }

    /// Wrap an already constructed object store.
    pub fn with_store(
        inner: Arc<dyn ObjectStore>,
        config: ObjectStoreConfig,
        options: RequestOptions,
    ) -> Self {
        Self {
            inner,
            config,
            options,
        }
    }

    /// Ephemeral provider over process memory.
    pub fn in_memory() -> Self {
        Self::with_store(
            Arc::new(InMemory::new()),
            ObjectStoreConfig::Memory,
            RequestOptions::default(),
        )
    }

    pub fn config(&self) -> &ObjectStoreConfig {
        &self.config
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    fn path(key: &str) -> ObjectPath {
        ObjectPath::from(key)
    }

    /// Run `fut`, failing with [`BlobStoreError::Timeout`] once the
    /// configured maximum execution time has passed.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let limit = self.options.max_execution_time();
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, ?limit, "object store call timed out");
                Err(BlobStoreError::Timeout { operation, limit })
            }
        }
    }

    /// Open a download stream, or `None` if the object does not exist.
    async fn open(
        &self,
        key: &str,
    ) -> Result<Option<BoxStream<'static, object_store::Result<Bytes>>>> {
        match self.inner.get(&Self::path(key)).await {
            Ok(result) => Ok(Some(result.into_stream())),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists_inner(&self, key: &str) -> Result<bool> {
        match self.inner.head(&Self::path(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_inner(&self, key: &str, sink: &mut BlobSink<'_>) -> Result<u64> {
        let Some(stream) = self.open(key).await? else {
            return Ok(0);
        };

        let started = Instant::now();
        let written = copy_stream(stream, sink).await?;
        op_event!(
            self.options.log_level,
            key,
            size = written,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "blob downloaded"
        );
        Ok(written)
    }

    async fn put_inner(&self, payload: Bytes, key: &str) -> Result<()> {
        let path = Self::path(key);
        let size = payload.len();
        let multipart = size > self.options.upload_chunk_threshold;
        let started = Instant::now();

        if multipart {
            self.upload_multipart(&path, &payload).await?;
        } else {
            self.inner.put(&path, PutPayload::from(payload)).await?;
        }

        op_event!(
            self.options.log_level,
            key,
            size,
            multipart,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "blob uploaded"
        );
        Ok(())
    }

    async fn upload_multipart(&self, path: &ObjectPath, payload: &Bytes) -> Result<()> {
        let part_size = self
            .options
            .stream_write_size
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_PART_SIZE);
        let max_concurrency = self.options.parallel_operations.max(1);

        let upload = self.inner.put_multipart(path).await?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, part_size);

        for part in payload.chunks(part_size) {
            if let Err(e) = writer.wait_for_capacity(max_concurrency).await {
                if let Err(abort_err) = writer.abort().await {
                    warn!(%path, error = %abort_err, "failed to abort multipart upload");
                }
                return Err(e.into());
            }
            writer.write(part);
        }

        writer.finish().await?;
        Ok(())
    }

    async fn delete_inner(&self, key: &str) -> Result<bool> {
        if !self.exists_inner(key).await? {
            info!(key, "blob was not deleted: not found");
            return Ok(false);
        }

        match self.inner.delete(&Self::path(key)).await {
            Ok(()) => {
                op_event!(self.options.log_level, key, "blob was deleted");
                Ok(true)
            }
            Err(object_store::Error::NotFound { .. }) => {
                info!(key, "blob was not deleted: not found");
                Ok(false)
            }
            Err(e) => {
                warn!(
                    key,
                    store = self.config.kind(),
                    container = %self.config.container(),
                    error = %e,
                    "blob delete failed"
                );
                Err(e.into())
            }
        }
    }

    /// Stream into `partial`, then move it over `path`.
    async fn download_inner(&self, key: &str, path: &Path, partial: &Path) -> Result<()> {
        let Some(stream) = self.open(key).await? else {
            return Ok(());
        };

        let mut file = tokio::fs::File::create(partial).await?;
        let written = copy_stream(stream, &mut file).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(partial, path).await?;

        op_event!(
            self.options.log_level,
            key,
            size = written,
            path = %path.display(),
            "blob downloaded to file"
        );
        Ok(())
    }

    async fn list_inner(&self) -> Result<Vec<String>> {
        let keys: Vec<String> = self
            .inner
            .list(None)
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await?;
        Ok(keys)
    }
}

#[async_trait]
impl BlobStorageProvider for ObjectStoreProvider {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.bounded("exists", self.exists_inner(key)).await
    }

    async fn get(&self, key: &str, sink: &mut BlobSink<'_>) -> Result<u64> {
        self.bounded("get", self.get_inner(key, sink)).await
    }

    async fn put(&self, payload: Bytes, key: &str) -> Result<()> {
        self.bounded("put", self.put_inner(payload, key)).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.bounded("delete", self.delete_inner(key)).await
    }

    async fn download_to_file(&self, key: &str, path: &Path) -> Result<()> {
        let partial = partial_path(path);
        let result = self
            .bounded("download", self.download_inner(key, path, &partial))
            .await;
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(&partial).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %partial.display(), error = %e, "failed to remove partial download");
                }
            }
        }
        result
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        self.bounded("list", self.list_inner()).await
    }
}

async fn copy_stream<W>(
    mut stream: BoxStream<'static, object_store::Result<Bytes>>,
    sink: &mut W,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let mut written = 0u64;
    while let Some(chunk) = stream.try_next().await? {
        sink.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    sink.flush().await?;
    Ok(written)
}

fn init_error(e: impl fmt::Display) -> BlobStoreError {
    BlobStoreError::ProviderInitialization(e.to_string())
}

fn build_store(
    config: &ObjectStoreConfig,
    options: &RequestOptions,
) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match config {
        ObjectStoreConfig::S3 {
            endpoint,
            access_key,
            secret_key,
            bucket,
            region,
        } => {
            // client options first: with_allow_http writes into them
            let mut builder = AmazonS3Builder::new()
                .with_client_options(options.client_options())
                .with_retry(options.retry.to_object_store())
                .with_access_key_id(access_key)
                .with_secret_access_key(secret_key)
                .with_bucket_name(bucket)
                .with_region(region.as_deref().unwrap_or("us-east-1"));
            if let Some(endpoint) = endpoint {
                builder = builder
                    .with_endpoint(endpoint)
                    .with_allow_http(endpoint.starts_with("http://"));
            }
            if options.integrity_check {
                builder = builder.with_checksum_algorithm(Checksum::SHA256);
            }
            Arc::new(builder.build().map_err(init_error)?)
        }
        ObjectStoreConfig::Azure {
            account,
            access_key,
            container,
            use_emulator,
        } => {
            if options.integrity_check {
                warn!("integrity_check is not supported for azure, ignoring");
            }
            let builder = MicrosoftAzureBuilder::new()
                .with_client_options(options.client_options())
                .with_retry(options.retry.to_object_store())
                .with_account(account)
                .with_access_key(access_key)
                .with_container_name(container)
                .with_use_emulator(*use_emulator);
            Arc::new(builder.build().map_err(init_error)?)
        }
        ObjectStoreConfig::Local { path } => {
            std::fs::create_dir_all(path).map_err(|e| {
                init_error(format!("failed to create {}: {}", path.display(), e))
            })?;
            Arc::new(LocalFileSystem::new_with_prefix(path).map_err(init_error)?)
        }
        ObjectStoreConfig::Memory => Arc::new(InMemory::new()),
    };
    Ok(store)
}

/// Sibling of `path` that downloads are staged in.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
