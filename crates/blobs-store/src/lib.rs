//! Hybrid blob storage for the CMS.
//!
//! Blob payloads live in an external object store (S3/MinIO, Azure Blob
//! Storage, local filesystem or memory) while SQLite keeps the content
//! fields that reference them. When no external store is configured every
//! operation falls back to the CMS default persistence.
//!
//! # Features
//!
//! - [`HybridDataProvider`]: read/write/exists/delete with per-key write
//!   serialization and fallback on external misses
//! - [`ReconciliationJob`]: deletes blobs no content field references
//! - [`ObjectStoreProvider`]: one [`BlobStorageProvider`] over the
//!   `object_store` crate, with timeouts, retries and multipart uploads
//!   passed through from [`RequestOptions`]
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use blobs_store::{
//!     BlobKey, Database, ExternalStorageConfig, HybridDataProvider, ObjectStoreConfig,
//!     RetryPolicy, SqlBlobPersistence,
//! };
//!
//! # async fn example() -> Result<(), blobs_store::BlobStoreError> {
//! let db = Database::new("/tmp/mediastore.db").await?;
//! let fallback = Arc::new(SqlBlobPersistence::new(db.clone()));
//!
//! let config = ExternalStorageConfig {
//!     enabled: true,
//!     provider: Some(ObjectStoreConfig::S3 {
//!         endpoint: Some("http://localhost:9000".to_string()),
//!         access_key: "minioadmin".to_string(),
//!         secret_key: "minioadmin".to_string(),
//!         bucket: "media".to_string(),
//!         region: None,
//!     }),
//!     options: Default::default(),
//! };
//! let provider =
//!     HybridDataProvider::from_config(db, fallback, &config, "master", RetryPolicy::default());
//!
//! let key = BlobKey::new();
//! provider.set_blob_stream(b"hello world".to_vec().into(), &key).await?;
//! let data = provider.get_blob_stream(&key).await?;
//! println!("Retrieved: {:?}", data);
//!
//! if let Some(stats) = provider.cleanup_blobs().await {
//!     println!("deleted {} unreferenced blobs", stats.deleted);
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod database;
mod error;
mod fallback;
mod hybrid;
mod key;
mod locks;
mod object_store;
mod provider;
mod reconcile;

pub use config::{
    ExternalStorageConfig, ObjectStoreConfig, OperationLogLevel, RequestOptions, RetryPolicy,
};
pub use database::{Database, DatabaseError, FieldId, FieldTable, LiveKeyStaging, TemplateId};
pub use error::{BlobStoreError, Result};
pub use fallback::{DefaultBlobPersistence, SqlBlobPersistence};
pub use hybrid::{HybridDataProvider, DEFAULT_SCOPE};
pub use key::{BlobKey, KeyParseError, KEY_WIDTH};
pub use locks::{KeyLock, KeyLockTable};
pub use crate::object_store::ObjectStoreProvider;
pub use provider::{BlobSink, BlobStorageProvider};
pub use reconcile::{collect_live_keys, with_retry, ReconcileStats, ReconciliationJob};
