//! Error types for the blob store.

use std::time::Duration;

use thiserror::Error;

use crate::database::DatabaseError;
use crate::key::KeyParseError;

/// Result alias used throughout the crate.
pub type Result<T, E = BlobStoreError> = std::result::Result<T, E>;

/// Errors produced by the blob store.
///
/// Absence of a blob is never an error: lookups report it through
/// `Option`, `bool` or a zero byte count.
#[derive(Debug, Error)]
pub enum BlobStoreError {
    /// Transport, auth or protocol failure talking to the external object store.
    #[error("object store unavailable: {0}")]
    StoreUnavailable(#[from] object_store::Error),

    /// An object store call ran past the configured maximum execution time.
    #[error("object store {operation} did not complete within {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },

    /// Relational insert/delete/select failure.
    #[error("metadata store error: {0}")]
    Metadata(#[from] sqlx::Error),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// The external provider could not be built from configuration.
    #[error("provider initialization failed: {0}")]
    ProviderInitialization(String),

    #[error(transparent)]
    KeyParse(#[from] KeyParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlobStoreError {
    /// Whether this error came from talking to the external object store.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Timeout { .. })
    }

    /// Whether this error came from the relational metadata store.
    pub fn is_metadata_failure(&self) -> bool {
        matches!(self, Self::Metadata(_) | Self::Database(_))
    }
}
