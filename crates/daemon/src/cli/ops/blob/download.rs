use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use blobs_store::{BlobKey, BlobStorageProvider, BlobStoreError};
use mediastore_daemon::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Download {
    /// Blob key
    pub key: BlobKey,

    /// Destination file, overwritten if present
    pub file: PathBuf,
}

#[derive(Debug)]
pub struct DownloadOutput {
    pub key: BlobKey,
    pub path: PathBuf,
    /// `None` when the object was absent and nothing was written
    pub size: Option<u64>,
}

impl fmt::Display for DownloadOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.size {
            Some(size) => write!(
                f,
                "{} {} ({} bytes) to {}",
                "Downloaded".green().bold(),
                self.key.bold(),
                size,
                self.path.display()
            ),
            None => write!(
                f,
                "{} blob {} is not in external storage, nothing written",
                "Skipped".yellow().bold(),
                self.key.bold()
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("failed to load state: {0}")]
    State(#[from] StateError),

    #[error("download failed: {0}")]
    Store(#[from] BlobStoreError),

    #[error("external storage is not configured")]
    Unconfigured,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Download {
    type Error = DownloadError;
    type Output = DownloadOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let provider = state.open_provider().await?;
        let storage = provider.external().ok_or(DownloadError::Unconfigured)?;

        let key = self.key.to_string();
        let size = if storage.exists(&key).await? {
            storage.download_to_file(&key, &self.file).await?;
            let metadata = tokio::fs::metadata(&self.file)
                .await
                .map_err(BlobStoreError::from)?;
            Some(metadata.len())
        } else {
            None
        };

        Ok(DownloadOutput {
            key: self.key,
            path: self.file.clone(),
            size,
        })
    }
}
