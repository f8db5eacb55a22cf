use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use clap::Args;
use owo_colors::OwoColorize;

use blobs_store::{BlobKey, BlobStoreError};
use mediastore_daemon::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Put {
    /// Blob key (UUID, braced or hyphenated)
    pub key: BlobKey,

    /// File to upload
    pub file: PathBuf,
}

#[derive(Debug)]
pub struct PutOutput {
    pub key: BlobKey,
    pub size: usize,
    pub external: bool,
}

impl fmt::Display for PutOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} blob {}", "Stored".green().bold(), self.key.bold())?;
        writeln!(f, "  {} {} bytes", "size:".dimmed(), self.size)?;
        writeln!(f, "  {} {}", "field value:".dimmed(), self.key.to_field_value())?;
        let target = if self.external {
            "external storage"
        } else {
            "default persistence"
        };
        write!(f, "  {} {}", "stored in:".dimmed(), target)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PutError {
    #[error("failed to load state: {0}")]
    State(#[from] StateError),

    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("write failed: {0}")]
    Store(#[from] BlobStoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Put {
    type Error = PutError;
    type Output = PutOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let payload = tokio::fs::read(&self.file)
            .await
            .map_err(|e| PutError::Read(self.file.clone(), e))?;
        let size = payload.len();

        let state = AppState::load(ctx.config_path.clone())?;
        let provider = state.open_provider().await?;
        provider.set_blob_stream(Bytes::from(payload), &self.key).await?;

        Ok(PutOutput {
            key: self.key,
            size,
            external: provider.is_external_configured(),
        })
    }
}
