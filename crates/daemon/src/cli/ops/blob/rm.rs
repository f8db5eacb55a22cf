use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use blobs_store::{BlobKey, BlobStoreError};
use mediastore_daemon::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Rm {
    /// Blob key
    pub key: BlobKey,
}

#[derive(Debug)]
pub struct RmOutput {
    pub key: BlobKey,
    pub removed: bool,
}

impl fmt::Display for RmOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.removed {
            write!(f, "{} blob {}", "Removed".green().bold(), self.key.bold())
        } else {
            write!(f, "{} blob {} was not found", "Skipped".yellow().bold(), self.key.bold())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RmError {
    #[error("failed to load state: {0}")]
    State(#[from] StateError),

    #[error("delete failed: {0}")]
    Store(#[from] BlobStoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Rm {
    type Error = RmError;
    type Output = RmOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let provider = state.open_provider().await?;
        let removed = provider.remove_blob_stream(&self.key).await?;

        Ok(RmOutput {
            key: self.key,
            removed,
        })
    }
}
