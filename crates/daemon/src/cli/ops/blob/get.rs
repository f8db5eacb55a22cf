use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;
use tokio::io::AsyncWriteExt;

use blobs_store::{BlobKey, BlobStoreError};
use mediastore_daemon::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Get {
    /// Blob key
    pub key: BlobKey,

    /// Write to this file instead of stdout
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

#[derive(Debug)]
pub enum GetOutput {
    /// Contents went to stdout; nothing left to print
    Stdout,
    File { path: PathBuf, size: usize },
}

impl fmt::Display for GetOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GetOutput::Stdout => Ok(()),
            GetOutput::File { path, size } => write!(
                f,
                "{} {} bytes to {}",
                "Wrote".green().bold(),
                size,
                path.display().to_string().bold()
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GetError {
    #[error("failed to load state: {0}")]
    State(#[from] StateError),

    #[error("read failed: {0}")]
    Store(#[from] BlobStoreError),

    #[error("blob {0} not found")]
    NotFound(BlobKey),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Get {
    type Error = GetError;
    type Output = GetOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let provider = state.open_provider().await?;

        let data = provider
            .get_blob_stream(&self.key)
            .await?
            .ok_or(GetError::NotFound(self.key))?;

        match &self.out {
            Some(path) => {
                tokio::fs::write(path, &data).await?;
                Ok(GetOutput::File {
                    path: path.clone(),
                    size: data.len(),
                })
            }
            None => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(&data).await?;
                stdout.flush().await?;
                Ok(GetOutput::Stdout)
            }
        }
    }
}
