use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use blobs_store::{BlobKey, BlobStorageProvider, BlobStoreError};
use mediastore_daemon::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Stat {
    /// Blob key
    pub key: BlobKey,
}

#[derive(Debug)]
pub struct StatOutput {
    pub key: BlobKey,
    pub exists: bool,
    /// `None` when external storage is not configured
    pub external: Option<bool>,
    pub ledgered: bool,
}

fn yes_no(value: bool) -> String {
    if value {
        "yes".green().to_string()
    } else {
        "no".red().to_string()
    }
}

impl fmt::Display for StatOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", "Blob".bold(), self.key.bold())?;
        writeln!(f, "  {} {}", "exists:".dimmed(), yes_no(self.exists))?;
        match self.external {
            Some(external) => writeln!(f, "  {} {}", "external:".dimmed(), yes_no(external))?,
            None => writeln!(f, "  {} {}", "external:".dimmed(), "not configured".yellow())?,
        }
        write!(f, "  {} {}", "ledger:".dimmed(), yes_no(self.ledgered))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatError {
    #[error("failed to load state: {0}")]
    State(#[from] StateError),

    #[error("stat failed: {0}")]
    Store(#[from] BlobStoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Stat {
    type Error = StatError;
    type Output = StatOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let provider = state.open_provider().await?;

        let exists = provider.blob_stream_exists(&self.key).await?;
        let external = match provider.external() {
            Some(storage) => Some(storage.exists(&self.key.to_string()).await?),
            None => None,
        };
        let ledgered = provider
            .database()
            .ledger_contains(&self.key)
            .await
            .map_err(BlobStoreError::from)?;

        Ok(StatOutput {
            key: self.key,
            exists,
            external,
            ledgered,
        })
    }
}
