use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use mediastore_daemon::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Run {
    /// Override the configured cleanup interval, in seconds
    #[arg(long)]
    pub interval_secs: Option<u64>,
}

#[derive(Debug)]
pub struct RunOutput {
    pub runs: usize,
}

impl fmt::Display for RunOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after {} cleanup run(s)",
            "Stopped".yellow().bold(),
            self.runs
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to load state: {0}")]
    State(#[from] StateError),

    #[error("failed to wait for ctrl-c: {0}")]
    Signal(#[from] std::io::Error),

    #[error("scheduler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Run {
    type Error = RunError;
    type Output = RunOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let provider = state.open_provider().await?;

        let interval = match self.interval_secs {
            Some(secs) => std::time::Duration::from_secs(secs.max(1)),
            None => state.config.cleanup_interval(),
        };

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
        let scheduler = tokio::spawn(mediastore_daemon::spawn_cleanup(
            provider,
            interval,
            shutdown_rx,
        ));

        tokio::signal::ctrl_c().await?;
        tracing::info!("Ctrl-C received, shutting down");
        let _ = shutdown_tx.send(());

        let runs = scheduler.await?;
        Ok(RunOutput { runs })
    }
}
