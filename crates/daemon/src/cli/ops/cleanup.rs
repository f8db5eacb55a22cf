use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use blobs_store::{BlobStoreError, ReconcileStats};
use mediastore_daemon::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Cleanup {
    /// Also delete external objects that are neither referenced nor ledgered
    #[arg(long)]
    pub sweep: bool,
}

#[derive(Debug)]
pub struct CleanupOutput {
    pub scope: String,
    /// `None` when default persistence ran the cleanup or the run was abandoned
    pub reconcile: Option<ReconcileStats>,
    pub sweep: Option<ReconcileStats>,
}

fn write_stats(f: &mut fmt::Formatter<'_>, stats: &ReconcileStats) -> fmt::Result {
    writeln!(f, "  {} {}", "live:".dimmed(), stats.live)?;
    writeln!(f, "  {} {}", "unused:".dimmed(), stats.unused)?;
    writeln!(f, "  {} {}", "deleted:".dimmed(), stats.deleted.green())?;
    writeln!(f, "  {} {}", "missing:".dimmed(), stats.missing)?;
    writeln!(f, "  {} {}", "skipped:".dimmed(), stats.skipped)?;
    if stats.failed > 0 {
        write!(f, "  {} {}", "failed:".dimmed(), stats.failed.red())
    } else {
        write!(f, "  {} {}", "failed:".dimmed(), stats.failed)
    }
}

impl fmt::Display for CleanupOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reconcile {
            Some(stats) => {
                writeln!(
                    f,
                    "{} scope {}",
                    "Reconciled".green().bold(),
                    self.scope.bold()
                )?;
                write_stats(f, stats)?;
            }
            None => write!(
                f,
                "{} scope {} (default persistence or abandoned run, see logs)",
                "Cleaned".green().bold(),
                self.scope.bold()
            )?,
        }

        if let Some(stats) = &self.sweep {
            writeln!(f)?;
            writeln!(f, "{}", "Orphan sweep".bold())?;
            write_stats(f, stats)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error("failed to load state: {0}")]
    State(#[from] StateError),

    #[error("orphan sweep failed: {0}")]
    Sweep(#[from] BlobStoreError),

    #[error("--sweep requires external storage to be configured")]
    SweepUnconfigured,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Cleanup {
    type Error = CleanupError;
    type Output = CleanupOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let provider = state.open_provider().await?;

        if self.sweep && !provider.is_external_configured() {
            return Err(CleanupError::SweepUnconfigured);
        }

        let reconcile = provider.cleanup_blobs().await;

        let sweep = match provider.reconciliation_job() {
            Some(job) if self.sweep => Some(job.sweep_orphans().await?),
            _ => None,
        };

        Ok(CleanupOutput {
            scope: provider.scope().to_string(),
            reconcile,
            sweep,
        })
    }
}
