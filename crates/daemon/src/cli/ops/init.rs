use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use mediastore_daemon::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,

    /// SQLite metadata database path (default: <data dir>/mediastore/mediastore.db)
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Template scope scanned for live blob references
    #[arg(long)]
    pub scope: Option<String>,
}

#[derive(Debug)]
pub struct InitOutput {
    pub config_path: PathBuf,
    pub database: PathBuf,
    pub scope: String,
    pub cleanup_interval_secs: u64,
}

impl fmt::Display for InitOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} mediastore config at {}",
            "Initialized".green().bold(),
            self.config_path.display().to_string().bold()
        )?;
        writeln!(f, "  {} {}", "Database:".dimmed(), self.database.display())?;
        writeln!(f, "  {} {}", "Scope:".dimmed(), self.scope)?;
        writeln!(
            f,
            "  {} every {}s",
            "Cleanup:".dimmed(),
            self.cleanup_interval_secs
        )?;
        write!(
            f,
            "  {} {}",
            "External storage:".dimmed(),
            "disabled (edit [external] to enable)".yellow()
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = InitOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig::default();

        if let Some(database) = &self.database {
            if !database.is_absolute() {
                return Err(InitError::InvalidPath(
                    "--database must be an absolute path".to_string(),
                ));
            }
            config.database = database.clone();
        }
        if let Some(scope) = &self.scope {
            config.scope = scope.clone();
        }

        let state = AppState::init(ctx.config_path.clone(), Some(config), self.force)?;

        Ok(InitOutput {
            config_path: state.config_path,
            database: state.config.database,
            scope: state.config.scope,
            cleanup_interval_secs: state.config.cleanup_interval_secs,
        })
    }
}
