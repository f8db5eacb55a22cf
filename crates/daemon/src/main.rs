use std::path::PathBuf;

use clap::Parser;

mod cli;

use cli::op::{Op, OpContext};
use cli::ops::{Blob, Cleanup, Init, Run};
use mediastore_daemon::state::AppState;

crate::command_enum! {
    /// Write a default config file
    (Init, Init),
    /// Read, write and inspect blobs
    (Blob, Blob),
    /// Run one reconciliation pass
    (Cleanup, Cleanup),
    /// Run cleanup periodically until Ctrl-C
    (Run, Run),
}

#[derive(Parser, Debug)]
#[command(name = "mediastore", version, about = "Hybrid blob storage for CMS content")]
struct Cli {
    /// Config file (default: <config dir>/mediastore/config.toml)
    #[arg(long, global = true, env = "MEDIASTORE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    // config may not exist yet (e.g. `init`)
    let level = AppState::load(args.config.clone())
        .map(|state| state.config.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    mediastore_daemon::logging::init(&level);

    let ctx = OpContext {
        config_path: args.config,
    };
    let output = args.command.execute(&ctx).await?;

    let rendered = output.to_string();
    if !rendered.is_empty() {
        println!("{}", rendered);
    }
    Ok(())
}
