use clap::{Args, Subcommand};

pub mod download;
pub mod get;
pub mod put;
pub mod rm;
pub mod stat;

use crate::cli::op::Op;

crate::command_enum! {
    /// Store a file under a blob key
    (Put, put::Put),
    /// Read a blob to stdout or a file
    (Get, get::Get),
    /// Show where a blob is stored
    (Stat, stat::Stat),
    /// Delete a blob
    (Rm, rm::Rm),
    /// Download a blob straight from external storage to a file
    (Download, download::Download),
}

// Rename the generated Command to BlobCommand for clarity
pub type BlobCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Blob {
    #[command(subcommand)]
    pub command: BlobCommand,
}

#[async_trait::async_trait]
impl Op for Blob {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
