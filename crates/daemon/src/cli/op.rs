use std::fmt;
use std::path::PathBuf;

/// Shared inputs for every CLI operation.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    /// `--config` / `MEDIASTORE_CONFIG`, if given
    pub config_path: Option<PathBuf>,
}

/// A CLI command with a typed output and error.
#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    type Output: fmt::Display + fmt::Debug + Send;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

/// Generate a clap `Command` enum over a set of ops, plus `OpOutput` and
/// `OpError` wrappers and an `Op` impl dispatching to the chosen variant.
#[macro_export]
macro_rules! command_enum {
    ($( $(#[$meta:meta])* ($variant:ident, $ty:ty) ),* $(,)?) => {
        #[derive(clap::Subcommand, Debug, Clone)]
        pub enum Command {
            $( $(#[$meta])* $variant($ty), )*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $( $variant(<$ty as $crate::cli::op::Op>::Output), )*
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $( OpOutput::$variant(output) => std::fmt::Display::fmt(output, f), )*
                }
            }
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$ty as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Error = OpError;
            type Output = OpOutput;

            async fn execute(
                &self,
                ctx: &$crate::cli::op::OpContext,
            ) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => op
                            .execute(ctx)
                            .await
                            .map(OpOutput::$variant)
                            .map_err(OpError::$variant),
                    )*
                }
            }
        }
    };
}
