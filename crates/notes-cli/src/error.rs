use notes_core::{ServiceError, StorageError};
use thiserror::Error;

use crate::config::UsageError;

/// Errors surfaced by the command-line driver.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("unable to load access grant: {0}")]
    Access(#[source] StorageError),

    #[error("unable to open notes service: {0}")]
    Open(#[source] ServiceError),

    #[error("failed to {action} {target:?}: {source}")]
    Command {
        action: &'static str,
        target: String,
        #[source]
        source: ServiceError,
    },

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CliError {
    pub(crate) fn command(action: &'static str, target: &str, source: ServiceError) -> Self {
        CliError::Command {
            action,
            target: target.to_string(),
            source,
        }
    }

    /// Process exit code: 2 for invocation mistakes, 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Usage(_) => 2,
            _ => 1,
        }
    }

    /// Whether the run stopped because it was interrupted.
    pub fn is_cancelled(&self) -> bool {
        match self {
            CliError::Access(e) => e.is_cancelled(),
            CliError::Open(e) | CliError::Command { source: e, .. } => e.is_cancelled(),
            _ => false,
        }
    }
}
