//! CLI error type.

use patchpipe::PatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("update failed: {0}")]
    UpdateFailed(String),

    #[error("update cancelled")]
    Cancelled,

    #[error("failed to install signal handler: {0}")]
    Signal(String),

    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error. Cancellation is distinguishable
    /// from failure so wrappers can retry only real failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Cancelled => 130,
            _ => 1,
        }
    }
}
