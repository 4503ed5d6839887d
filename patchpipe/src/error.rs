//! Error types for the patch pipeline.

use std::io;
use std::path::PathBuf;

/// Result type for pipeline operations.
pub type PatchResult<T> = Result<T, PatchError>;

/// Errors that can occur during a pipeline run.
///
/// Every variant carries enough context to identify the offending file or
/// repository; sub-pipeline errors are never swallowed, they surface as a
/// terminal [`PipelineEvent::Failed`](crate::progress::PipelineEvent).
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Failed to fetch or parse the remote patch catalog.
    #[error("failed to resolve patch catalog from {url}: {reason}")]
    Catalog { url: String, reason: String },

    /// A network transfer failed (connection error, non-2xx response).
    ///
    /// Transfers are not retried by the pipeline; retry policy belongs to
    /// the caller.
    #[error("failed to download {url}: {reason}")]
    Transfer { url: String, reason: String },

    /// A staged file does not have the size the catalog promised.
    #[error(
        "staged file {} has size {actual}, expected {expected}",
        path.display()
    )]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// SHA-256 verification of a downloaded file failed.
    #[error("checksum mismatch for {file_name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file_name: String,
        expected: String,
        actual: String,
    },

    /// Applying a staged patch to the install tree failed.
    ///
    /// Fatal to the run; prior successful installs are kept.
    #[error("failed to apply {file_name} to repository {repository}: {reason}")]
    Apply {
        repository: String,
        file_name: String,
        reason: String,
    },

    /// Reading or writing a persisted version record failed.
    #[error("version store failure for repository {repository}: {source}")]
    VersionStore {
        repository: String,
        source: io::Error,
    },

    /// Filesystem operation on the staging tree failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    /// A second run was requested while one is already active.
    #[error("a pipeline run is already active")]
    AlreadyRunning,

    /// The run was cancelled by the caller. Not a failure; state on disk is
    /// consistent and resumable.
    #[error("pipeline run was cancelled")]
    Cancelled,
}

impl PatchError {
    /// Name of the file this error relates to, when one can be identified.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::SizeMismatch { path, .. } | Self::Io { path, .. } => {
                path.file_name().and_then(|n| n.to_str())
            }
            Self::ChecksumMismatch { file_name, .. } | Self::Apply { file_name, .. } => {
                Some(file_name)
            }
            Self::Transfer { url, .. } => url.rsplit('/').next().filter(|s| !s.is_empty()),
            _ => None,
        }
    }
}
