//! Staging tree maintenance.
//!
//! Staged files live under `<install_root>/.patches/<repository>/`. The
//! transfer pool is the only writer; the install sequencer reads each file
//! once and deletes it. This module holds the shared filesystem helpers.

use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::descriptor::STAGING_DIR;
use crate::error::{PatchError, PatchResult};

/// State of a staging path before a transfer starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedStatus {
    /// Nothing staged yet.
    Missing,
    /// A file of exactly the expected size exists; the network transfer can
    /// be skipped.
    Complete,
    /// A file exists but its size is wrong; it is corrupt and must be
    /// re-downloaded from scratch.
    SizeMismatch { actual: u64 },
}

/// Inspect a staging path against the expected file size.
pub async fn staged_status(path: &Path, expected_size: u64) -> PatchResult<StagedStatus> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() == expected_size => Ok(StagedStatus::Complete),
        Ok(meta) => Ok(StagedStatus::SizeMismatch { actual: meta.len() }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StagedStatus::Missing),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Create the staging subdirectory a file will be written into.
pub async fn prepare_parent(path: &Path) -> PatchResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err(parent, e))?;
    }
    Ok(())
}

/// Remove a partially written staging file, if any. Best-effort: a missing
/// file is not an error.
pub async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial staging file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial staging file"),
    }
}

/// Remove staging subdirectories that are now empty, and the staging root
/// itself once nothing is left. Directories still holding files (e.g. when
/// staged files are kept) are left alone.
pub async fn remove_empty_staging_dirs(install_root: &Path) -> PatchResult<()> {
    let staging_root = install_root.join(STAGING_DIR);
    let mut entries = match tokio::fs::read_dir(&staging_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_err(&staging_root, e)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| io_err(&staging_root, e))?
    {
        let path = entry.path();
        if entry
            .file_type()
            .await
            .map_err(|e| io_err(&path, e))?
            .is_dir()
        {
            // remove_dir only succeeds on empty directories.
            if tokio::fs::remove_dir(&path).await.is_ok() {
                debug!(path = %path.display(), "removed empty staging directory");
            }
        }
    }

    let _ = tokio::fs::remove_dir(&staging_root).await;
    Ok(())
}

fn io_err(path: &Path, source: io::Error) -> PatchError {
    PatchError::Io {
        path: path.to_path_buf(),
        source,
    }
}
