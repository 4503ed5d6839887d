//! Patch descriptor: identity and metadata for one required patch file.

use std::path::{Path, PathBuf};

/// Subdirectory of the install root holding staged (downloaded but not yet
/// applied) patch files.
pub const STAGING_DIR: &str = ".patches";

/// Metadata identifying one file needed to advance a repository from one
/// version to the next.
///
/// Identity is `(repository, file_name)`. Descriptors are created by the
/// catalog resolver at check time and are immutable from then on; ownership
/// of the staged file on disk passes from the transfer pool to the install
/// sequencer together with the completed
/// [`TransferResult`](crate::transfer::TransferResult).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchDescriptor {
    /// Independently versioned subtree of the client this patch belongs to
    /// (e.g. `boot`, `game`, `ex1`).
    pub repository: String,

    /// File name of the patch, unique within its repository.
    pub file_name: String,

    /// URL the patch is served from.
    pub source_url: String,

    /// Expected size of the patch file in bytes.
    pub expected_size: u64,

    /// Version string the repository is at once this patch is applied.
    pub target_version: String,

    /// Position within the repository's required list, 0-based. Patches
    /// must be applied in non-decreasing sequence order per repository.
    pub sequence_index: usize,

    /// Optional SHA-256 digest (lowercase hex) of the patch file, verified
    /// after download when present.
    pub expected_sha256: Option<String>,
}

impl PatchDescriptor {
    /// Staging path for this descriptor:
    /// `<install_root>/.patches/<repository>/<file_name>`.
    pub fn staging_path(&self, install_root: &Path) -> PathBuf {
        install_root
            .join(STAGING_DIR)
            .join(&self.repository)
            .join(&self.file_name)
    }
}

impl std::fmt::Display for PatchDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.repository, self.file_name)
    }
}
