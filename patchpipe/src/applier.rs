//! Patch applier boundary.
//!
//! The byte-level patch format and the routine that applies a single patch
//! to the installed tree live outside this crate. The pipeline only needs
//! the contract below: apply is atomic per file and a failure is fatal to
//! the run.

use std::path::Path;

use crate::error::PatchResult;

/// Applies one staged patch file to the install tree.
///
/// The apply operation is treated as an atomic, non-interruptible step per
/// file; the install sequencer runs it on a blocking thread and never
/// observes a half-applied patch.
pub trait PatchApplier: Send + Sync + 'static {
    /// Apply `staged_file` to `repository` under `install_root`.
    ///
    /// Errors are fatal to the pipeline run: the run stops, prior installs
    /// and their version records are kept.
    fn apply(&self, staged_file: &Path, install_root: &Path, repository: &str) -> PatchResult<()>;
}
