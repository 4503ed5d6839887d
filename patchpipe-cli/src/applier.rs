//! File-drop applier.
//!
//! Applies a patch by copying the staged file into the repository's
//! directory under the install root. This fits raw-file patch feeds; feeds
//! with a binary diff format plug their own [`PatchApplier`] into the
//! library instead.

use std::fs;
use std::path::Path;

use patchpipe::{PatchApplier, PatchError, PatchResult};

#[derive(Debug, Clone, Default)]
pub struct FileDropApplier;

impl PatchApplier for FileDropApplier {
    fn apply(&self, staged_file: &Path, install_root: &Path, repository: &str) -> PatchResult<()> {
        let apply_err = |reason: String| PatchError::Apply {
            repository: repository.to_string(),
            file_name: staged_file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string(),
            reason,
        };

        let file_name = staged_file
            .file_name()
            .ok_or_else(|| apply_err("staged path has no file name".to_string()))?;

        let target_dir = install_root.join(repository);
        fs::create_dir_all(&target_dir).map_err(|e| apply_err(e.to_string()))?;

        // Copy, then rename: the target name never holds a half-written file.
        let tmp = target_dir.join(format!("{}.tmp", file_name.to_string_lossy()));
        fs::copy(staged_file, &tmp).map_err(|e| apply_err(e.to_string()))?;
        fs::rename(&tmp, target_dir.join(file_name)).map_err(|e| apply_err(e.to_string()))?;
        Ok(())
    }
}
