//! Persisted per-repository version records.
//!
//! The version store is the sole basis for resuming an interrupted run: the
//! install sequencer commits a repository's version after every successful
//! install, so a restarted pipeline only resolves the patches that are still
//! missing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{PatchError, PatchResult};

/// Subdirectory of the install root holding one version record per
/// repository.
pub const VERSION_DIR: &str = ".patchver";

/// Durable per-repository version records.
///
/// Mutated only by the install sequencer, one repository at a time, never
/// concurrently for the same repository.
pub trait VersionStore: Send + Sync + 'static {
    /// Current local version of a repository, `None` if it has never been
    /// installed.
    fn get_local(&self, repository: &str) -> PatchResult<Option<String>>;

    /// Durably record a repository's version. Must be crash-safe for a
    /// single repository write.
    fn set_local(&self, repository: &str, version: &str) -> PatchResult<()>;
}

/// File-backed version store.
///
/// Keeps one `<repository>.ver` file under `<install_root>/.patchver/`.
/// Writes go to a temporary file first and are committed with an atomic
/// rename, so a crash mid-write leaves the previous record intact.
#[derive(Debug, Clone)]
pub struct FileVersionStore {
    dir: PathBuf,
}

impl FileVersionStore {
    /// Create a store rooted at `<install_root>/.patchver/`.
    pub fn new(install_root: impl AsRef<Path>) -> Self {
        Self {
            dir: install_root.as_ref().join(VERSION_DIR),
        }
    }

    fn record_path(&self, repository: &str) -> PathBuf {
        self.dir.join(format!("{repository}.ver"))
    }

    fn store_err(repository: &str, source: io::Error) -> PatchError {
        PatchError::VersionStore {
            repository: repository.to_string(),
            source,
        }
    }
}

impl VersionStore for FileVersionStore {
    fn get_local(&self, repository: &str) -> PatchResult<Option<String>> {
        match fs::read_to_string(self.record_path(repository)) {
            Ok(contents) => Ok(Some(contents.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::store_err(repository, e)),
        }
    }

    fn set_local(&self, repository: &str, version: &str) -> PatchResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Self::store_err(repository, e))?;

        let path = self.record_path(repository);
        let tmp = self.dir.join(format!("{repository}.ver.tmp"));
        fs::write(&tmp, version).map_err(|e| Self::store_err(repository, e))?;
        fs::rename(&tmp, &path).map_err(|e| Self::store_err(repository, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_get_local_missing_returns_none() {
        let root = TempDir::new().unwrap();
        let store = FileVersionStore::new(root.path());
        assert_eq!(store.get_local("game").unwrap(), None);
    }

    #[test]
    fn test_set_then_get_roundtrip() {
        let root = TempDir::new().unwrap();
        let store = FileVersionStore::new(root.path());

        store.set_local("game", "2023.09.15.0000").unwrap();
        assert_eq!(
            store.get_local("game").unwrap(),
            Some("2023.09.15.0000".to_string())
        );
    }

    #[test]
    fn test_set_overwrites_previous_record() {
        let root = TempDir::new().unwrap();
        let store = FileVersionStore::new(root.path());

        store.set_local("boot", "1.0.0").unwrap();
        store.set_local("boot", "1.0.1").unwrap();
        assert_eq!(store.get_local("boot").unwrap(), Some("1.0.1".to_string()));
    }

    #[test]
    fn test_repositories_are_independent() {
        let root = TempDir::new().unwrap();
        let store = FileVersionStore::new(root.path());

        store.set_local("game", "a").unwrap();
        store.set_local("ex1", "b").unwrap();

        assert_eq!(store.get_local("game").unwrap(), Some("a".to_string()));
        assert_eq!(store.get_local("ex1").unwrap(), Some("b".to_string()));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let root = TempDir::new().unwrap();
        let store = FileVersionStore::new(root.path());
        store.set_local("game", "v").unwrap();

        let leftovers: Vec<_> = fs::read_dir(root.path().join(VERSION_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|n| n.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
