//! Ordered install driver.
//!
//! Consumes transfer results as the pool produces them, restores
//! per-repository order through the [`ReorderBuffer`], and runs apply +
//! version commit for each released result on a blocking thread. Any
//! failure is fatal: the sequencer cancels the run token so the pool stops
//! opening new transfers, and returns the error. Installs already committed
//! keep their version records.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::reorder::ReorderBuffer;
use crate::applier::PatchApplier;
use crate::error::{PatchError, PatchResult};
use crate::progress::ProgressSender;
use crate::transfer::TransferResult;
use crate::version::VersionStore;

pub(crate) struct InstallSequencer<A, V> {
    applier: Arc<A>,
    versions: Arc<V>,
    install_root: PathBuf,
    keep_staged: bool,
    progress: ProgressSender,
    run_token: CancellationToken,
}

impl<A: PatchApplier, V: VersionStore> InstallSequencer<A, V> {
    pub fn new(
        applier: Arc<A>,
        versions: Arc<V>,
        install_root: PathBuf,
        keep_staged: bool,
        progress: ProgressSender,
        run_token: CancellationToken,
    ) -> Self {
        Self {
            applier,
            versions,
            install_root,
            keep_staged,
            progress,
            run_token,
        }
    }

    /// Install results until the channel closes or a failure stops the run.
    /// Returns the number of patches installed.
    pub async fn run(&self, mut results_rx: mpsc::Receiver<TransferResult>) -> PatchResult<usize> {
        let mut buffer = ReorderBuffer::new();
        let mut installed = 0usize;

        while let Some(mut result) = results_rx.recv().await {
            if let Some(error) = result.error.take() {
                // Stop the pool from opening further transfers.
                self.run_token.cancel();
                return Err(error);
            }

            for ready in buffer.accept(result) {
                if self.run_token.is_cancelled() {
                    return Err(PatchError::Cancelled);
                }
                if let Err(error) = self.install_one(ready).await {
                    self.run_token.cancel();
                    return Err(error);
                }
                installed += 1;
            }
        }

        if buffer.pending_len() > 0 {
            // Only reachable when the pool abandoned transfers mid-run.
            debug!(
                held_back = buffer.pending_len(),
                "transfer channel closed with results still waiting on predecessors"
            );
        }
        Ok(installed)
    }

    async fn install_one(&self, result: TransferResult) -> PatchResult<()> {
        let descriptor = result.descriptor;
        let staging_path = result.staging_path;

        debug!(file = %descriptor, version = %descriptor.target_version, "applying patch");

        let applier = Arc::clone(&self.applier);
        let versions = Arc::clone(&self.versions);
        let install_root = self.install_root.clone();
        let task_descriptor = descriptor.clone();
        let task_path = staging_path.clone();

        // Apply and version commit are blocking filesystem work. The version
        // record is written only after a successful apply, so a crash between
        // the two re-applies the patch on the next run.
        tokio::task::spawn_blocking(move || {
            applier.apply(&task_path, &install_root, &task_descriptor.repository)?;
            versions.set_local(&task_descriptor.repository, &task_descriptor.target_version)
        })
        .await
        .map_err(|e| PatchError::Apply {
            repository: descriptor.repository.clone(),
            file_name: descriptor.file_name.clone(),
            reason: format!("install task panicked: {e}"),
        })??;

        if !self.keep_staged {
            // Disk reclaim only. A leftover staged file is harmless: the
            // next run skips it as already complete or re-downloads it.
            match tokio::fs::remove_file(&staging_path).await {
                Ok(()) => debug!(path = %staging_path.display(), "removed staged file after install"),
                Err(e) => {
                    warn!(path = %staging_path.display(), error = %e, "failed to remove staged file after install")
                }
            }
        }

        info!(
            repository = %descriptor.repository,
            file = %descriptor.file_name,
            version = %descriptor.target_version,
            "patch installed"
        );
        self.progress.install_completed(
            &descriptor.repository,
            &descriptor.file_name,
            &descriptor.target_version,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::descriptor::PatchDescriptor;
    use crate::progress::{Aggregator, PipelineEvent};
    use crate::version::FileVersionStore;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Applier recording the order patches were applied in.
    #[derive(Default)]
    struct RecordingApplier {
        applied: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl PatchApplier for RecordingApplier {
        fn apply(
            &self,
            staged_file: &Path,
            _install_root: &Path,
            repository: &str,
        ) -> PatchResult<()> {
            let file_name = staged_file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("?")
                .to_string();
            if self.fail_on.as_deref() == Some(file_name.as_str()) {
                return Err(PatchError::Apply {
                    repository: repository.to_string(),
                    file_name,
                    reason: "corrupt patch data".to_string(),
                });
            }
            self.applied
                .lock()
                .unwrap()
                .push(format!("{repository}/{file_name}"));
            Ok(())
        }
    }

    fn staged_result(root: &Path, repository: &str, index: usize) -> TransferResult {
        let descriptor = PatchDescriptor {
            repository: repository.to_string(),
            file_name: format!("p{index}.patch"),
            source_url: format!("mock://{repository}/p{index}.patch"),
            expected_size: 4,
            target_version: format!("{repository}-{index}"),
            sequence_index: index,
            expected_sha256: None,
        };
        let staging_path = descriptor.staging_path(root);
        std::fs::create_dir_all(staging_path.parent().unwrap()).unwrap();
        std::fs::write(&staging_path, b"data").unwrap();
        TransferResult {
            descriptor,
            staging_path,
            bytes_written: 4,
            error: None,
        }
    }

    struct Harness {
        root: TempDir,
        applier: Arc<RecordingApplier>,
        versions: Arc<FileVersionStore>,
        run_token: CancellationToken,
    }

    impl Harness {
        fn new(applier: RecordingApplier) -> Self {
            let root = TempDir::new().unwrap();
            let versions = Arc::new(FileVersionStore::new(root.path()));
            Self {
                root,
                applier: Arc::new(applier),
                versions,
                run_token: CancellationToken::new(),
            }
        }

        async fn run(&self, results: Vec<TransferResult>, keep_staged: bool) -> PatchResult<usize> {
            let config = PipelineConfig::default();
            let (events_tx, _events_rx) = mpsc::unbounded_channel();
            let (progress, aggregator) =
                Aggregator::spawn(&config, results.len(), 0, events_tx);

            let (results_tx, results_rx) = mpsc::channel(results.len().max(1));
            for result in results {
                results_tx.send(result).await.unwrap();
            }
            drop(results_tx);

            let sequencer = InstallSequencer::new(
                Arc::clone(&self.applier),
                Arc::clone(&self.versions),
                self.root.path().to_path_buf(),
                keep_staged,
                progress.clone(),
                self.run_token.clone(),
            );
            let outcome = sequencer.run(results_rx).await;

            progress.emit(PipelineEvent::Cancelled);
            aggregator.await.unwrap();
            outcome
        }
    }

    #[tokio::test]
    async fn test_out_of_order_results_install_in_sequence_order() {
        let h = Harness::new(RecordingApplier::default());
        let results = vec![
            staged_result(h.root.path(), "game", 2),
            staged_result(h.root.path(), "game", 0),
            staged_result(h.root.path(), "boot", 0),
            staged_result(h.root.path(), "game", 1),
        ];

        let installed = h.run(results, false).await.unwrap();
        assert_eq!(installed, 4);

        let applied = h.applier.applied.lock().unwrap().clone();
        let game: Vec<_> = applied.iter().filter(|a| a.starts_with("game/")).collect();
        assert_eq!(game, vec!["game/p0.patch", "game/p1.patch", "game/p2.patch"]);

        // Version records advanced to the newest installed patch.
        assert_eq!(h.versions.get_local("game").unwrap().as_deref(), Some("game-2"));
        assert_eq!(h.versions.get_local("boot").unwrap().as_deref(), Some("boot-0"));
    }

    #[tokio::test]
    async fn test_staged_files_are_deleted_after_install() {
        let h = Harness::new(RecordingApplier::default());
        let result = staged_result(h.root.path(), "game", 0);
        let staged = result.staging_path.clone();

        h.run(vec![result], false).await.unwrap();
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_keep_staged_leaves_files_in_place() {
        let h = Harness::new(RecordingApplier::default());
        let result = staged_result(h.root.path(), "game", 0);
        let staged = result.staging_path.clone();

        h.run(vec![result], true).await.unwrap();
        assert!(staged.exists());
    }

    #[tokio::test]
    async fn test_failed_transfer_is_fatal_and_cancels_run_token() {
        let h = Harness::new(RecordingApplier::default());
        let mut failed = staged_result(h.root.path(), "game", 0);
        failed.error = Some(PatchError::Transfer {
            url: failed.descriptor.source_url.clone(),
            reason: "connection reset".to_string(),
        });

        let err = h.run(vec![failed], false).await.unwrap_err();
        assert!(matches!(err, PatchError::Transfer { .. }));
        assert!(h.run_token.is_cancelled());
        assert!(h.applier.applied.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_failure_keeps_prior_version_records() {
        let h = Harness::new(RecordingApplier {
            applied: Mutex::new(Vec::new()),
            fail_on: Some("p1.patch".to_string()),
        });
        let results = vec![
            staged_result(h.root.path(), "game", 0),
            staged_result(h.root.path(), "game", 1),
        ];

        let err = h.run(results, false).await.unwrap_err();
        assert!(matches!(err, PatchError::Apply { .. }));
        assert!(h.run_token.is_cancelled());

        // p0 committed before the failure; p1 never recorded.
        assert_eq!(h.versions.get_local("game").unwrap().as_deref(), Some("game-0"));
    }
}
