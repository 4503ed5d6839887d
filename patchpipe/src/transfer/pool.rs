//! Bounded-concurrency transfer worker pool.
//!
//! Downloads each descriptor of a batch exactly once, writing bytes into
//! the staging tree. At most `concurrency` transfers are open at a time;
//! completion order is arbitrary and the install sequencer re-establishes
//! per-repository order downstream. The pool never retries: a failed
//! transfer surfaces as a failed [`TransferResult`] and the orchestrator
//! escalates it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::source::PatchSource;
use super::staging::{self, StagedStatus};
use crate::config::PipelineConfig;
use crate::descriptor::PatchDescriptor;
use crate::error::{PatchError, PatchResult};
use crate::progress::ProgressSender;

/// Read buffer size when hashing staged files.
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Outcome of one descriptor's transfer.
///
/// Produced exactly once per descriptor; consumed exactly once by the
/// install sequencer. Ownership of the staged file transfers with it.
#[derive(Debug)]
pub struct TransferResult {
    /// The descriptor this result belongs to.
    pub descriptor: PatchDescriptor,
    /// Where the staged file lives.
    pub staging_path: PathBuf,
    /// Network bytes written during this run (zero when the file was
    /// already staged).
    pub bytes_written: u64,
    /// Why the transfer failed, if it did.
    pub error: Option<PatchError>,
}

impl TransferResult {
    /// Whether the staged file is complete and verified.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// The worker pool. One instance drives one batch.
pub(crate) struct TransferPool<S> {
    source: Arc<S>,
    config: PipelineConfig,
    progress: ProgressSender,
    cancel: CancellationToken,
}

impl<S: PatchSource> TransferPool<S> {
    pub fn new(
        source: Arc<S>,
        config: PipelineConfig,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            config,
            progress,
            cancel,
        }
    }

    /// Transfer the whole batch, forwarding each result to the install
    /// sequencer as it completes. Returns once every descriptor has been
    /// resolved or the pool was cancelled.
    pub async fn run(
        &self,
        descriptors: Vec<PatchDescriptor>,
        install_root: &Path,
        results_tx: mpsc::Sender<TransferResult>,
    ) {
        let transfers: Vec<_> = descriptors
            .into_iter()
            .map(|d| self.transfer_one(d, install_root))
            .collect();

        futures::stream::iter(transfers)
            .buffer_unordered(self.config.concurrency)
            .for_each(|result| {
                let results_tx = results_tx.clone();
                async move {
                    match &result.error {
                        None => self.progress.transfer_completed(&result.descriptor.file_name),
                        // Cancelled transfers are abandoned, not handed off.
                        Some(PatchError::Cancelled) => return,
                        Some(error) => {
                            warn!(file = %result.descriptor, %error, "transfer failed");
                            self.progress.transfer_failed(&result.descriptor.file_name);
                        }
                    }
                    let _ = results_tx.send(result).await;
                }
            })
            .await;
    }

    async fn transfer_one(
        &self,
        descriptor: PatchDescriptor,
        install_root: &Path,
    ) -> TransferResult {
        let staging_path = descriptor.staging_path(install_root);
        match self.try_transfer(&descriptor, &staging_path).await {
            Ok(bytes_written) => TransferResult {
                descriptor,
                staging_path,
                bytes_written,
                error: None,
            },
            Err(error) => TransferResult {
                descriptor,
                staging_path,
                bytes_written: 0,
                error: Some(error),
            },
        }
    }

    async fn try_transfer(
        &self,
        descriptor: &PatchDescriptor,
        staging_path: &Path,
    ) -> PatchResult<u64> {
        if self.cancel.is_cancelled() {
            return Err(PatchError::Cancelled);
        }

        match staging::staged_status(staging_path, descriptor.expected_size).await? {
            StagedStatus::Complete => match &descriptor.expected_sha256 {
                Some(expected) if &file_sha256(staging_path).await? != expected => {
                    warn!(file = %descriptor, "staged file failed checksum verification, re-downloading");
                    staging::remove_partial(staging_path).await;
                }
                _ => return self.report_already_staged(descriptor),
            },
            StagedStatus::SizeMismatch { actual } => {
                warn!(
                    file = %descriptor,
                    actual,
                    expected = descriptor.expected_size,
                    "staged file has wrong size, re-downloading"
                );
                staging::remove_partial(staging_path).await;
            }
            StagedStatus::Missing => {}
        }

        let result = self.download(descriptor, staging_path).await;
        if result.is_err() {
            // Never leave a corrupt staging file behind.
            staging::remove_partial(staging_path).await;
        }
        result
    }

    fn report_already_staged(&self, descriptor: &PatchDescriptor) -> PatchResult<u64> {
        debug!(file = %descriptor, "staged file already complete, skipping transfer");
        self.progress.transfer_started(&descriptor.file_name);
        self.progress.transfer_bytes(descriptor.expected_size);
        Ok(0)
    }

    async fn download(
        &self,
        descriptor: &PatchDescriptor,
        staging_path: &Path,
    ) -> PatchResult<u64> {
        staging::prepare_parent(staging_path).await?;
        self.progress.transfer_started(&descriptor.file_name);

        let io_err = |e: std::io::Error| PatchError::Io {
            path: staging_path.to_path_buf(),
            source: e,
        };

        let body = self.source.fetch(&descriptor.source_url).await?;
        if let Some(advertised) = body.content_length {
            if advertised != descriptor.expected_size {
                return Err(PatchError::SizeMismatch {
                    path: staging_path.to_path_buf(),
                    expected: descriptor.expected_size,
                    actual: advertised,
                });
            }
        }

        let file = tokio::fs::File::create(staging_path).await.map_err(io_err)?;
        let mut writer = tokio::io::BufWriter::new(file);
        let mut hasher = descriptor.expected_sha256.as_ref().map(|_| Sha256::new());
        let mut stream = body.stream;
        let mut written: u64 = 0;
        let mut reported: u64 = 0;
        let mut last_sample = Instant::now();

        while let Some(chunk) = stream.next().await {
            if self.cancel.is_cancelled() {
                // The transfer was announced as started; release its active
                // slot so snapshots emitted while cancellation drains stay
                // accurate.
                self.progress.transfer_abandoned(&descriptor.file_name);
                return Err(PatchError::Cancelled);
            }
            let chunk = chunk?;
            writer.write_all(&chunk).await.map_err(io_err)?;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&chunk);
            }
            written += chunk.len() as u64;

            // Sample byte progress at a bounded cadence, not per chunk.
            if last_sample.elapsed() >= self.config.transfer_sample_interval {
                self.progress.transfer_bytes(written - reported);
                reported = written;
                last_sample = Instant::now();
            }
        }
        writer.flush().await.map_err(io_err)?;

        if written != descriptor.expected_size {
            return Err(PatchError::SizeMismatch {
                path: staging_path.to_path_buf(),
                expected: descriptor.expected_size,
                actual: written,
            });
        }

        if let (Some(expected), Some(hasher)) = (&descriptor.expected_sha256, hasher) {
            let actual = format!("{:x}", hasher.finalize());
            if &actual != expected {
                return Err(PatchError::ChecksumMismatch {
                    file_name: descriptor.file_name.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        self.progress.transfer_bytes(written - reported);
        Ok(written)
    }
}

/// SHA-256 of a file on disk, lowercase hex.
async fn file_sha256(path: &Path) -> PatchResult<String> {
    let io_err = |e: std::io::Error| PatchError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf).await.map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
