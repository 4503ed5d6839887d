//! Pipeline progress events.
//!
//! Events are ephemeral: they exist only for the duration of a run and are
//! discarded after delivery. The [`aggregator`] merges the transfer pool's
//! and install sequencer's raw updates into one time-ordered, rate-limited
//! stream; [`ProgressReport`] is the serde-serializable mirror of an event
//! for push-event transports.

mod aggregator;
mod throughput;

pub(crate) use aggregator::{Aggregator, ProgressSender};
pub use throughput::ThroughputEstimator;

use serde::Serialize;

/// Stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Checking,
    Downloading,
    Installing,
    Cleanup,
    Complete,
    Failed,
    Cancelled,
}

/// Counters describing the transfer side of a run at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSnapshot {
    /// Number of patch files in the batch.
    pub total_files: usize,
    /// Patch files fully downloaded (or skipped as already staged).
    pub completed_files: usize,
    /// Currently open transfers.
    pub active_transfers: usize,
    /// Sum of expected sizes across the batch.
    pub total_bytes: u64,
    /// Bytes accounted for so far, including already-staged files.
    pub bytes_transferred: u64,
    /// Rolling throughput estimate in bytes per second.
    pub throughput_bps: u64,
    /// File most recently making progress.
    pub current_file: Option<String>,
}

/// One event in the stream a pipeline run yields to its caller.
///
/// Byte-level updates are coalesced into at most one `Downloading` event per
/// coalescing window; per-file completions, stage changes and terminal
/// events are always delivered immediately. Exactly one terminal event
/// (`Complete`, `Failed` or `Cancelled`) ends every stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Resolving the required descriptor batch against local versions.
    Checking,
    /// Transfer progress.
    Downloading(TransferSnapshot),
    /// A patch was applied and its version record committed.
    Installing {
        total_files: usize,
        installed_files: usize,
        repository: String,
        file_name: String,
        target_version: String,
    },
    /// Removing now-empty staging directories.
    Cleanup,
    /// The run finished; `up_to_date` is set when no patch was required.
    Complete { up_to_date: bool },
    /// The run failed; prior installs are kept and resumable.
    Failed {
        message: String,
        file_name: Option<String>,
    },
    /// The run was cancelled; state is consistent at the last committed
    /// install.
    Cancelled,
}

impl PipelineEvent {
    /// Stage this event belongs to.
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Checking => PipelineStage::Checking,
            Self::Downloading(_) => PipelineStage::Downloading,
            Self::Installing { .. } => PipelineStage::Installing,
            Self::Cleanup => PipelineStage::Cleanup,
            Self::Complete { .. } => PipelineStage::Complete,
            Self::Failed { .. } => PipelineStage::Failed,
            Self::Cancelled => PipelineStage::Cancelled,
        }
    }

    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete { .. } | Self::Failed { .. } | Self::Cancelled
        )
    }

    /// Wire-level form of this event.
    pub fn to_report(&self) -> ProgressReport {
        let mut report = ProgressReport {
            stage: self.stage(),
            ..ProgressReport::default()
        };

        match self {
            Self::Downloading(s) => {
                report.total_items = s.total_files;
                report.completed_items = s.completed_files;
                report.active_transfers = s.active_transfers;
                report.total_bytes = s.total_bytes;
                report.bytes_transferred = s.bytes_transferred;
                report.throughput_bytes_per_sec = s.throughput_bps;
                report.current_file = s.current_file.clone();
            }
            Self::Installing {
                total_files,
                installed_files,
                file_name,
                ..
            } => {
                report.total_items = *total_files;
                report.completed_items = *installed_files;
                report.current_file = Some(file_name.clone());
            }
            Self::Complete { .. } => report.is_complete = true,
            Self::Failed { message, file_name } => {
                report.has_error = true;
                report.error_message = Some(message.clone());
                report.current_file = file_name.clone();
            }
            Self::Checking | Self::Cleanup | Self::Cancelled => {}
        }

        report
    }
}

/// Wire-level progress schema for push-event transports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub stage: PipelineStage,
    pub total_items: usize,
    pub completed_items: usize,
    pub active_transfers: usize,
    pub total_bytes: u64,
    pub bytes_transferred: u64,
    pub throughput_bytes_per_sec: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    pub is_complete: bool,
    pub has_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Default for ProgressReport {
    fn default() -> Self {
        Self {
            stage: PipelineStage::Checking,
            total_items: 0,
            completed_items: 0,
            active_transfers: 0,
            total_bytes: 0,
            bytes_transferred: 0,
            throughput_bytes_per_sec: 0,
            current_file: None,
            is_complete: false,
            has_error: false,
            error_message: None,
        }
    }
}
