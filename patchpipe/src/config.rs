//! Pipeline configuration.

use std::time::Duration;

/// Default number of concurrent network transfers.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default cadence for sampling byte progress of an active transfer.
pub const DEFAULT_TRANSFER_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

/// Default window for coalescing high-frequency progress into one event.
pub const DEFAULT_COALESCE_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration for a pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Maximum number of simultaneously open transfers.
    pub concurrency: usize,

    /// Keep staged patch files after a successful install instead of
    /// deleting them to reclaim disk space.
    pub keep_staged: bool,

    /// How often each active transfer reports byte progress.
    pub transfer_sample_interval: Duration,

    /// Time bucket for coalescing byte-progress events. State transitions
    /// (per-file completion, stage changes, terminal events) are always
    /// emitted immediately regardless of this window.
    pub coalesce_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            keep_staged: false,
            transfer_sample_interval: DEFAULT_TRANSFER_SAMPLE_INTERVAL,
            coalesce_interval: DEFAULT_COALESCE_INTERVAL,
        }
    }
}

impl PipelineConfig {
    /// Set the transfer concurrency limit (builder pattern).
    ///
    /// A limit of zero is clamped to one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Keep staged files after install (builder pattern).
    pub fn with_keep_staged(mut self, keep: bool) -> Self {
        self.keep_staged = keep;
        self
    }
}
