//! Merges transfer and install progress into one ordered event stream.
//!
//! Both producers push raw updates into an unbounded channel, so neither is
//! ever blocked by a slow consumer; transfer and install throughput stay
//! independent of UI consumption speed. The aggregator task coalesces
//! byte-level updates into at most one `Downloading` event per window and
//! passes state transitions through immediately.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::trace;

use super::throughput::ThroughputEstimator;
use super::{PipelineEvent, TransferSnapshot};
use crate::config::PipelineConfig;

/// Raw updates from the transfer pool and install sequencer.
#[derive(Debug)]
pub(crate) enum RawUpdate {
    TransferStarted {
        file_name: String,
    },
    TransferBytes {
        delta: u64,
    },
    TransferCompleted {
        file_name: String,
    },
    TransferFailed {
        file_name: String,
    },
    /// A started transfer was dropped without completing, e.g. when a run
    /// is cancelled mid-stream. Releases its active slot.
    TransferAbandoned {
        file_name: String,
    },
    InstallCompleted {
        repository: String,
        file_name: String,
        target_version: String,
    },
    /// Pass an event through unchanged. Terminal events stop the aggregator.
    Emit(PipelineEvent),
}

/// Producer handle into the aggregator. Cheap to clone; never blocks.
#[derive(Clone, Debug)]
pub(crate) struct ProgressSender {
    tx: mpsc::UnboundedSender<RawUpdate>,
}

impl ProgressSender {
    pub fn transfer_started(&self, file_name: &str) {
        self.send(RawUpdate::TransferStarted {
            file_name: file_name.to_string(),
        });
    }

    pub fn transfer_bytes(&self, delta: u64) {
        self.send(RawUpdate::TransferBytes { delta });
    }

    pub fn transfer_completed(&self, file_name: &str) {
        self.send(RawUpdate::TransferCompleted {
            file_name: file_name.to_string(),
        });
    }

    pub fn transfer_failed(&self, file_name: &str) {
        self.send(RawUpdate::TransferFailed {
            file_name: file_name.to_string(),
        });
    }

    pub fn transfer_abandoned(&self, file_name: &str) {
        self.send(RawUpdate::TransferAbandoned {
            file_name: file_name.to_string(),
        });
    }

    pub fn install_completed(&self, repository: &str, file_name: &str, target_version: &str) {
        self.send(RawUpdate::InstallCompleted {
            repository: repository.to_string(),
            file_name: file_name.to_string(),
            target_version: target_version.to_string(),
        });
    }

    pub fn emit(&self, event: PipelineEvent) {
        self.send(RawUpdate::Emit(event));
    }

    fn send(&self, update: RawUpdate) {
        // The aggregator outlives both producers in a normal run; a closed
        // channel only happens when the consumer abandoned the run.
        let _ = self.tx.send(update);
    }
}

/// The aggregator task state.
pub(crate) struct Aggregator {
    raw_rx: mpsc::UnboundedReceiver<RawUpdate>,
    events_tx: mpsc::UnboundedSender<PipelineEvent>,
    snapshot: TransferSnapshot,
    installed_files: usize,
    throughput: ThroughputEstimator,
    coalesce: std::time::Duration,
    dirty: bool,
}

impl Aggregator {
    /// Spawn the aggregator for a batch of `total_files` descriptors
    /// summing to `total_bytes`.
    pub fn spawn(
        config: &PipelineConfig,
        total_files: usize,
        total_bytes: u64,
        events_tx: mpsc::UnboundedSender<PipelineEvent>,
    ) -> (ProgressSender, JoinHandle<()>) {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        let aggregator = Self {
            raw_rx,
            events_tx,
            snapshot: TransferSnapshot {
                total_files,
                total_bytes,
                ..TransferSnapshot::default()
            },
            installed_files: 0,
            throughput: ThroughputEstimator::new(),
            coalesce: config.coalesce_interval,
            dirty: false,
        };

        let handle = tokio::spawn(aggregator.run());
        (ProgressSender { tx: raw_tx }, handle)
    }

    async fn run(mut self) {
        let start = tokio::time::Instant::now() + self.coalesce;
        let mut tick = tokio::time::interval_at(start, self.coalesce);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                update = self.raw_rx.recv() => match update {
                    Some(update) => {
                        if self.handle(update) {
                            break;
                        }
                    }
                    // All producers gone without a terminal event; the
                    // orchestrator aborted. Nothing left to report.
                    None => break,
                },

                _ = tick.tick() => {
                    if self.dirty {
                        self.emit_downloading();
                    }
                }
            }
        }
    }

    /// Apply one raw update. Returns `true` once a terminal event has been
    /// delivered.
    fn handle(&mut self, update: RawUpdate) -> bool {
        match update {
            RawUpdate::TransferStarted { file_name } => {
                self.snapshot.active_transfers += 1;
                self.snapshot.current_file = Some(file_name);
                self.dirty = true;
            }
            RawUpdate::TransferBytes { delta } => {
                self.snapshot.bytes_transferred += delta;
                self.dirty = true;
            }
            RawUpdate::TransferCompleted { file_name } => {
                self.snapshot.active_transfers = self.snapshot.active_transfers.saturating_sub(1);
                self.snapshot.completed_files += 1;
                self.snapshot.current_file = Some(file_name);
                // Per-file completion is a state transition: never coalesced.
                self.emit_downloading();
            }
            RawUpdate::TransferFailed { file_name } => {
                self.snapshot.active_transfers = self.snapshot.active_transfers.saturating_sub(1);
                self.snapshot.current_file = Some(file_name);
                self.emit_downloading();
            }
            RawUpdate::TransferAbandoned { .. } => {
                self.snapshot.active_transfers = self.snapshot.active_transfers.saturating_sub(1);
                self.dirty = true;
            }
            RawUpdate::InstallCompleted {
                repository,
                file_name,
                target_version,
            } => {
                self.installed_files += 1;
                self.emit(PipelineEvent::Installing {
                    total_files: self.snapshot.total_files,
                    installed_files: self.installed_files,
                    repository,
                    file_name,
                    target_version,
                });
            }
            RawUpdate::Emit(event) => {
                let terminal = event.is_terminal();
                self.emit(event);
                return terminal;
            }
        }
        false
    }

    fn emit_downloading(&mut self) {
        self.snapshot.throughput_bps = self.throughput.sample(self.snapshot.bytes_transferred);
        let event = PipelineEvent::Downloading(self.snapshot.clone());
        self.emit(event);
        self.dirty = false;
    }

    fn emit(&self, event: PipelineEvent) {
        trace!(?event, "emitting pipeline event");
        let _ = self.events_tx.send(event);
    }
}
