//! Pipeline orchestrator.
//!
//! One [`Patcher`] owns the four collaborators (catalog resolver, patch
//! source, applier, version store) and drives a run: resolve the required
//! batch, stream it through the transfer pool into the install sequencer,
//! and report progress through a single ordered event channel. The caller
//! consumes events; the pipeline itself never blocks on the consumer.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::applier::PatchApplier;
use crate::catalog::{CatalogResolver, CheckSummary};
use crate::config::PipelineConfig;
use crate::descriptor::PatchDescriptor;
use crate::error::{PatchError, PatchResult};
use crate::install::InstallSequencer;
use crate::progress::{Aggregator, PipelineEvent};
use crate::transfer::{staging, PatchSource, TransferPool};
use crate::version::VersionStore;

/// The patch pipeline.
///
/// Runs are resumable: staged files and version records persist across
/// process restarts, so an interrupted run picks up where it stopped. At
/// most one run is active per instance; a second [`run`](Self::run) while
/// one is in flight returns [`PatchError::AlreadyRunning`].
pub struct Patcher<C, S, A, V> {
    catalog: Arc<C>,
    source: Arc<S>,
    applier: Arc<A>,
    versions: Arc<V>,
    install_root: PathBuf,
    config: PipelineConfig,
    cancel: CancellationToken,
    in_progress: Arc<AtomicBool>,
}

impl<C, S, A, V> Patcher<C, S, A, V>
where
    C: CatalogResolver,
    S: PatchSource,
    A: PatchApplier,
    V: VersionStore,
{
    pub fn new(
        catalog: C,
        source: S,
        applier: A,
        versions: V,
        install_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            source: Arc::new(source),
            applier: Arc::new(applier),
            versions: Arc::new(versions),
            install_root: install_root.into(),
            config: PipelineConfig::default(),
            cancel: CancellationToken::new(),
            in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the pipeline configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Token cancelling this patcher. Cancellation is sticky: a cancelled
    /// patcher refuses further runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cooperative cancellation of the active run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Non-mutating dry run: resolve the catalog against local versions and
    /// summarize what a run would transfer.
    pub async fn check_only(&self) -> PatchResult<CheckSummary> {
        let descriptors = self.catalog.resolve_required(&*self.versions).await?;
        Ok(CheckSummary::from_descriptors(&descriptors))
    }

    /// Start a pipeline run.
    ///
    /// Returns the event channel immediately; the run itself proceeds on
    /// background tasks and always ends with exactly one terminal event
    /// (`Complete`, `Failed`, or `Cancelled`) on the channel.
    pub fn run(&self) -> PatchResult<mpsc::UnboundedReceiver<PipelineEvent>> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PatchError::AlreadyRunning);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            catalog: Arc::clone(&self.catalog),
            source: Arc::clone(&self.source),
            applier: Arc::clone(&self.applier),
            versions: Arc::clone(&self.versions),
            install_root: self.install_root.clone(),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
            in_progress: Arc::clone(&self.in_progress),
            events_tx,
        };

        tokio::spawn(driver.drive());

        Ok(events_rx)
    }
}

/// Owned state of one run's driver task.
struct Driver<C, S, A, V> {
    catalog: Arc<C>,
    source: Arc<S>,
    applier: Arc<A>,
    versions: Arc<V>,
    install_root: PathBuf,
    config: PipelineConfig,
    cancel: CancellationToken,
    in_progress: Arc<AtomicBool>,
    events_tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl<C, S, A, V> Driver<C, S, A, V>
where
    C: CatalogResolver,
    S: PatchSource,
    A: PatchApplier,
    V: VersionStore,
{
    async fn drive(self) {
        self.emit(PipelineEvent::Checking);

        let descriptors = match self.catalog.resolve_required(&*self.versions).await {
            Ok(descriptors) => descriptors,
            Err(error) => {
                warn!(%error, "catalog resolution failed");
                self.finish(PipelineEvent::Failed {
                    message: error.to_string(),
                    file_name: None,
                });
                return;
            }
        };

        if descriptors.is_empty() {
            info!("all repositories up to date");
            self.finish(PipelineEvent::Complete { up_to_date: true });
            return;
        }

        let summary = CheckSummary::from_descriptors(&descriptors);
        info!(
            files = summary.required_count,
            bytes = summary.total_bytes,
            "starting patch run"
        );

        self.transfer_and_install(descriptors, &summary).await;
    }

    /// Run the transfer pool and install sequencer to completion, then
    /// deliver the terminal event through the aggregator so it lands after
    /// every progress event already queued.
    async fn transfer_and_install(&self, descriptors: Vec<PatchDescriptor>, summary: &CheckSummary) {
        let (progress, aggregator) = Aggregator::spawn(
            &self.config,
            summary.required_count,
            summary.total_bytes,
            self.events_tx.clone(),
        );

        // The run token is a child of the patcher token: external
        // cancellation reaches both stages, and the sequencer cancels only
        // this run when a failure must stop the pool.
        let run_token = self.cancel.child_token();
        let pool = TransferPool::new(
            Arc::clone(&self.source),
            self.config.clone(),
            progress.clone(),
            run_token.clone(),
        );
        let sequencer = InstallSequencer::new(
            Arc::clone(&self.applier),
            Arc::clone(&self.versions),
            self.install_root.clone(),
            self.config.keep_staged,
            progress.clone(),
            run_token,
        );

        let (results_tx, results_rx) = mpsc::channel(self.config.concurrency.max(1));
        let (_, outcome) = tokio::join!(
            pool.run(descriptors, &self.install_root, results_tx),
            sequencer.run(results_rx),
        );

        let terminal = if self.cancel.is_cancelled() {
            info!("patch run cancelled");
            PipelineEvent::Cancelled
        } else {
            match outcome {
                Ok(installed) => {
                    progress.emit(PipelineEvent::Cleanup);
                    if !self.config.keep_staged {
                        if let Err(error) =
                            staging::remove_empty_staging_dirs(&self.install_root).await
                        {
                            warn!(%error, "staging cleanup failed");
                        }
                    }
                    info!(installed, "patch run complete");
                    PipelineEvent::Complete { up_to_date: false }
                }
                Err(PatchError::Cancelled) => PipelineEvent::Cancelled,
                Err(error) => {
                    warn!(%error, "patch run failed");
                    PipelineEvent::Failed {
                        file_name: error.file_name().map(str::to_string),
                        message: error.to_string(),
                    }
                }
            }
        };

        // Release the run slot before the terminal event becomes visible, so
        // a caller reacting to it can start the next run immediately.
        self.in_progress.store(false, Ordering::SeqCst);
        progress.emit(terminal);
        let _ = aggregator.await;
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Release the run slot, then deliver the terminal event.
    fn finish(&self, event: PipelineEvent) {
        self.in_progress.store(false, Ordering::SeqCst);
        self.emit(event);
    }
}
