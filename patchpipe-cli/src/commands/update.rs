//! `patchpipe update` - run the patch pipeline to completion.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use super::{build_patcher, CommonArgs};
use crate::error::CliError;
use patchpipe::{PipelineConfig, PipelineEvent};

#[derive(Debug, Clone, clap::Args)]
pub struct UpdateArgs {
    /// Maximum number of concurrent downloads
    #[arg(long, default_value_t = patchpipe::config::DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Keep downloaded patch files after installation
    #[arg(long)]
    pub keep_staged: bool,
}

pub async fn run(args: &CommonArgs, update: &UpdateArgs) -> Result<(), CliError> {
    let config = PipelineConfig::default()
        .with_concurrency(update.concurrency)
        .with_keep_staged(update.keep_staged);
    let patcher = build_patcher(args, config)?;

    // Ctrl-C requests cooperative cancellation; the pipeline finishes the
    // install in flight and ends the stream with a Cancelled event.
    let cancel = patcher.cancellation_token();
    ctrlc::set_handler(move || cancel.cancel()).map_err(|e| CliError::Signal(e.to_string()))?;

    let events = patcher.run()?;
    if args.json {
        consume_json(events).await
    } else {
        consume_console(events).await
    }
}

/// One camelCase JSON report per line, for wrapping launchers.
async fn consume_json(
    mut events: tokio::sync::mpsc::UnboundedReceiver<PipelineEvent>,
) -> Result<(), CliError> {
    while let Some(event) = events.recv().await {
        println!("{}", serde_json::to_string(&event.to_report())?);
        if event.is_terminal() {
            return terminal_result(event);
        }
    }
    Err(CliError::UpdateFailed(
        "event stream ended without a terminal event".to_string(),
    ))
}

async fn consume_console(
    mut events: tokio::sync::mpsc::UnboundedReceiver<PipelineEvent>,
) -> Result<(), CliError> {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = events.recv().await {
        match &event {
            PipelineEvent::Checking => {
                println!("Checking for updates...");
            }
            PipelineEvent::Downloading(s) => {
                let bar = bar.get_or_insert_with(|| download_bar(s.total_bytes));
                bar.set_position(s.bytes_transferred);
                if let Some(file) = &s.current_file {
                    bar.set_message(format!(
                        "{}/{} {}",
                        s.completed_files, s.total_files, file
                    ));
                }
            }
            PipelineEvent::Installing {
                repository,
                file_name,
                target_version,
                installed_files,
                total_files,
            } => {
                let line = format!(
                    "{} installed {repository}/{file_name} -> {target_version} ({installed_files}/{total_files})",
                    style("✓").green(),
                );
                match &bar {
                    Some(bar) => bar.println(line),
                    None => println!("{line}"),
                }
            }
            PipelineEvent::Cleanup => debug!("cleaning up staging directories"),
            _ => {}
        }

        if event.is_terminal() {
            if let Some(bar) = bar.take() {
                bar.finish_and_clear();
            }
            match &event {
                PipelineEvent::Complete { up_to_date: true } => {
                    println!("{} client is up to date", style("✓").green());
                }
                PipelineEvent::Complete { up_to_date: false } => {
                    println!("{} update complete", style("✓").green());
                }
                PipelineEvent::Failed { message, .. } => {
                    eprintln!("{} {message}", style("✗").red());
                }
                _ => {
                    eprintln!("{} update cancelled", style("✗").yellow());
                }
            }
            return terminal_result(event);
        }
    }
    Err(CliError::UpdateFailed(
        "event stream ended without a terminal event".to_string(),
    ))
}

fn download_bar(total_bytes: u64) -> ProgressBar {
    let bar = ProgressBar::new(total_bytes);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({binary_bytes_per_sec}) {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
    );
    bar
}

fn terminal_result(event: PipelineEvent) -> Result<(), CliError> {
    match event {
        PipelineEvent::Complete { .. } => Ok(()),
        PipelineEvent::Failed { message, .. } => Err(CliError::UpdateFailed(message)),
        PipelineEvent::Cancelled => Err(CliError::Cancelled),
        // Non-terminal events never reach here.
        other => Err(CliError::UpdateFailed(format!(
            "unexpected terminal event: {other:?}"
        ))),
    }
}
