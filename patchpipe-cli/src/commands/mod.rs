//! CLI subcommands.

pub mod check;
pub mod update;

use std::path::PathBuf;

use patchpipe::{FileVersionStore, HttpPatchSource, Patcher, PipelineConfig, RemoteCatalog};

use crate::applier::FileDropApplier;
use crate::error::CliError;

/// Options shared by the subcommands.
#[derive(Debug, Clone, clap::Args)]
pub struct CommonArgs {
    /// URL of the published patch manifest
    #[arg(long)]
    pub manifest_url: String,

    /// Root directory of the client installation
    #[arg(long, default_value = ".")]
    pub install_root: PathBuf,

    /// Emit machine-readable JSON instead of human output
    #[arg(long)]
    pub json: bool,
}

/// Build a patcher wired with the HTTP catalog and source.
pub fn build_patcher(
    args: &CommonArgs,
    config: PipelineConfig,
) -> Result<Patcher<RemoteCatalog, HttpPatchSource, FileDropApplier, FileVersionStore>, CliError> {
    Ok(Patcher::new(
        RemoteCatalog::new(args.manifest_url.clone()),
        HttpPatchSource::new()?,
        FileDropApplier,
        FileVersionStore::new(&args.install_root),
        &args.install_root,
    )
    .with_config(config))
}
