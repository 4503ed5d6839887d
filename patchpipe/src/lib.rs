//! patchpipe - Patch distribution pipeline for multi-repository game clients
//!
//! This library drives a client installation from its recorded per-repository
//! versions to the latest published state: resolve the required patch chain
//! from a catalog, download with bounded concurrency, install strictly in
//! per-repository order, and report merged progress over one event channel.
//!
//! The entry point is [`Patcher`]; the seams a host application plugs into
//! are [`CatalogResolver`], [`PatchSource`], [`PatchApplier`], and
//! [`VersionStore`].

pub mod applier;
pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod error;
mod install;
pub mod pipeline;
pub mod progress;
pub mod transfer;
pub mod version;

pub use applier::PatchApplier;
pub use catalog::{CatalogResolver, CheckSummary, Manifest, RemoteCatalog};
pub use config::PipelineConfig;
pub use descriptor::PatchDescriptor;
pub use error::{PatchError, PatchResult};
pub use pipeline::Patcher;
pub use progress::{PipelineEvent, PipelineStage, ProgressReport, TransferSnapshot};
pub use transfer::{HttpPatchSource, PatchSource, PatchStream, TransferResult};
pub use version::{FileVersionStore, VersionStore};
