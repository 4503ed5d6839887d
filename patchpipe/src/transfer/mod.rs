//! Patch acquisition: sources, staging, and the bounded worker pool.
//!
//! Layout:
//! - `source` - the [`PatchSource`] trait and its stream type
//! - `http` - reqwest-backed production source
//! - `staging` - filesystem helpers for the `.patches/` tree
//! - `pool` - the bounded-concurrency download pool

mod http;
mod pool;
mod source;
pub mod staging;

pub use http::HttpPatchSource;
pub use pool::TransferResult;
pub use source::{PatchSource, PatchStream};
pub use staging::StagedStatus;

pub(crate) use pool::TransferPool;
