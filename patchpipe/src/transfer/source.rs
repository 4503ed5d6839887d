//! Byte-stream provider abstraction.
//!
//! The transfer pool only needs "URL in, byte stream out"; everything about
//! transport configuration lives behind [`PatchSource`]. Production code
//! uses the reqwest-backed [`HttpPatchSource`](super::HttpPatchSource),
//! tests substitute in-memory sources with artificial delays and failures.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::PatchResult;

/// An open download: the advertised length (when the server sends one) and
/// the chunked body.
pub struct PatchStream {
    /// Content length advertised by the server, if any.
    pub content_length: Option<u64>,
    /// Chunked body; each item is one buffer of bytes or a transfer error.
    pub stream: BoxStream<'static, PatchResult<Bytes>>,
}

/// Provider of patch file byte streams.
#[async_trait]
pub trait PatchSource: Send + Sync + 'static {
    /// Open a download for `url`.
    async fn fetch(&self, url: &str) -> PatchResult<PatchStream>;
}
