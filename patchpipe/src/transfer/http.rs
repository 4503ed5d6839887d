//! reqwest-backed patch source.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::source::{PatchSource, PatchStream};
use crate::error::{PatchError, PatchResult};

/// Default timeout for establishing a connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP(S) patch source.
///
/// No overall request timeout is set: patch files are large and transfer
/// time is unbounded by design. Stalls surface as stream errors from the
/// connection layer.
#[derive(Debug, Clone)]
pub struct HttpPatchSource {
    client: reqwest::Client,
}

impl HttpPatchSource {
    /// Create a source with default transport settings.
    pub fn new() -> PatchResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| PatchError::Transfer {
                url: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    /// Create a source reusing an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PatchSource for HttpPatchSource {
    async fn fetch(&self, url: &str) -> PatchResult<PatchStream> {
        let transfer_err = |reason: String| PatchError::Transfer {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transfer_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(transfer_err(format!("HTTP {}", response.status())));
        }

        let content_length = response.content_length();
        let stream_url = url.to_string();
        let stream = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| PatchError::Transfer {
                    url: stream_url.clone(),
                    reason: e.to_string(),
                })
            })
            .boxed();

        Ok(PatchStream {
            content_length,
            stream,
        })
    }
}
