//! Patch catalog: what the server publishes, and what is still required.
//!
//! The catalog resolver turns the persisted local versions into the ordered
//! list of patch descriptors a run must transfer and install. Production
//! deployments use [`RemoteCatalog`], which fetches a JSON manifest over
//! HTTP; tests implement [`CatalogResolver`] directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::PatchDescriptor;
use crate::error::{PatchError, PatchResult};
use crate::version::VersionStore;

/// Result of a non-mutating dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    /// Whether any patch is still required.
    pub needs_update: bool,
    /// Number of required patch files.
    pub required_count: usize,
    /// Sum of the expected sizes of all required patches.
    pub total_bytes: u64,
}

impl CheckSummary {
    /// Summarize a resolved descriptor batch.
    pub fn from_descriptors(descriptors: &[PatchDescriptor]) -> Self {
        Self {
            needs_update: !descriptors.is_empty(),
            required_count: descriptors.len(),
            total_bytes: descriptors.iter().map(|d| d.expected_size).sum(),
        }
    }
}

/// Resolves the ordered list of patches still required against the local
/// version records.
///
/// The returned list is grouped by repository, each group ordered
/// oldest-to-newest with contiguous `sequence_index` starting at 0.
#[async_trait]
pub trait CatalogResolver: Send + Sync + 'static {
    async fn resolve_required(
        &self,
        versions: &dyn VersionStore,
    ) -> PatchResult<Vec<PatchDescriptor>>;
}

// =============================================================================
// Manifest format
// =============================================================================

/// One patch entry in the published manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestPatch {
    /// Patch file name, unique within the repository.
    pub file: String,
    /// Download URL for the patch file.
    pub url: String,
    /// Size of the patch file in bytes.
    pub size: u64,
    /// Repository version after this patch is applied.
    pub version: String,
    /// Optional SHA-256 digest (lowercase hex) of the patch file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// One repository's patch history in the manifest, ordered oldest-to-newest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRepository {
    /// Repository name (e.g. `boot`, `game`, `ex1`).
    pub name: String,
    /// Full ordered patch chain for this repository.
    pub patches: Vec<ManifestPatch>,
}

/// The server-published patch catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub repositories: Vec<ManifestRepository>,
}

impl Manifest {
    /// Parse a manifest from JSON bytes.
    pub fn from_json(bytes: &[u8], source_url: &str) -> PatchResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| PatchError::Catalog {
            url: source_url.to_string(),
            reason: format!("invalid manifest JSON: {e}"),
        })
    }

    /// Resolve the descriptors still required against local version records.
    ///
    /// For each repository: if no local version is recorded, the whole chain
    /// is required; if the local version matches a patch in the chain,
    /// everything after it is required; a local version the chain does not
    /// know is treated as uninstalled and the whole chain is required.
    pub fn resolve_required(
        &self,
        versions: &dyn VersionStore,
    ) -> PatchResult<Vec<PatchDescriptor>> {
        let mut required = Vec::new();

        for repo in &self.repositories {
            let local = versions.get_local(&repo.name)?;

            let start = match &local {
                None => 0,
                Some(v) => match repo.patches.iter().position(|p| &p.version == v) {
                    Some(pos) => pos + 1,
                    None => {
                        debug!(
                            repository = %repo.name,
                            local_version = %v,
                            "local version not in patch chain, requiring full chain"
                        );
                        0
                    }
                },
            };

            for (sequence_index, patch) in repo.patches[start..].iter().enumerate() {
                required.push(PatchDescriptor {
                    repository: repo.name.clone(),
                    file_name: patch.file.clone(),
                    source_url: patch.url.clone(),
                    expected_size: patch.size,
                    target_version: patch.version.clone(),
                    sequence_index,
                    expected_sha256: patch.sha256.clone(),
                });
            }
        }

        Ok(required)
    }
}

// =============================================================================
// Remote catalog client
// =============================================================================

/// Catalog resolver backed by an HTTP-published JSON manifest.
#[derive(Debug, Clone)]
pub struct RemoteCatalog {
    client: reqwest::Client,
    manifest_url: String,
}

impl RemoteCatalog {
    /// Create a resolver fetching the manifest from `manifest_url`.
    pub fn new(manifest_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            manifest_url: manifest_url.into(),
        }
    }

    async fn fetch_manifest(&self) -> PatchResult<Manifest> {
        let catalog_err = |reason: String| PatchError::Catalog {
            url: self.manifest_url.clone(),
            reason,
        };

        let response = self
            .client
            .get(&self.manifest_url)
            .send()
            .await
            .map_err(|e| catalog_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(catalog_err(format!("HTTP {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| catalog_err(e.to_string()))?;

        Manifest::from_json(&bytes, &self.manifest_url)
    }
}

#[async_trait]
impl CatalogResolver for RemoteCatalog {
    async fn resolve_required(
        &self,
        versions: &dyn VersionStore,
    ) -> PatchResult<Vec<PatchDescriptor>> {
        let manifest = self.fetch_manifest().await?;
        manifest.resolve_required(versions)
    }
}
