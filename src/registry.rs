//! Public package registry client.
//!
//! The only operation the engine needs is "list the published versions of a
//! package". The concrete implementation speaks the NuGet v3 flat-container
//! protocol; an unknown package yields an empty list rather than an error.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};

/// Default public NuGet flat-container endpoint.
pub const DEFAULT_REGISTRY_URL: &str = "https://api.nuget.org/v3-flatcontainer";

/// Registry API response types (internal).
mod api {
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    pub struct VersionIndex {
        pub versions: Vec<String>,
    }
}

/// Trait for public package registries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Registry: Send + Sync {
    /// All published version strings for `package_id`, oldest first.
    /// An unknown package returns an empty list.
    async fn published_versions(&self, package_id: &str) -> Result<Vec<String>>;
}

/// NuGet v3 flat-container registry client.
pub struct NuGetRegistry {
    client: Client,
    base_url: String,
}

impl NuGetRegistry {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Registry for NuGetRegistry {
    #[tracing::instrument(skip(self))]
    async fn published_versions(&self, package_id: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/{}/index.json",
            self.base_url,
            package_id.to_lowercase()
        );
        debug!("Fetching version index from {url}...");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to query registry for {package_id}"))?;

        // The flat container answers 404 for ids it has never seen.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let index: api::VersionIndex = response
            .error_for_status()
            .with_context(|| format!("Registry rejected query for {package_id}"))?
            .json()
            .await
            .context("Failed to parse version index")?;

        Ok(index.versions)
    }
}
