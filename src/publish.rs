//! Pushing built packages to a NuGet server.

use anyhow::{Context, Result, bail};
use log::{info, warn};
use reqwest::Client;
use std::path::Path;

const PROTOCOL: &str = "://";

/// Push target parsed from the `user:pass@server` CLI argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub server: String,
    pub credentials: String,
}

impl ServerInfo {
    /// Parse `user:pass@server`. Whitespace-only input is treated as absent.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let Some(at) = text.find('@') else {
            bail!("The format is 'user:pass@server'");
        };
        Ok(Some(Self {
            server: text[at + 1..].to_string(),
            credentials: text[..at].to_string(),
        }))
    }

    /// The full push URL: `http://` is prepended when no protocol is given
    /// and the default `/nuget/Default` feed path is appended when the host
    /// has no path segment of its own.
    pub fn source_url(&self) -> String {
        let mut server = self.server.clone();
        if !server.contains(PROTOCOL) {
            server = format!("http{PROTOCOL}{server}");
        }

        let host_start = server.find(PROTOCOL).map(|p| p + PROTOCOL.len()).unwrap_or(0);
        if !server.trim_end_matches('/')[host_start..].contains('/') {
            server = format!("{server}/nuget/Default");
        }

        server
    }
}

/// Uploads package artifacts over HTTP.
pub struct Publisher {
    client: Client,
}

impl Publisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Push one nupkg. Failures are reported to the caller, which logs and
    /// moves on; a failed push never affects other archives.
    #[tracing::instrument(skip(self, info))]
    pub async fn push(&self, nupkg_path: &Path, info: &ServerInfo) -> Result<()> {
        info!("Pushing to the server");

        let bytes = tokio::fs::read(nupkg_path)
            .await
            .with_context(|| format!("Failed to read package {}", nupkg_path.display()))?;

        let response = self
            .client
            .put(info.source_url())
            .header("X-NuGet-ApiKey", &info.credentials)
            .body(bytes)
            .send()
            .await
            .context("Failed to send package")?;

        if let Err(e) = response.error_for_status_ref() {
            warn!("Push rejected by {}: {e}", info.source_url());
            return Err(e).context("Server rejected package push");
        }

        Ok(())
    }
}
