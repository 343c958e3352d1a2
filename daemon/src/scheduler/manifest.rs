use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

/// Upstream feed of published game versions.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionManifest {
    pub latest: LatestVersions,
    pub versions: Vec<ManifestVersion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestVersions {
    pub release: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestVersion {
    pub id: String,
    /// Release channel; the feed also carries historic channels, so this
    /// stays a free-form string.
    #[serde(rename = "type")]
    pub channel: String,
    pub url: String,
}

impl VersionManifest {
    /// Per-version document URL of the latest stable release.
    pub fn latest_release_url(&self) -> Option<&str> {
        self.versions
            .iter()
            .find(|version| version.id == self.latest.release)
            .map(|version| version.url.as_str())
    }
}

/// Per-version document carrying the downloadable artifacts.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionPackage {
    pub id: String,
    pub downloads: PackageDownloads,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageDownloads {
    pub server: DownloadData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadData {
    pub sha1: String,
    pub size: u64,
    pub url: String,
}

/// Fetches a JSON document, strictly: any non-2xx status or non-JSON
/// content type is a fetch error, not a decode attempt.
pub async fn fetch_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> anyhow::Result<T> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?;

    let status = response.status();
    if !status.is_success() {
        bail!("request to {} failed with status {}", url, status);
    }
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !content_type.starts_with("application/json") {
        bail!(
            "expected application/json from {} but received {:?}",
            url,
            content_type
        );
    }

    response
        .json::<T>()
        .await
        .with_context(|| format!("failed to decode response from {}", url))
}

/// Streams a binary straight to `destination` without buffering it in
/// memory.
pub async fn download(
    client: &reqwest::Client,
    url: &str,
    destination: &Path,
) -> anyhow::Result<()> {
    let mut response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?;
    if !response.status().is_success() {
        bail!(
            "download from {} failed with status {}",
            url,
            response.status()
        );
    }

    let mut file = tokio::fs::File::create(destination)
        .await
        .with_context(|| format!("failed to create {}", destination.display()))?;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}
