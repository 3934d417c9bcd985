//! Remote release lookup.
//!
//! Resolves a repository's latest published release into the list of
//! firmware assets a user can download, and provides the GitHub-backed
//! `ReleaseClient` used by the desktop app.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{FlasherError, FlasherResult};
use crate::traits::ReleaseClient;

/// Base URL of the GitHub REST API.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Extension of downloadable firmware images.
const FIRMWARE_EXTENSION: &str = ".bin";

/// `owner/name` pair identifying a remote repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryId {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepositoryId {
    type Err = FlasherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            FlasherError::ReleaseLookupFailed(format!(
                "'{}' is not a repository identifier (expected owner/name)",
                s
            ))
        };

        let (owner, name) = s.trim().split_once('/').ok_or_else(invalid)?;
        let valid_part = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid_part(owner) || !valid_part(name) {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Release as returned by the GitHub releases API (only the fields we use).
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub assets: Vec<RemoteAsset>,
}

/// One file attached to a release.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

/// Downloadable firmware file from a release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseAsset {
    pub display_name: String,
    pub download_url: String,
}

fn is_firmware_asset(asset: &RemoteAsset) -> bool {
    asset.name.to_ascii_lowercase().ends_with(FIRMWARE_EXTENSION)
}

/// Lists firmware assets of a repository's latest release.
#[derive(Clone)]
pub struct ReleaseResolver {
    client: Arc<dyn ReleaseClient>,
}

impl ReleaseResolver {
    pub fn new(client: Arc<dyn ReleaseClient>) -> Self {
        Self { client }
    }

    /// List the firmware assets of the latest release of `repository`.
    ///
    /// An empty list means the release exists but carries no firmware;
    /// lookup problems are always reported as `ReleaseLookupFailed`.
    /// Assets keep the order of the remote listing.
    pub async fn list_release_assets(&self, repository: &str) -> FlasherResult<Vec<ReleaseAsset>> {
        let repository: RepositoryId = repository.parse()?;
        let release = self.client.latest_release(&repository).await?;

        let assets: Vec<ReleaseAsset> = release
            .assets
            .iter()
            .filter(|asset| is_firmware_asset(asset))
            .map(|asset| ReleaseAsset {
                display_name: asset.name.clone(),
                download_url: asset.browser_download_url.clone(),
            })
            .collect();

        log::info!(
            "Release {} of {} has {} firmware asset(s)",
            release.tag_name,
            repository,
            assets.len()
        );

        Ok(assets)
    }
}

/// `ReleaseClient` talking to the GitHub REST API.
pub struct GithubReleaseClient {
    http: reqwest::Client,
    api_base: String,
}

impl GithubReleaseClient {
    pub fn new() -> FlasherResult<Self> {
        Self::with_api_base(GITHUB_API_BASE)
    }

    /// Client against a GitHub-compatible API at `api_base`.
    pub fn with_api_base(api_base: &str) -> FlasherResult<Self> {
        Self::build(api_base, http_client_builder())
    }

    fn build(api_base: &str, builder: reqwest::ClientBuilder) -> FlasherResult<Self> {
        let http = builder.build().map_err(|e| {
            FlasherError::ReleaseLookupFailed(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn latest_release_url(&self, repository: &RepositoryId) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base, repository.owner, repository.name
        )
    }
}

fn http_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(concat!("npg-lite-flasher/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
}

fn download_error(err: reqwest::Error, timeout: Duration) -> FlasherError {
    if err.is_timeout() {
        FlasherError::DownloadTimeout {
            timeout_secs: timeout.as_secs(),
        }
    } else {
        FlasherError::DownloadFailed(err.to_string())
    }
}

#[async_trait]
impl ReleaseClient for GithubReleaseClient {
    async fn latest_release(&self, repository: &RepositoryId) -> FlasherResult<RemoteRelease> {
        let url = self.latest_release_url(repository);
        log::debug!("Fetching latest release from {}", url);

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| FlasherError::ReleaseLookupFailed(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FlasherError::ReleaseLookupFailed(format!(
                "No published release found for {}",
                repository
            )));
        }
        if !status.is_success() {
            return Err(FlasherError::ReleaseLookupFailed(format!(
                "GitHub returned HTTP {} for {}",
                status, repository
            )));
        }

        response.json::<RemoteRelease>().await.map_err(|e| {
            FlasherError::ReleaseLookupFailed(format!("Invalid release data: {}", e))
        })
    }

    async fn download(&self, url: &str, timeout: Duration) -> FlasherResult<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| download_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FlasherError::DownloadFailed(format!(
                "Server returned HTTP {}",
                status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_error(e, timeout))?;
        Ok(bytes.to_vec())
    }
}
