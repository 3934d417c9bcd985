use std::time::Duration;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::error::FlasherResult;
use crate::release::{RemoteRelease, RepositoryId};

/// Remote release listing and asset download.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReleaseClient: Send + Sync {
    /// Fetch the most recent published release of `repository`.
    ///
    /// Fails with `ReleaseLookupFailed` on transport errors or when the
    /// repository has no release.
    async fn latest_release(&self, repository: &RepositoryId) -> FlasherResult<RemoteRelease>;

    /// Download the body behind `url`, giving up after `timeout`.
    ///
    /// Fails with `DownloadTimeout` when the deadline passes and with
    /// `DownloadFailed` for every other problem.
    async fn download(&self, url: &str, timeout: Duration) -> FlasherResult<Vec<u8>>;
}
