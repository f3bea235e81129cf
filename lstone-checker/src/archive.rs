/// Web archive lookups
///
/// Queries the Wayback Machine availability API for the closest snapshot of
/// a destination URL.

use async_trait::async_trait;
use lstone_core::{CheckerConfig, Error, Result};
use reqwest::Client;
use serde::Deserialize;

#[async_trait]
pub trait ArchiveLookup: Send + Sync {
    /// Snapshot URL if one is available, `Ok(None)` if the archive has none
    async fn lookup(&self, url: &str) -> Result<Option<String>>;
}

/// Availability API response:
/// `{"archived_snapshots":{"closest":{"available":true,"url":"..."}}}`
#[derive(Debug, Default, Deserialize)]
pub struct AvailabilityResponse {
    #[serde(default)]
    pub archived_snapshots: ArchivedSnapshots,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArchivedSnapshots {
    pub closest: Option<ClosestSnapshot>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClosestSnapshot {
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub url: String,
    pub timestamp: Option<String>,
    pub status: Option<String>,
}

impl AvailabilityResponse {
    /// Only an available snapshot with a non-empty URL counts
    pub fn snapshot_url(self) -> Option<String> {
        self.archived_snapshots
            .closest
            .filter(|closest| closest.available && !closest.url.is_empty())
            .map(|closest| closest.url)
    }
}

/// Client for `https://archive.org/wayback/available`
#[derive(Debug, Clone)]
pub struct WaybackClient {
    client: Client,
    endpoint: String,
}

impl WaybackClient {
    pub fn new(config: &CheckerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.archive_timeout)
            .user_agent(config.user_agent())
            .build()
            .map_err(|e| Error::Internal(format!("failed to build archive client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.archive_endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ArchiveLookup for WaybackClient {
    async fn lookup(&self, url: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", url)])
            .send()
            .await
            .map_err(|e| Error::ArchiveLookup(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ArchiveLookup(format!(
                "availability API returned {}",
                status
            )));
        }

        let body: AvailabilityResponse = response
            .json()
            .await
            .map_err(|e| Error::ArchiveLookup(format!("invalid availability response: {}", e)))?;

        Ok(body.snapshot_url())
    }
}

/// Lookup used when archive lookups are switched off. Never consulted by the
/// classifier in that mode; reports no snapshot if called anyway.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArchive;

#[async_trait]
impl ArchiveLookup for NoArchive {
    async fn lookup(&self, _url: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
