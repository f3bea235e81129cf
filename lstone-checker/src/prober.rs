/// Destination prober
///
/// Issues one GET against a link's destination and reports the status of the
/// first response. Redirects are never followed: whether a short link is
/// gone depends on its immediate destination, not on where that redirects.

use async_trait::async_trait;
use lstone_core::{CheckerConfig, Error, Result};
use reqwest::{redirect, Client};
use tracing::debug;

/// Maximum body bytes read before the response is dropped
pub const BODY_READ_LIMIT: usize = 1024;

#[async_trait]
pub trait DestinationProber: Send + Sync {
    /// Status code of the first response, or `Error::Probe` if none arrived
    async fn probe(&self, url: &str) -> Result<u16>;
}

/// `reqwest`-backed prober
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    /// Build a prober with the configured timeout and User-Agent
    pub fn new(config: &CheckerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.probe_timeout)
            .user_agent(config.user_agent())
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| Error::Internal(format!("failed to build probe client: {}", e)))?;

        Ok(Self { client })
    }

    /// Use a preconfigured client. The caller is responsible for disabling
    /// redirects on it.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DestinationProber for HttpProber {
    async fn probe(&self, url: &str) -> Result<u16> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Probe(e.to_string()))?;

        let status = response.status().as_u16();

        // Read a bounded prefix so the connection can be released
        let mut read = 0usize;
        while read < BODY_READ_LIMIT {
            match response.chunk().await {
                Ok(Some(chunk)) => read += chunk.len(),
                Ok(None) => break,
                Err(e) => {
                    debug!(url, error = %e, "Error reading probe body, keeping status");
                    break;
                }
            }
        }

        Ok(status)
    }
}
