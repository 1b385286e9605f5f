//! Remote hub client
//!
//! The hub keeps the list of registered publishing servers and the devices
//! it already has associated with each adapter. [`HubClient`] is the contract
//! the session relies on; [`HttpHubClient`] talks to a hub's JSON API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use switchboard_core::RegisteredDevices;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default hub API port
pub const DEFAULT_HUB_PORT: u16 = 3000;

/// Hub request timeout
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Identity and firmware details reported by a hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    /// User-facing hub name
    #[serde(default)]
    pub name: String,
    /// Network host name
    pub hostname: String,
    /// Firmware version string, e.g. "0.53.8-20180424"
    pub firmware_version: String,
    /// Configured region
    #[serde(default)]
    pub region: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    name: &'a str,
    base_url: &'a str,
}

#[derive(Serialize)]
struct UnregisterRequest<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct Subscription {
    #[serde(rename = "deviceId")]
    device_id: String,
}

/// Operations the session needs from a remote hub
#[async_trait]
pub trait HubClient: Send + Sync {
    /// Fetch the hub's identity and firmware version
    async fn fetch_system_info(&self) -> Result<SystemInfo>;

    /// Announce a publishing server reachable at `base_url`
    async fn register_server(
        &self,
        name: &str,
        base_url: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Withdraw a previously announced server
    async fn unregister_server(&self, name: &str) -> Result<()>;

    /// Device ids the hub already associates with an adapter
    async fn registered_device_ids(&self, adapter: &str) -> Result<Vec<String>>;
}

/// JSON-over-HTTP hub client
#[derive(Debug, Clone)]
pub struct HttpHubClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpHubClient {
    /// Create a client for the hub at `address:port`
    pub fn new(address: IpAddr, port: u16) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        let host = match address {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{}]", v6),
        };

        Ok(Self {
            client,
            base_url: format!("http://{}:{}", host, port),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Subscriptions endpoint with the adapter name as one escaped path segment
    fn subscriptions_url(&self, adapter: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.url("/v1/api/subscriptions"))
            .context("Invalid hub URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Hub URL cannot carry a path: {}", self.base_url))?
            .push(adapter);
        Ok(url)
    }
}

#[async_trait]
impl HubClient for HttpHubClient {
    async fn fetch_system_info(&self) -> Result<SystemInfo> {
        let url = self.url("/systeminfo");
        debug!(url = %url, "Fetching hub system info");

        let info = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach hub at {}", self.base_url))?
            .error_for_status()?
            .json::<SystemInfo>()
            .await
            .context("Malformed hub system info")?;

        Ok(info)
    }

    async fn register_server(
        &self,
        name: &str,
        base_url: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let request = self
            .client
            .post(self.url("/v1/api/registerSdkDeviceAdapter"))
            .json(&RegisterRequest { name, base_url })
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => anyhow::bail!("Hub registration cancelled"),
            response = request => response.context("Failed to register with hub")?,
        };
        response.error_for_status()?;

        info!(name = %name, base_url = %base_url, "Registered server with hub");
        Ok(())
    }

    async fn unregister_server(&self, name: &str) -> Result<()> {
        self.client
            .post(self.url("/v1/api/unregisterSdkDeviceAdapter"))
            .json(&UnregisterRequest { name })
            .send()
            .await
            .context("Failed to unregister from hub")?
            .error_for_status()?;

        info!(name = %name, "Unregistered server from hub");
        Ok(())
    }

    async fn registered_device_ids(&self, adapter: &str) -> Result<Vec<String>> {
        let subscriptions = self
            .client
            .get(self.subscriptions_url(adapter)?)
            .send()
            .await
            .context("Failed to fetch hub subscriptions")?
            .error_for_status()?
            .json::<Vec<Subscription>>()
            .await
            .context("Malformed hub subscriptions")?;

        Ok(subscriptions.into_iter().map(|s| s.device_id).collect())
    }
}

#[async_trait]
impl RegisteredDevices for HttpHubClient {
    async fn registered_device_ids(&self, adapter: &str) -> Result<Vec<String>> {
        HubClient::registered_device_ids(self, adapter).await
    }
}
