//! Hub session: one connection to a remote hub and its publishing server
//!
//! A session owns at most one running publishing server. The slot holding it
//! sits behind an async mutex: starting checks and fills the slot under one
//! lock, stopping takes the handle out of the slot before shutting it down,
//! so only one caller ever sees a given handle as the one to stop.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use switchboard_core::DeviceRegistry;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address::resolve_bind_address;
use crate::client::{HubClient, SystemInfo};
use crate::version::{is_supported_firmware, MIN_FIRMWARE};

/// Default publishing server port
pub const DEFAULT_SERVER_PORT: u16 = 9000;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Unsupported hub firmware {found:?}, need at least {}.{}", MIN_FIRMWARE.0, MIN_FIRMWARE.1)]
    Unsupported { found: String },
    #[error("Publishing server already running")]
    AlreadyRunning,
    #[error("Hub request failed: {0}")]
    Hub(anyhow::Error),
    #[error("Publishing surface failed: {0}")]
    Surface(anyhow::Error),
    #[error("Operation cancelled")]
    Cancelled,
}

/// A running publishing server and the means to stop it
pub struct ServerHandle {
    local_addr: SocketAddr,
    started_at: DateTime<Utc>,
    shutdown: BoxFuture<'static, Result<()>>,
}

impl ServerHandle {
    /// Wrap a running server; `shutdown` stops it when awaited
    pub fn new<F>(local_addr: SocketAddr, shutdown: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            local_addr,
            started_at: Utc::now(),
            shutdown: Box::pin(shutdown),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Stop the server and wait for it to finish
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.await
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.local_addr)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

/// Starts publishing servers over a device registry
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    async fn start(&self, addr: SocketAddr, registry: Arc<DeviceRegistry>) -> Result<ServerHandle>;
}

/// Where to bind the publishing server
#[derive(Debug, Clone, Copy)]
pub struct StartOptions {
    /// Bind address; resolved from local interfaces when `None`
    pub address: Option<IpAddr>,
    pub port: u16,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            address: None,
            port: DEFAULT_SERVER_PORT,
        }
    }
}

struct ActiveServer {
    name: String,
    handle: ServerHandle,
}

/// Connection to one remote hub
pub struct HubSession {
    /// Hub address
    pub address: IpAddr,
    /// Hub API port
    pub port: u16,
    pub name: String,
    pub host_name: String,
    pub firmware_version: String,
    pub region: String,
    client: Arc<dyn HubClient>,
    factory: Arc<dyn SurfaceFactory>,
    active_server: Mutex<Option<ActiveServer>>,
}

impl HubSession {
    /// Connect to a hub by fetching its system info
    pub async fn connect(
        address: IpAddr,
        port: u16,
        client: Arc<dyn HubClient>,
        factory: Arc<dyn SurfaceFactory>,
    ) -> Result<Self, SessionError> {
        let info = client.fetch_system_info().await.map_err(SessionError::Hub)?;
        info!(
            hub = %info.hostname,
            firmware = %info.firmware_version,
            address = %address,
            "Connected to hub"
        );
        Ok(Self::from_info(address, port, info, client, factory))
    }

    /// Build a session from already fetched system info
    pub fn from_info(
        address: IpAddr,
        port: u16,
        info: SystemInfo,
        client: Arc<dyn HubClient>,
        factory: Arc<dyn SurfaceFactory>,
    ) -> Self {
        Self {
            address,
            port,
            name: info.name,
            host_name: info.hostname,
            firmware_version: info.firmware_version,
            region: info.region,
            client,
            factory,
            active_server: Mutex::new(None),
        }
    }

    /// Fail unless the hub firmware can host a publishing server
    pub fn check_compatibility(&self) -> Result<(), SessionError> {
        if is_supported_firmware(&self.firmware_version) {
            Ok(())
        } else {
            Err(SessionError::Unsupported {
                found: self.firmware_version.clone(),
            })
        }
    }

    /// Whether a publishing server is currently active
    pub async fn is_running(&self) -> bool {
        self.active_server.lock().await.is_some()
    }

    /// Address of the active publishing server
    pub async fn server_addr(&self) -> Option<SocketAddr> {
        self.active_server
            .lock()
            .await
            .as_ref()
            .map(|active| active.handle.local_addr())
    }

    /// Start the publishing server and register it with the hub
    ///
    /// Fails with `AlreadyRunning` while a server is active. If registration
    /// fails or is cancelled the new server is shut down again.
    pub async fn start_server(
        &self,
        name: &str,
        registry: Arc<DeviceRegistry>,
        options: StartOptions,
        cancel: &CancellationToken,
    ) -> Result<SocketAddr, SessionError> {
        self.check_compatibility()?;

        let mut slot = self.active_server.lock().await;
        if slot.is_some() {
            return Err(SessionError::AlreadyRunning);
        }

        let bind = resolve_bind_address(options.address, self.address);
        let handle = self
            .factory
            .start(SocketAddr::new(bind, options.port), registry)
            .await
            .map_err(SessionError::Surface)?;
        let local_addr = handle.local_addr();
        let base_url = format!("http://{}", local_addr);

        let registered = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SessionError::Cancelled),
            result = self.client.register_server(name, &base_url, cancel) => {
                result.map_err(SessionError::Hub)
            }
        };

        if let Err(e) = registered {
            warn!(name = %name, error = %e, "Hub registration failed, stopping server");
            if let Err(shutdown_err) = handle.shutdown().await {
                warn!(error = %shutdown_err, "Failed to stop unregistered server");
            }
            return Err(e);
        }

        info!(name = %name, address = %local_addr, "Publishing server started");
        *slot = Some(ActiveServer {
            name: name.to_string(),
            handle,
        });
        Ok(local_addr)
    }

    /// Stop the active server, if any
    ///
    /// Stopping when nothing runs is a no-op.
    pub async fn stop_server(&self) -> Result<(), SessionError> {
        let Some(active) = self.active_server.lock().await.take() else {
            debug!("No publishing server to stop");
            return Ok(());
        };

        if let Err(e) = self.client.unregister_server(&active.name).await {
            warn!(name = %active.name, error = %e, "Failed to unregister server from hub");
        }

        let addr = active.handle.local_addr();
        active
            .handle
            .shutdown()
            .await
            .map_err(SessionError::Surface)?;
        info!(name = %active.name, address = %addr, "Publishing server stopped");
        Ok(())
    }
}
