//! Publishing server setup and routing

use anyhow::Result;
use async_trait::async_trait;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use switchboard_core::DeviceRegistry;
use switchboard_hub::{ServerHandle, SurfaceFactory};
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;

/// Build the publishing router over a registry
pub fn router(registry: Arc<DeviceRegistry>) -> Router {
    Router::new()
        .route("/db", get(api::list_devices))
        .route("/db/search", get(api::search_devices))
        .route("/db/{id}", get(api::get_device))
        .route("/adapters/{name}", get(api::get_adapter))
        // CORS
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(registry)
}

/// Serves the registry over plain HTTP
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpSurface;

#[async_trait]
impl SurfaceFactory for HttpSurface {
    async fn start(&self, addr: SocketAddr, registry: Arc<DeviceRegistry>) -> Result<ServerHandle> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let app = router(registry);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
        });
        info!(address = %local_addr, protocol = "HTTP", "Starting publishing server");

        Ok(ServerHandle::new(local_addr, async move {
            let _ = stop_tx.send(());
            task.await??;
            info!(address = %local_addr, "Publishing server shut down");
            Ok(())
        }))
    }
}
