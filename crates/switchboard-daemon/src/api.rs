//! REST API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use switchboard_core::{AdapterState, DeviceRegistry, DeviceType, RegistryError};
use tracing::debug;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn error_response(err: RegistryError) -> axum::response::Response {
    let status = match err {
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(ApiError::new(err.to_string()))).into_response()
}

/// Search query parameters
#[derive(Deserialize)]
pub struct SearchParams {
    q: Option<String>,
}

/// List every device
pub async fn list_devices(State(registry): State<Arc<DeviceRegistry>>) -> impl IntoResponse {
    let devices: Vec<_> = registry.devices().cloned().collect();
    Json(devices)
}

/// Fuzzy device search
pub async fn search_devices(
    State(registry): State<Arc<DeviceRegistry>>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let results = registry.search(params.q.as_deref());
    debug!(query = ?params.q, results = results.len(), "Device search");
    Json(results)
}

/// Get a specific device by id
pub async fn get_device(
    State(registry): State<Arc<DeviceRegistry>>,
    Path(raw): Path<String>,
) -> impl IntoResponse {
    let id = match raw.parse::<usize>() {
        Ok(id) => id,
        Err(_) => {
            return error_response(RegistryError::InvalidArgument(format!(
                "device id must be a non-negative integer, got {:?}",
                raw
            )))
        }
    };
    match registry.get_device(id) {
        Ok(device) => Json(device.clone()).into_response(),
        Err(e) => error_response(e),
    }
}

/// Adapter summary
#[derive(Serialize)]
pub struct AdapterInfo {
    name: String,
    device_type: DeviceType,
    manufacturer: String,
    driver_version: String,
    devices: Vec<usize>,
    state: AdapterState,
}

/// Get an adapter, initializing it on first access
pub async fn get_adapter(
    State(registry): State<Arc<DeviceRegistry>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let adapter = match registry.get_adapter(&name).await {
        Ok(adapter) => adapter,
        Err(e) => return error_response(e),
    };

    Json(AdapterInfo {
        name: adapter.name.clone(),
        device_type: adapter.device_type,
        manufacturer: adapter.manufacturer.clone(),
        driver_version: adapter.driver_version.clone(),
        devices: registry
            .devices_for_adapter(&adapter.name)
            .map(|d| d.id)
            .collect(),
        state: registry.adapter_state(&adapter.name),
    })
    .into_response()
}
