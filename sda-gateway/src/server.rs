use std::{path::PathBuf, time::Instant};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use sdam::{AgentDetail, AppAction, SdamClient, SdamClientConfig, string_or_number};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::info;

use crate::{
    error::GatewayError,
    gateway::{AppListing, DeviceSummary, Gateway, ReconcileReport},
    logging::{category_access, method_label, status_label},
    registry::{LocalRegistry, TemplateRegistry},
    selection::{DeviceSelection, Selection, SelectionPhase},
};

mod handlers;

use handlers::*;

#[derive(Clone, Debug, Default)]
pub struct GatewayConfig {
    /// Directory for the local documents; `None` keeps them in memory.
    pub data_dir: Option<PathBuf>,
    pub upstream: SdamClientConfig,
    pub initial_manager: Option<String>,
}

#[derive(Clone)]
pub struct GatewayState {
    gateway: Gateway,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let registry = match config.data_dir {
            Some(dir) => LocalRegistry::on_disk(dir),
            None => LocalRegistry::in_memory(),
        };
        let mut selection = Selection::new();
        if let Some(manager) = config.initial_manager {
            selection.set_manager(manager);
        }
        let upstream = SdamClient::new(config.upstream)?;
        Ok(Self {
            gateway: Gateway::with_selection(upstream, registry, selection),
        })
    }

    /// Wraps an already assembled gateway, e.g. one over a custom document store.
    pub fn from_gateway(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct DeviceListResponse {
    devices: Vec<DeviceSummary>,
}

#[derive(Serialize)]
struct SelectionResponse {
    phase: SelectionPhase,
    #[serde(flatten)]
    selection: Selection,
}

#[derive(Deserialize)]
struct ManagerAddressRequest {
    ip: String,
}

#[derive(Deserialize)]
struct SelectDeviceRequest {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    #[serde(deserialize_with = "string_or_number")]
    host: String,
    #[serde(deserialize_with = "string_or_number")]
    port: String,
}

#[derive(Deserialize)]
struct SelectAppRequest {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
}

#[derive(Deserialize)]
struct InstallAppRequest {
    name: String,
    data: Value,
}

#[derive(Deserialize)]
struct AppDocumentRequest {
    data: Value,
}

#[derive(Deserialize)]
struct RegisterDeviceRequest {
    ip: String,
    #[serde(deserialize_with = "string_or_number")]
    interval: String,
}

pub fn build_gateway_app(state: GatewayState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route(
            "/manager/address",
            get(get_manager_address_handler).post(set_manager_address_handler),
        )
        .route("/manager/selection", get(selection_handler))
        .route("/manager/devices", get(list_devices_handler))
        .route(
            "/manager/device",
            get(get_device_handler).post(select_device_handler),
        )
        .route("/manager/apps", get(list_apps_handler))
        .route("/manager/apps/reconcile", post(reconcile_apps_handler))
        .route(
            "/manager/app",
            post(select_app_handler).delete(delete_app_handler),
        )
        .route("/manager/app/install", post(install_app_handler))
        .route("/manager/app/start", get(start_app_handler))
        .route("/manager/app/stop", get(stop_app_handler))
        .route("/manager/app/update", get(update_app_handler))
        .route(
            "/manager/app/yaml",
            get(get_app_document_handler).post(set_app_document_handler),
        )
        .route(
            "/manager/yaml",
            get(get_templates_handler).post(append_template_handler),
        )
        .route("/manager/register", post(register_device_handler))
        .route("/manager/unregister", post(unregister_device_handler))
        .layer(middleware::from_fn(access_log_middleware))
        .with_state(state)
}

// The web client does not reliably send a JSON content type, so bodies are
// decoded by hand instead of through the `Json` extractor.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|err| GatewayError::bad_request(format!("invalid request body: {err}")))
}

/// Deployable payloads are forwarded verbatim when given as text.
fn payload_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
