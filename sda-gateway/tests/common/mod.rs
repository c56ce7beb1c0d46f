#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    Json, Router,
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use sda_gateway::{GatewayConfig, GatewayState, build_gateway_app};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

static TEST_DIR_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// In-process stand-in for the device manager and for agents. Every request
/// is recorded as `"<METHOD> <path>"` together with its body.
#[derive(Default)]
pub struct MockState {
    pub agents: Vec<Value>,
    pub agent_apps: HashMap<String, Vec<String>>,
    pub app_details: HashMap<String, Value>,
    pub failing_apps: HashSet<String>,
    pub status_override: Option<u16>,
    pub next_app_id: u64,
    pub calls: Vec<String>,
    pub bodies: Vec<(String, String)>,
}

pub type SharedMock = Arc<Mutex<MockState>>;

pub struct MockServer {
    pub addr: SocketAddr,
    pub state: SharedMock,
    pub handle: JoinHandle<()>,
}

impl MockServer {
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn port(&self) -> String {
        self.addr.port().to_string()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().expect("mock state lock").calls.clone()
    }

    pub fn body_of(&self, call: &str) -> Option<String> {
        self.state
            .lock()
            .expect("mock state lock")
            .bodies
            .iter()
            .rev()
            .find(|(recorded, _)| recorded == call)
            .map(|(_, body)| body.clone())
    }

    pub fn update(&self, apply: impl FnOnce(&mut MockState)) {
        let mut guard = self.state.lock().expect("mock state lock");
        apply(&mut guard);
    }
}

pub async fn spawn_mock(state: MockState) -> MockServer {
    let state = Arc::new(Mutex::new(state));
    let app = Router::new()
        .fallback(mock_handler)
        .with_state(state.clone());
    let (addr, handle) = spawn_server(app).await;
    MockServer {
        addr,
        state,
        handle,
    }
}

pub async fn spawn_server(app: Router) -> (SocketAddr, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener should have addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server should run");
    });
    (addr, handle)
}

pub async fn spawn_gateway(config: GatewayConfig) -> (SocketAddr, JoinHandle<()>) {
    let state = GatewayState::new(config).expect("gateway state should build");
    spawn_server(build_gateway_app(state)).await
}

pub async fn spawn_gateway_state(state: GatewayState) -> (SocketAddr, JoinHandle<()>) {
    spawn_server(build_gateway_app(state)).await
}

pub fn unique_data_dir(test_name: &str) -> PathBuf {
    let seq = TEST_DIR_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("sda-gateway-it-{test_name}-{now}-{seq}"))
}

pub fn app_detail(state: &str, services: usize) -> Value {
    let services = (0..services)
        .map(|idx| json!({"name": format!("svc-{idx}")}))
        .collect::<Vec<_>>();
    json!({"state": state, "services": services})
}

/// Posts `body` as raw bytes without a content type, like the web client does.
pub async fn post_raw(
    client: &reqwest::Client,
    url: String,
    body: Value,
) -> reqwest::Response {
    client
        .post(url)
        .body(body.to_string())
        .send()
        .await
        .expect("gateway request should complete")
}

pub async fn get(client: &reqwest::Client, url: String) -> reqwest::Response {
    client
        .get(url)
        .send()
        .await
        .expect("gateway request should complete")
}

async fn mock_handler(
    State(mock): State<SharedMock>,
    method: Method,
    uri: Uri,
    body: String,
) -> Response {
    let mut guard = mock.lock().expect("mock state lock");
    let path = uri.path().to_string();
    let call = format!("{method} {path}");
    guard.calls.push(call.clone());
    guard.bodies.push((call, body.clone()));

    if let Some(status) = guard.status_override {
        return StatusCode::from_u16(status)
            .expect("override should be a valid status")
            .into_response();
    }

    let segments = path
        .trim_start_matches("/api/v1/")
        .split('/')
        .collect::<Vec<_>>();
    match (method.as_str(), segments.as_slice()) {
        ("GET", ["agents"]) => Json(json!({ "agents": guard.agents })).into_response(),
        ("GET", ["agents", device]) => {
            let apps = guard.agent_apps.get(*device).cloned().unwrap_or_default();
            Json(json!({ "id": device, "apps": apps })).into_response()
        }
        ("POST", ["agents", device, "deploy"]) => {
            guard.next_app_id += 1;
            let app_id = guard.next_app_id.to_string();
            guard
                .agent_apps
                .entry(device.to_string())
                .or_default()
                .push(app_id.clone());
            guard
                .app_details
                .insert(app_id.clone(), app_detail("DEPLOYED", 0));
            Json(json!({ "id": app_id })).into_response()
        }
        ("GET", ["agents", _, "apps", app]) => {
            if guard.failing_apps.contains(*app) {
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            match guard.app_details.get(*app) {
                Some(detail) => Json(detail.clone()).into_response(),
                None => StatusCode::NOT_FOUND.into_response(),
            }
        }
        ("POST", ["agents", _, "apps", app]) => {
            let detail = guard
                .app_details
                .entry(app.to_string())
                .or_insert_with(|| app_detail("DEPLOYED", 0));
            detail["description"] = Value::String(body);
            StatusCode::OK.into_response()
        }
        ("DELETE", ["agents", device, "apps", app]) => {
            guard.app_details.remove(*app);
            if let Some(apps) = guard.agent_apps.get_mut(*device) {
                apps.retain(|existing| existing != app);
            }
            StatusCode::OK.into_response()
        }
        ("POST", ["agents", _, "apps", _, "start" | "stop" | "update"]) => {
            StatusCode::OK.into_response()
        }
        ("POST", ["register"]) | ("POST", ["unregister"]) => StatusCode::OK.into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
