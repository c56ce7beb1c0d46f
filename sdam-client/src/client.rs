use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode, redirect::Policy};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::UpstreamError,
    rpc::{
        AgentDetail, AgentListResponse, AppDetailPayload, DeployResponse, HealthCheck,
        RegisterRequest, UpstreamAgent, UpstreamApplication,
    },
};

pub const DEFAULT_MANAGER_API_PORT: u16 = 48099;
pub const DEFAULT_REGISTER_PORT: u16 = 48098;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 300;

#[derive(Clone, Debug)]
pub struct SdamClientConfig {
    /// Used when a manager address carries no explicit port.
    pub manager_api_port: u16,
    /// Used when an agent address passed to `register_device` carries no port.
    pub register_port: u16,
    pub request_timeout: Duration,
}

impl Default for SdamClientConfig {
    fn default() -> Self {
        Self {
            manager_api_port: DEFAULT_MANAGER_API_PORT,
            register_port: DEFAULT_REGISTER_PORT,
            request_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppAction {
    Start,
    Stop,
    Update,
}

impl AppAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppAction::Start => "start",
            AppAction::Stop => "stop",
            AppAction::Update => "update",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SdamClient {
    http: reqwest::Client,
    config: SdamClientConfig,
}

impl SdamClient {
    /// Redirects are never followed, so a 3xx surfaces as a status failure.
    pub fn new(config: SdamClientConfig) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|err| UpstreamError::Client {
                reason: err.to_string(),
            })?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &SdamClientConfig {
        &self.config
    }

    pub async fn list_agents(&self, manager: &str) -> Result<Vec<UpstreamAgent>, UpstreamError> {
        let url = self.manager_url(manager, &["agents"])?;
        let list: AgentListResponse = self.call_json(Method::GET, url, None).await?;
        Ok(list.agents)
    }

    pub async fn get_agent(
        &self,
        manager: &str,
        device_id: &str,
    ) -> Result<AgentDetail, UpstreamError> {
        let url = self.manager_url(manager, &["agents", device_id])?;
        self.call_json(Method::GET, url, None).await
    }

    /// Application ids installed on an agent, as listed in the agent detail.
    pub async fn list_applications(
        &self,
        manager: &str,
        device_id: &str,
    ) -> Result<Vec<String>, UpstreamError> {
        Ok(self.get_agent(manager, device_id).await?.apps)
    }

    pub async fn get_application(
        &self,
        manager: &str,
        device_id: &str,
        app_id: &str,
    ) -> Result<UpstreamApplication, UpstreamError> {
        let url = self.manager_url(manager, &["agents", device_id, "apps", app_id])?;
        let payload: AppDetailPayload = self.call_json(Method::GET, url, None).await?;
        Ok(UpstreamApplication::from_payload(app_id, payload))
    }

    /// Deploys `payload` verbatim and returns the manager-assigned application id.
    pub async fn deploy_application(
        &self,
        manager: &str,
        device_id: &str,
        payload: String,
    ) -> Result<String, UpstreamError> {
        let url = self.manager_url(manager, &["agents", device_id, "deploy"])?;
        let response: DeployResponse = self.call_json(Method::POST, url, Some(payload)).await?;
        Ok(response.id)
    }

    pub async fn delete_application(
        &self,
        manager: &str,
        device_id: &str,
        app_id: &str,
    ) -> Result<(), UpstreamError> {
        let url = self.manager_url(manager, &["agents", device_id, "apps", app_id])?;
        self.call(Method::DELETE, url, None).await
    }

    pub async fn app_action(
        &self,
        manager: &str,
        device_id: &str,
        app_id: &str,
        action: AppAction,
    ) -> Result<(), UpstreamError> {
        let url = self.manager_url(
            manager,
            &["agents", device_id, "apps", app_id, action.as_str()],
        )?;
        self.call(Method::POST, url, None).await
    }

    pub async fn start_application(
        &self,
        manager: &str,
        device_id: &str,
        app_id: &str,
    ) -> Result<(), UpstreamError> {
        self.app_action(manager, device_id, app_id, AppAction::Start)
            .await
    }

    pub async fn stop_application(
        &self,
        manager: &str,
        device_id: &str,
        app_id: &str,
    ) -> Result<(), UpstreamError> {
        self.app_action(manager, device_id, app_id, AppAction::Stop)
            .await
    }

    pub async fn update_application(
        &self,
        manager: &str,
        device_id: &str,
        app_id: &str,
    ) -> Result<(), UpstreamError> {
        self.app_action(manager, device_id, app_id, AppAction::Update)
            .await
    }

    pub async fn get_configuration_document(
        &self,
        manager: &str,
        device_id: &str,
        app_id: &str,
    ) -> Result<Option<serde_json::Value>, UpstreamError> {
        Ok(self
            .get_application(manager, device_id, app_id)
            .await?
            .configuration_document)
    }

    pub async fn set_configuration_document(
        &self,
        manager: &str,
        device_id: &str,
        app_id: &str,
        payload: String,
    ) -> Result<(), UpstreamError> {
        let url = self.manager_url(manager, &["agents", device_id, "apps", app_id])?;
        self.call(Method::POST, url, Some(payload)).await
    }

    /// Asks the agent at `agent_address` to register with the manager at
    /// `manager_host`. The manager is always advertised by host only.
    pub async fn register_device(
        &self,
        agent_address: &str,
        manager_host: &str,
        health_check_interval: &str,
    ) -> Result<(), UpstreamError> {
        let url = api_url(agent_address, self.config.register_port, &["register"])?;
        let body = RegisterRequest {
            ip: manager_host.to_string(),
            health_check: HealthCheck {
                interval: health_check_interval.to_string(),
            },
        };
        let request = self.http.post(url.clone()).json(&body);
        self.send(request, &url).await.map(|_| ())
    }

    pub async fn unregister_device(
        &self,
        device_host: &str,
        device_port: &str,
    ) -> Result<(), UpstreamError> {
        let address = format!("{device_host}:{device_port}");
        let (_, port) = split_host_port(&address);
        let Some(port) = port else {
            return Err(UpstreamError::InvalidAddress {
                address,
                reason: "device port is not a valid port number".to_string(),
            });
        };
        let url = api_url(&address, port, &["unregister"])?;
        self.call(Method::POST, url, None).await
    }

    fn manager_url(&self, manager: &str, segments: &[&str]) -> Result<Url, UpstreamError> {
        api_url(manager, self.config.manager_api_port, segments)
    }

    async fn call(
        &self,
        method: Method,
        url: Url,
        body: Option<String>,
    ) -> Result<(), UpstreamError> {
        let mut request = self.http.request(method, url.clone());
        if let Some(body) = body {
            request = request.body(body);
        }
        self.send(request, &url).await.map(|_| ())
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<String>,
    ) -> Result<T, UpstreamError> {
        let mut request = self.http.request(method, url.clone());
        if let Some(body) = body {
            request = request.body(body);
        }
        let response = self.send(request, &url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| unavailable(&url, &err))?;
        serde_json::from_slice::<T>(&bytes).map_err(|err| {
            warn!("failed to decode upstream payload url={url} err={err}");
            UpstreamError::Decode {
                url: url.to_string(),
                reason: err.to_string(),
            }
        })
    }

    async fn send(
        &self,
        request: RequestBuilder,
        url: &Url,
    ) -> Result<reqwest::Response, UpstreamError> {
        debug!("upstream request url={url}");
        let response = request
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|err| unavailable(url, &err))?;

        // Only an exact 200 counts; redirects and other 2xx are failures.
        if response.status() != StatusCode::OK {
            warn!(
                "upstream returned error url={url} status={}",
                response.status()
            );
            return Err(UpstreamError::Status {
                status_code: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

fn unavailable(url: &Url, err: &reqwest::Error) -> UpstreamError {
    warn!("upstream transport error url={url} err={err}");
    UpstreamError::Unavailable {
        url: url.to_string(),
        reason: err.to_string(),
        timed_out: err.is_timeout(),
    }
}

/// Splits `host[:port]`; bracketed IPv6 hosts keep their brackets.
pub fn split_host_port(address: &str) -> (&str, Option<u16>) {
    let address = address.trim();
    if address.starts_with('[') {
        return match address.find(']') {
            Some(end) => {
                let port = address[end + 1..]
                    .strip_prefix(':')
                    .and_then(|port| port.parse().ok());
                (&address[..=end], port)
            }
            None => (address, None),
        };
    }
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse::<u16>() {
            Ok(port) => (host, Some(port)),
            Err(_) => (address, None),
        },
        _ => (address, None),
    }
}

pub fn host_only(address: &str) -> &str {
    split_host_port(address).0
}

fn api_url(address: &str, default_port: u16, segments: &[&str]) -> Result<Url, UpstreamError> {
    let invalid = |reason: String| UpstreamError::InvalidAddress {
        address: address.to_string(),
        reason,
    };
    let (host, port) = split_host_port(address);
    if host.is_empty() {
        return Err(invalid("host is empty".to_string()));
    }
    let port = port.unwrap_or(default_port);
    let mut url = Url::parse(&format!("http://{host}:{port}/"))
        .map_err(|err| invalid(err.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("address cannot be a base url".to_string()))?
        .pop_if_empty()
        .extend(["api", "v1"])
        .extend(segments);
    Ok(url)
}
