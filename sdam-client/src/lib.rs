//! Typed client for the SDA manager (SDAM) HTTP surface.
//!
//! Every call takes the manager address it should talk to; the client itself
//! holds no selection state.

mod client;
mod error;
mod rpc;

pub use client::{
    AppAction, DEFAULT_MANAGER_API_PORT, DEFAULT_REGISTER_PORT, DEFAULT_UPSTREAM_TIMEOUT_SECS,
    SdamClient, SdamClientConfig, host_only, split_host_port,
};
pub use error::UpstreamError;
pub use rpc::{
    AgentDetail, AgentListResponse, AppDetailPayload, DeployResponse, HealthCheck,
    RegisterRequest, UpstreamAgent, UpstreamApplication, string_or_number,
};
