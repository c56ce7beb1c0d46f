mod common;

use common::*;
use reqwest::StatusCode;
use sda_gateway::GatewayConfig;
use serde_json::{Value, json};

#[tokio::test]
async fn register_asks_the_agent_with_the_manager_host() {
    let manager = spawn_mock(MockState::default()).await;
    let agent = spawn_mock(MockState::default()).await;
    let (addr, _gateway) = spawn_gateway(GatewayConfig {
        initial_manager: Some(manager.address()),
        ..GatewayConfig::default()
    })
    .await;
    let client = reqwest::Client::new();

    let response = post_raw(
        &client,
        format!("http://{addr}/manager/register"),
        json!({"ip": agent.address(), "interval": 10}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert!(manager.calls().is_empty());
    let body = agent
        .body_of("POST /api/v1/register")
        .expect("agent should receive the register call");
    let body: Value = serde_json::from_str(&body).expect("register body should be json");
    assert_eq!(
        body,
        json!({"ip": "127.0.0.1", "healthCheck": {"interval": "10"}})
    );
}

#[tokio::test]
async fn register_requires_a_manager() {
    let agent = spawn_mock(MockState::default()).await;
    let (addr, _gateway) = spawn_gateway(GatewayConfig::default()).await;
    let client = reqwest::Client::new();

    let response = post_raw(
        &client,
        format!("http://{addr}/manager/register"),
        json!({"ip": agent.address(), "interval": "5"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(agent.calls().is_empty());
}

#[tokio::test]
async fn unregister_targets_the_selected_device() {
    let manager = spawn_mock(MockState::default()).await;
    let agent = spawn_mock(MockState::default()).await;
    let (addr, _gateway) = spawn_gateway(GatewayConfig {
        initial_manager: Some(manager.address()),
        ..GatewayConfig::default()
    })
    .await;
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/manager/unregister"))
        .send()
        .await
        .expect("gateway request should complete");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = post_raw(
        &client,
        format!("{base}/manager/device"),
        json!({"id": "a1", "host": "127.0.0.1", "port": agent.addr.port()}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(format!("{base}/manager/unregister"))
        .send()
        .await
        .expect("gateway request should complete");
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(agent.calls(), vec!["POST /api/v1/unregister".to_string()]);
    assert!(manager.calls().is_empty());
}

#[tokio::test]
async fn failed_registration_is_a_server_error() {
    let manager = spawn_mock(MockState::default()).await;
    let agent = spawn_mock(MockState {
        status_override: Some(503),
        ..MockState::default()
    })
    .await;
    let (addr, _gateway) = spawn_gateway(GatewayConfig {
        initial_manager: Some(manager.address()),
        ..GatewayConfig::default()
    })
    .await;
    let client = reqwest::Client::new();

    let response = post_raw(
        &client,
        format!("http://{addr}/manager/register"),
        json!({"ip": agent.address(), "interval": 30}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
