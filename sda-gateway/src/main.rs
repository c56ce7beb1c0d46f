use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use sda_gateway::{GatewayConfig, GatewayState, build_gateway_app, init_logging};
use sdam::{
    DEFAULT_MANAGER_API_PORT, DEFAULT_REGISTER_PORT, DEFAULT_UPSTREAM_TIMEOUT_SECS,
    SdamClientConfig,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if wants_version_flag() {
        println!("{}", binary_version_text());
        return Ok(());
    }

    init_logging()?;
    info!("{}", binary_version_text());

    let addr = parse_addr("GATEWAY_ADDR", "0.0.0.0:5000")?;
    let config = GatewayConfig {
        data_dir: parse_optional_path("GATEWAY_DATA_DIR", ".sda-gateway"),
        upstream: SdamClientConfig {
            manager_api_port: parse_u16("SDAM_API_PORT", DEFAULT_MANAGER_API_PORT)?,
            register_port: parse_u16("SDA_REGISTER_PORT", DEFAULT_REGISTER_PORT)?,
            request_timeout: Duration::from_secs(parse_u64(
                "UPSTREAM_TIMEOUT_SECS",
                DEFAULT_UPSTREAM_TIMEOUT_SECS,
            )?),
        },
        initial_manager: env::var("SDAM_ADDRESS")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
    };
    match config.data_dir.as_deref() {
        Some(dir) => info!("local documents stored under {}", dir.display()),
        None => info!("local documents kept in memory"),
    }

    let state = GatewayState::new(config)?;
    let app = build_gateway_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("gateway listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn parse_addr(key: &str, default: &str) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    Ok(value.parse()?)
}

fn parse_u16(key: &str, default: u16) -> Result<u16, Box<dyn std::error::Error>> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().parse()?),
        Err(_) => Ok(default),
    }
}

fn parse_u64(key: &str, default: u64) -> Result<u64, Box<dyn std::error::Error>> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().parse()?),
        Err(_) => Ok(default),
    }
}

fn parse_optional_path(key: &str, default: &str) -> Option<PathBuf> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

fn wants_version_flag() -> bool {
    env::args()
        .skip(1)
        .any(|arg| matches!(arg.as_str(), "-V" | "--version"))
}

fn binary_version_text() -> String {
    let binary = env!("CARGO_PKG_NAME");
    let git_tag = option_env!("SDA_BUILD_GIT_TAG").unwrap_or("untagged");
    let git_commit = option_env!("SDA_BUILD_GIT_COMMIT").unwrap_or("unknown");
    let git_dirty = option_env!("SDA_BUILD_GIT_DIRTY").unwrap_or("false");
    let dirty = matches!(git_dirty, "true" | "1" | "yes" | "dirty");

    if dirty {
        format!("{binary} {git_tag} (dirty commit: {git_commit})")
    } else {
        format!("{binary} {git_tag}")
    }
}
