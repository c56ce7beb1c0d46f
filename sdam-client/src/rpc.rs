use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamAgent {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub host: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub port: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentListResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub agents: Vec<UpstreamAgent>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentDetail {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub host: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub port: String,
    #[serde(default, deserialize_with = "strings_or_numbers")]
    pub apps: Vec<String>,
}

/// Body of `GET /agents/{id}/apps/{appId}` as the manager sends it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppDetailPayload {
    #[serde(default, deserialize_with = "string_or_number")]
    pub state: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub services: Vec<Value>,
    #[serde(default)]
    pub description: Option<Value>,
}

/// Live projection of one application on an agent. Never cached.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamApplication {
    pub id: String,
    pub state: String,
    pub service_count: usize,
    pub configuration_document: Option<Value>,
}

impl UpstreamApplication {
    pub fn from_payload(id: impl Into<String>, payload: AppDetailPayload) -> Self {
        Self {
            id: id.into(),
            state: payload.state,
            service_count: payload.services.len(),
            configuration_document: payload.description,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeployResponse {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterRequest {
    pub ip: String,
    #[serde(rename = "healthCheck")]
    pub health_check: HealthCheck,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCheck {
    pub interval: String,
}

/// Accepts a JSON string, number or bool as a `String`; `null` becomes empty.
/// The manager (and the web client) send ids and ports both ways.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_to_string(Value::deserialize(deserializer)?))
}

fn strings_or_numbers<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values.into_iter().map(scalar_to_string).collect())
}

// Go encodes empty slices as `null`.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn scalar_to_string(value: Value) -> String {
    match value {
        Value::String(value) => value,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
