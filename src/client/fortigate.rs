use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::warn;

use super::{ApplianceClient, ConnectivityError};
use crate::config::FortiGateConfig;

const STATUS_PATH: &str = "/api/v2/monitor/system/status?vdom=root";
const GLOBAL_PATH: &str = "/api/v2/cmdb/system/global?vdom=root";
const INTERFACES_PATH: &str = "/api/v2/cmdb/system/interface";
const SWITCHES_PATH: &str = "/api/v2/cmdb/switch-controller/managed-switch?vdom=root";
const ACCESS_POINTS_PATH: &str = "/api/v2/monitor/wifi/managed_ap/select?vdom=root";
const USER_DEVICES_PATH: &str = "/api/v2/monitor/user/device/query?vdom=root";

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// HTTP client for the FortiGate REST API.
///
/// Authenticates with a Bearer token when one is configured, HTTP basic
/// auth otherwise. Appliances commonly run with self-signed
/// certificates, so TLS verification can be disabled via configuration.
pub struct FortiGateClient {
    host: String,
    base_url: String,
    api_token: Option<String>,
    username: Option<String>,
    password: Option<String>,
    http_client: Client,
}

impl FortiGateClient {
    /// Create a client from connection settings.
    pub fn new(config: &FortiGateConfig) -> Self {
        let mut builder = Client::builder().timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS));
        if !config.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http_client = builder.build().expect("Failed to build HTTP client");

        Self {
            host: config.host.clone(),
            base_url: format!("https://{}:{}", config.host, config.port),
            api_token: config.api_token.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            http_client,
        }
    }

    /// Create a client with a custom base URL (for testing with a mock server).
    pub fn with_base_url(base_url: String, api_token: Option<String>) -> Self {
        let host = base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string();
        Self {
            host,
            base_url,
            api_token,
            username: None,
            password: None,
            http_client: Client::new(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.http_client.get(format!("{}{}", self.base_url, path));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        } else if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }
        request
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self
            .get(path)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", path))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} from {}", status, path);
        }
        response
            .json::<Value>()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }

    /// Fetch a monitor/cmdb endpoint and extract its `results` array.
    /// Any failure degrades to an empty list.
    async fn fetch_results_list(&self, path: &str, what: &str) -> Vec<Value> {
        match self.get_json(path).await {
            Ok(data) => data
                .get("results")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            Err(e) => {
                warn!("Failed to fetch {}: {}", what, e);
                Vec::new()
            }
        }
    }

    /// Probe the appliance once before aggregation starts.
    ///
    /// A 200 response with a JSON content type is required: FortiGate
    /// serves an HTML login page when the token is invalid, which would
    /// otherwise look like success.
    pub async fn check_connectivity(&self) -> Result<(), ConnectivityError> {
        let response = self
            .get(STATUS_PATH)
            .send()
            .await
            .map_err(|e| ConnectivityError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ConnectivityError::AuthRejected(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(ConnectivityError::Http(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type.starts_with("application/json") {
            return Err(ConnectivityError::AuthRejected(format!(
                "expected JSON, got '{}' (login page?)",
                content_type
            )));
        }

        Ok(())
    }
}

/// Merge a system status response with its nested `results` object.
///
/// Field precedence, preserved exactly from the discovery pipeline:
/// serial/version prefer the top level, hostname prefers `results`,
/// status comes from the top level only. Missing fields fall back to
/// the literal defaults downstream consumers key off.
fn merge_status(data: &Value) -> Value {
    let results = data
        .get("results")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let mut merged = results.clone();
    merged.insert(
        "serial".to_string(),
        pick(data, &results, "serial", "Unknown"),
    );
    merged.insert(
        "version".to_string(),
        pick(data, &results, "version", "Unknown"),
    );
    merged.insert(
        "hostname".to_string(),
        results
            .get("hostname")
            .cloned()
            .or_else(|| data.get("hostname").cloned())
            .unwrap_or_else(|| Value::String("FortiGate".to_string())),
    );
    merged.insert(
        "status".to_string(),
        data.get("status")
            .cloned()
            .unwrap_or_else(|| Value::String("unknown".to_string())),
    );

    Value::Object(merged)
}

fn pick(primary: &Value, fallback: &Map<String, Value>, key: &str, default: &str) -> Value {
    primary
        .get(key)
        .cloned()
        .or_else(|| fallback.get(key).cloned())
        .unwrap_or_else(|| Value::String(default.to_string()))
}

#[async_trait]
impl ApplianceClient for FortiGateClient {
    fn host(&self) -> &str {
        &self.host
    }

    async fn get_system_status(&self) -> Value {
        match self.get_json(STATUS_PATH).await {
            Ok(data) => merge_status(&data),
            Err(e) => {
                warn!("Failed to fetch system status: {}", e);
                Value::Object(Map::new())
            }
        }
    }

    async fn get_system_info(&self) -> Value {
        match self.get_json(GLOBAL_PATH).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to fetch system info: {}", e);
                Value::Object(Map::new())
            }
        }
    }

    async fn get_interfaces(&self) -> Vec<Value> {
        self.fetch_results_list(INTERFACES_PATH, "interfaces").await
    }

    async fn get_managed_switches(&self) -> Vec<Value> {
        self.fetch_results_list(SWITCHES_PATH, "managed switches")
            .await
    }

    async fn get_wifi_ap_list(&self) -> Vec<Value> {
        self.fetch_results_list(ACCESS_POINTS_PATH, "access points")
            .await
    }

    async fn get_user_devices(&self) -> Vec<Value> {
        self.fetch_results_list(USER_DEVICES_PATH, "user devices")
            .await
    }
}
