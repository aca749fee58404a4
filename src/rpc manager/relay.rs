//! Priority relay (block engine) submission over JSON-RPC

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::rpc_errors::RpcManagerError;

/// One relay region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEndpoint {
    pub region: String,
    pub url: String,
    /// Lower is tried first
    #[serde(default)]
    pub priority: u8,
}

impl RelayEndpoint {
    pub fn new(region: &str, url: &str, priority: u8) -> Self {
        Self {
            region: region.to_string(),
            url: url.to_string(),
            priority,
        }
    }
}

/// Default block-engine regions in the order they are tried
pub fn default_relay_endpoints() -> Vec<RelayEndpoint> {
    vec![
        RelayEndpoint::new("mainnet", "https://mainnet.block-engine.jito.wtf", 1),
        RelayEndpoint::new("NY", "https://ny.mainnet.block-engine.jito.wtf", 2),
        RelayEndpoint::new("Amsterdam", "https://amsterdam.mainnet.block-engine.jito.wtf", 3),
        RelayEndpoint::new("Frankfurt", "https://frankfurt.mainnet.block-engine.jito.wtf", 4),
        RelayEndpoint::new("Tokyo", "https://tokyo.mainnet.block-engine.jito.wtf", 5),
    ]
}

/// A priority submission endpoint
#[async_trait]
pub trait PriorityRelay: Send + Sync + std::fmt::Debug {
    /// Endpoint identity for logs and error messages
    fn endpoint(&self) -> &str;

    /// Region label for logs
    fn region(&self) -> &str {
        self.endpoint()
    }

    /// Submit one signed transaction; returns the relay's transaction id
    async fn send_transaction(&self, encoded_tx: &str) -> Result<String, RpcManagerError>;

    /// Submit an ordered bundle; returns the bundle id
    async fn send_bundle(&self, encoded_txs: &[String]) -> Result<String, RpcManagerError>;
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

/// Block-engine relay for one region
#[derive(Debug)]
pub struct JitoRelay {
    client: reqwest::Client,
    endpoint: RelayEndpoint,
    timeout: Duration,
}

impl JitoRelay {
    pub fn new(endpoint: RelayEndpoint, timeout: Duration) -> Result<Self, RpcManagerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcManagerError::Configuration(format!("relay HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    async fn call(&self, path: &str, method: &str, params: serde_json::Value) -> Result<String, RpcManagerError> {
        let url = format!("{}{}", self.endpoint.url.trim_end_matches('/'), path);
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let timeout_ms = self.timeout.as_millis() as u64;

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                RpcManagerError::Timeout {
                    endpoint: self.endpoint.url.clone(),
                    timeout_ms,
                }
            } else {
                RpcManagerError::Transport {
                    endpoint: self.endpoint.url.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| RpcManagerError::Transport {
            endpoint: self.endpoint.url.clone(),
            message: e.to_string(),
        })?;

        let parsed: Option<JsonRpcResponse> = serde_json::from_str(&text).ok();

        if let Some(JsonRpcResponse {
            error: Some(error), ..
        }) = &parsed
        {
            return Err(RpcManagerError::classify(
                &error.message,
                &self.endpoint.url,
                error
                    .code
                    .or_else(|| (!status.is_success()).then_some(status.as_u16() as i64)),
                timeout_ms,
            ));
        }

        if !status.is_success() {
            return Err(RpcManagerError::classify(
                &text,
                &self.endpoint.url,
                Some(status.as_u16() as i64),
                timeout_ms,
            ));
        }

        match parsed.and_then(|p| p.result) {
            Some(serde_json::Value::String(id)) if !id.is_empty() => {
                debug!(region = %self.endpoint.region, method, id = %id, "Relay accepted submission");
                Ok(id)
            }
            other => Err(RpcManagerError::MalformedResponse {
                endpoint: self.endpoint.url.clone(),
                message: format!("expected a string result, got {:?}", other),
            }),
        }
    }
}

#[async_trait]
impl PriorityRelay for JitoRelay {
    fn endpoint(&self) -> &str {
        &self.endpoint.url
    }

    fn region(&self) -> &str {
        &self.endpoint.region
    }

    async fn send_transaction(&self, encoded_tx: &str) -> Result<String, RpcManagerError> {
        self.call(
            "/api/v1/transactions",
            "sendTransaction",
            json!([encoded_tx, { "encoding": "base64" }]),
        )
        .await
    }

    async fn send_bundle(&self, encoded_txs: &[String]) -> Result<String, RpcManagerError> {
        self.call(
            "/api/v1/bundles",
            "sendBundle",
            json!([encoded_txs, { "encoding": "base64" }]),
        )
        .await
    }
}
