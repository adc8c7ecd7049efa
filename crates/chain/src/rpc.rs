use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::ChainError;

/// Minimal JSON-RPC 2.0 client over HTTP
pub struct JsonRpcClient {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Configuration(format!("http client: {e}")))?;

        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and deserialize its result.
    ///
    /// A `null` result deserializes into `Option<T>` as `None`.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, ChainError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!(method, id, url = %self.url, "rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(ChainError::from)?;

        let status = response.status();
        if status.as_u16() == 429 {
            warn!(method, "rpc endpoint rate limited");
            return Err(ChainError::RateLimited(format!("{method}: HTTP 429")));
        }
        if status.is_server_error() {
            return Err(ChainError::Network(format!("{method}: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(ChainError::Rpc {
                code: status.as_u16() as i64,
                message: format!("{method}: HTTP {status}"),
            });
        }

        let body: RpcResponse = response.json().await.map_err(ChainError::from)?;
        decode_response(method, body)
    }
}

fn decode_response<R: DeserializeOwned>(method: &str, body: RpcResponse) -> Result<R, ChainError> {
    if let Some(err) = body.error {
        return Err(ChainError::from_rpc(err.code, err.message));
    }

    serde_json::from_value(body.result.unwrap_or(Value::Null)).map_err(|e| ChainError::Rpc {
        code: 0,
        message: format!("{method}: unexpected result shape: {e}"),
    })
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_hex_u64(value: &str) -> Result<u64, ChainError> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Rpc {
            code: 0,
            message: format!("quantity without 0x prefix: {value}"),
        })?;
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16).map_err(|e| ChainError::Rpc {
        code: 0,
        message: format!("invalid hex quantity {value}: {e}"),
    })
}

/// Parse a `0x`-prefixed hex quantity that may exceed 64 bits
pub fn parse_hex_u128(value: &str) -> Result<u128, ChainError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| ChainError::Rpc {
        code: 0,
        message: format!("invalid hex quantity {value}: {e}"),
    })
}
