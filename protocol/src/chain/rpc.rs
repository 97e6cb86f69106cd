//! # JSON-RPC Transport
//!
//! Envelope types and a small `reqwest`-backed client shared by the chain
//! reader and the wallet submitter. Both talk JSON-RPC 2.0 over HTTP POST.
//!
//! | Method                  | Used by                 |
//! |-------------------------|-------------------------|
//! | `eth_call`              | balances, allowance, reserve data |
//! | `wallet_sendCalls`      | atomic batch submission |
//! | `wallet_getCallsStatus` | confirmation polling    |

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::RoutingError;

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always "2.0".
    pub jsonrpc: String,
    /// Request identifier, echoed back in the response.
    pub id: serde_json::Value,
    /// Method name, e.g. `eth_call`.
    pub method: String,
    /// Positional parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: serde_json::json!(id),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response. Exactly one of `result`/`error` is set by a
/// conforming server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<RpcErrorObject>,
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Transport-level failures talking to an RPC endpoint.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-success HTTP status.
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    /// The endpoint returned a JSON-RPC error object.
    #[error("rpc error {}: {}", .0.code, .0.message)]
    Rpc(RpcErrorObject),

    /// Neither `result` nor `error` was present.
    #[error("response for {0} carried no result")]
    MissingResult(String),

    /// `result` did not have the expected shape.
    #[error("failed to decode {method} result: {reason}")]
    Decode { method: String, reason: String },
}

impl From<RpcError> for RoutingError {
    fn from(e: RpcError) -> Self {
        RoutingError::UpstreamUnavailable(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Minimal JSON-RPC client over HTTP.
///
/// Wrap in `Arc` to share; `reqwest::Client` pools connections internally.
#[derive(Debug)]
pub struct JsonRpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(url, http))
    }

    pub fn with_client(url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends one request and decodes its `result` as `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);

        tracing::trace!(method, id, url = %self.url, "rpc request");
        let resp = self.http.post(&self.url).json(&request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: RpcResponse = resp.json().await?;
        if let Some(err) = envelope.error {
            return Err(RpcError::Rpc(err));
        }
        let result = envelope
            .result
            .ok_or_else(|| RpcError::MissingResult(method.to_string()))?;

        serde_json::from_value(result).map_err(|e| RpcError::Decode {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope_shape() {
        let req = RpcRequest::new(7, "eth_call", serde_json::json!([{"to": "0x00"}, "latest"]));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert_eq!(json["method"], "eth_call");
        assert_eq!(json["params"][1], "latest");
    }

    #[test]
    fn response_with_error_deserializes() {
        let resp: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"execution reverted"}}"#,
        )
        .unwrap();
        assert!(resp.result.is_none());
        assert_eq!(resp.error.unwrap().code, -32000);
    }

    #[test]
    fn rpc_errors_map_to_upstream_unavailable() {
        let err: RoutingError = RpcError::MissingResult("eth_call".into()).into();
        assert!(err.is_retryable());
    }
}
