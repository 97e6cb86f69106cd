//! # RPC Proxy
//!
//! Browser wallets talk to the chain through this node so the provider API
//! key and the gas policy never leave the server.
//!
//! | Path               | Upstream                              | Auth                  |
//! |--------------------|---------------------------------------|-----------------------|
//! | `/api/rpc`         | chain RPC URL (key in the path)       | none                  |
//! | `/api/rpc/*routes` | `<aa_api_base>/<routes>`              | `Bearer <api key>`    |
//!
//! Before forwarding, the gas policy id is written into sponsorship
//! requests. Upstream status and JSON body are relayed unchanged.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use thiserror::Error;

use crate::api::ErrorResponse;
use crate::metrics::SharedMetrics;

/// Header the account-kit SDK uses to report its version.
pub const SDK_VERSION_HEADER: &str = "alchemy-aa-sdk-version";

const GAS_AND_PAYMASTER: &str = "alchemy_requestGasAndPaymasterAndData";

#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub api_key: Option<String>,
    pub policy_id: Option<String>,
    /// Full chain RPC URL. `None` when no API key was configured.
    pub rpc_url: Option<String>,
    pub aa_api_base: String,
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("ALCHEMY_API_KEY is not set")]
    MissingApiKey,

    #[error("ALCHEMY_POLICY_ID is not set")]
    MissingPolicyId,

    #[error("request body is not valid JSON: {0}")]
    BadRequest(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            // Plain-text 500, as wallet SDKs surface the body verbatim.
            ProxyError::MissingApiKey | ProxyError::MissingPolicyId => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
            }
            ProxyError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: self.to_string(),
                }),
            )
                .into_response(),
            ProxyError::Upstream(_) => (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: self.to_string(),
                }),
            )
                .into_response(),
        }
    }
}

/// Where a proxied request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Chain,
    Api(String),
}

pub struct RpcProxy {
    config: ProxyConfig,
    http: reqwest::Client,
    metrics: SharedMetrics,
}

pub type SharedProxy = Arc<RpcProxy>;

impl RpcProxy {
    pub fn new(config: ProxyConfig, http: reqwest::Client, metrics: SharedMetrics) -> Self {
        Self {
            config,
            http,
            metrics,
        }
    }

    /// Validates configuration, injects the policy id and relays `raw`.
    pub async fn forward(
        &self,
        target: Target,
        raw: &[u8],
        sdk_version: Option<String>,
    ) -> Result<(StatusCode, Value), ProxyError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ProxyError::MissingApiKey)?;
        let mut body: Value =
            serde_json::from_slice(raw).map_err(|e| ProxyError::BadRequest(e.to_string()))?;
        let policy_id = self
            .config
            .policy_id
            .as_deref()
            .ok_or(ProxyError::MissingPolicyId)?;
        inject_policy(&mut body, policy_id);

        let request = match &target {
            Target::Chain => {
                let url = self
                    .config
                    .rpc_url
                    .as_deref()
                    .ok_or(ProxyError::MissingApiKey)?;
                self.http.post(url)
            }
            Target::Api(routes) => {
                let url = format!(
                    "{}/{}",
                    self.config.aa_api_base.trim_end_matches('/'),
                    routes.trim_start_matches('/')
                );
                let mut req = self.http.post(url).bearer_auth(api_key);
                if let Some(v) = sdk_version {
                    req = req.header(SDK_VERSION_HEADER, v);
                }
                req
            }
        };

        self.metrics.rpc_proxy_requests_total.inc();
        tracing::debug!(
            route = ?target,
            method = body["method"].as_str().unwrap_or("-"),
            "proxying rpc request"
        );

        let resp = request
            .json(&body)
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;
        let status = StatusCode::from_u16(resp.status().as_u16())
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| ProxyError::Upstream(format!("non-JSON response: {e}")))?;
        Ok((status, payload))
    }
}

/// Writes `policy_id` into the places sponsorship requests expect it.
///
/// `wallet_prepareCalls`/`wallet_sendCalls` only get it when the caller
/// already asked for sponsorship (a `policyIds` array is present).
pub fn inject_policy(body: &mut Value, policy_id: &str) {
    let method = body
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match method.as_str() {
        GAS_AND_PAYMASTER => {
            if let Some(first) = body
                .pointer_mut("/params/0")
                .and_then(Value::as_object_mut)
            {
                first.insert("policyId".into(), json!(policy_id));
            }
        }
        "wallet_prepareCalls" | "wallet_sendCalls" => {
            if let Some(ids) = body.pointer_mut("/params/0/capabilities/paymasterService/policyIds") {
                if !ids.is_null() {
                    *ids = json!([policy_id]);
                }
            }
        }
        _ => {}
    }
}

fn sdk_version(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SDK_VERSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn relay(result: Result<(StatusCode, Value), ProxyError>) -> Response {
    match result {
        Ok((status, body)) => (status, Json(body)).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "rpc proxy request failed");
            e.into_response()
        }
    }
}

/// Both proxy routes, bound to `proxy`.
pub fn router(proxy: SharedProxy) -> Router {
    Router::new()
        .route("/api/rpc", post(chain_rpc_handler))
        .route("/api/rpc/*routes", post(api_rpc_handler))
        .with_state(proxy)
}

/// `POST /api/rpc`
async fn chain_rpc_handler(State(proxy): State<SharedProxy>, body: Bytes) -> Response {
    relay(proxy.forward(Target::Chain, &body, None).await)
}

/// `POST /api/rpc/*routes`
async fn api_rpc_handler(
    State(proxy): State<SharedProxy>,
    Path(routes): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    relay(
        proxy
            .forward(Target::Api(routes), &body, sdk_version(&headers))
            .await,
    )
}
