//! # REST API
//!
//! Builds the axum router that exposes the node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                                   | Description                      |
//! |--------|----------------------------------------|----------------------------------|
//! | GET    | `/health`                              | Liveness check                   |
//! | GET    | `/status`                              | Node status summary              |
//! | GET    | `/api/profile/:user_id`                | Get or create a profile          |
//! | PATCH  | `/api/profile/:user_id`                | Set the earning preference       |
//! | GET    | `/api/users/with-payment-addresses`    | Users that can receive payments  |
//! | POST   | `/api/transactions`                    | Record a payment                 |
//! | GET    | `/api/transactions/recent`             | A user's latest payments         |
//! | GET    | `/api/transactions/all`                | Global payment feed              |
//! | GET    | `/api/wallet/:address/balance`         | Liquid / yielding breakdown      |
//! | GET    | `/api/apy`                             | Current supply APY               |
//! | POST   | `/api/payments/quote`                  | Route a payment without sending  |
//! | POST   | `/api/payments`                        | Route, submit and record         |
//! | POST   | `/api/earn`                            | Move funds into or out of yield  |
//! | POST   | `/api/earn/sync`                       | Re-derive the earning flag       |
//! | POST   | `/api/top-up`                          | Testnet faucet mint              |
//! | POST   | `/api/rpc`, `/api/rpc/*routes`         | Wallet RPC proxy                 |

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use yieldpay_protocol::amount::parse_units;
use yieldpay_protocol::chain::{BatchSubmitter, ChainReader};
use yieldpay_protocol::config::{parse_address, Addresses, TOKEN_DECIMALS};
use yieldpay_protocol::payment::{PaymentError, PaymentRequest, PaymentService};
use yieldpay_protocol::routing::RoutingError;
use yieldpay_protocol::storage::{AppDb, NewTransaction, StoreError};

use crate::metrics::SharedMetrics;
use crate::proxy::{self, SharedProxy};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// The payment service as wired by the node: trait objects over the chain.
pub type Payments = PaymentService<Arc<dyn ChainReader>, Arc<dyn BatchSubmitter>>;

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    /// Human-readable chain name.
    pub network: String,
    pub chain_id: u64,
    pub db: AppDb,
    pub payments: Arc<Payments>,
    pub proxy: SharedProxy,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The RPC proxy carries its own state and is merged in before the layers.
pub fn create_router(state: AppState) -> Router {
    let rpc = proxy::router(Arc::clone(&state.proxy));
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route(
            "/api/profile/:user_id",
            get(get_profile_handler).patch(patch_profile_handler),
        )
        .route("/api/users/with-payment-addresses", get(users_handler))
        .route("/api/transactions", post(create_transaction_handler))
        .route("/api/transactions/recent", get(recent_transactions_handler))
        .route("/api/transactions/all", get(all_transactions_handler))
        .route("/api/wallet/:address/balance", get(balance_handler))
        .route("/api/apy", get(apy_handler))
        .route("/api/payments/quote", post(quote_handler))
        .route("/api/payments", post(payment_handler))
        .route("/api/earn", post(earn_handler))
        .route("/api/earn/sync", post(earn_sync_handler))
        .route("/api/top-up", post(top_up_handler))
        .with_state(state)
        .merge(rpc)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A handler failure with the status it maps to.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            StoreError::Sled(_) | StoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<RoutingError> for ApiError {
    fn from(e: RoutingError) -> Self {
        let status = match &e {
            RoutingError::InsufficientBalance { .. }
            | RoutingError::InvalidAmount(_)
            | RoutingError::NothingToSupply => StatusCode::BAD_REQUEST,
            RoutingError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            RoutingError::BatchReverted { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            RoutingError::ConfirmationPending { .. } => StatusCode::GATEWAY_TIMEOUT,
        };
        Self::new(status, e.to_string())
    }
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::Routing(e) => e.into(),
            PaymentError::Store(e) => e.into(),
            PaymentError::UnknownUser(_) => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            PaymentError::NoPaymentAddress(_) | PaymentError::MessageTooLong(_) => {
                Self::bad_request(e.to_string())
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub chain_id: u64,
    pub addresses: Addresses,
    /// Rows in the payment ledger.
    pub transactions: usize,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileQuery {
    pub smart_account_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnRequest {
    pub user_id: String,
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub user_id: String,
}

/// `POST /api/transactions` body. Every field is optional at the wire level
/// so a missing one produces the ledger's own error message.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionBody {
    pub transaction_hash: Option<String>,
    pub from_user_id: Option<String>,
    pub to_user_id: Option<String>,
    /// Token units, as a string or a JSON number.
    pub amount: Option<Value>,
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// `GET /status`
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        chain_id: state.chain_id,
        addresses: *state.payments.addresses(),
        transactions: state.db.ledger().len(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /api/profile/:user_id?smartAccountAddress=`
async fn get_profile_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ProfileQuery>,
) -> ApiResult<Json<Value>> {
    let profile = state
        .db
        .profiles()
        .get_or_create(&user_id, query.smart_account_address.as_deref())?;
    Ok(Json(json!({ "profile": profile })))
}

/// `PATCH /api/profile/:user_id` with `{ "isEarningYield": bool }`.
///
/// Sets the stored preference only. Moving funds is `POST /api/earn`.
async fn patch_profile_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let enabled = body
        .get("isEarningYield")
        .and_then(Value::as_bool)
        .ok_or_else(|| ApiError::bad_request("isEarningYield must be a boolean"))?;

    match state.db.profiles().set_earning_yield(&user_id, enabled) {
        Ok(profile) => Ok(Json(json!({ "profile": profile }))),
        Err(StoreError::NotFound(_)) => Err(ApiError::new(StatusCode::NOT_FOUND, "Profile not found")),
        Err(e) => Err(e.into()),
    }
}

/// `GET /api/users/with-payment-addresses`
async fn users_handler(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let users = state.db.profiles().list_with_payment_address()?;
    Ok(Json(json!({ "users": users })))
}

/// `POST /api/transactions`
async fn create_transaction_handler(
    State(state): State<AppState>,
    Json(body): Json<CreateTransactionBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
    let (Some(transaction_hash), Some(from_user_id), Some(to_user_id), Some(amount)) = (
        non_empty(body.transaction_hash),
        non_empty(body.from_user_id),
        non_empty(body.to_user_id),
        body.amount.as_ref().and_then(amount_text),
    ) else {
        return Err(ApiError::bad_request("Missing required fields"));
    };

    let amount = parse_units(&amount, TOKEN_DECIMALS)
        .map_err(|e| ApiError::bad_request(format!("invalid amount: {e}")))?;
    let record = state.db.ledger().append(NewTransaction {
        transaction_hash,
        from_user_id,
        to_user_id,
        amount,
        message: body.message.filter(|m| !m.is_empty()),
    })?;
    Ok((StatusCode::CREATED, Json(json!({ "transaction": record }))))
}

fn amount_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `GET /api/transactions/recent?userId=`
async fn recent_transactions_handler(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Json<Value>> {
    let user_id = query
        .user_id
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("User ID required"))?;
    let transactions = state.db.ledger().recent_for_user_default(&user_id)?;
    Ok(Json(json!({ "transactions": transactions })))
}

/// `GET /api/transactions/all`
async fn all_transactions_handler(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let transactions = state.db.ledger().all_recent_default()?;
    Ok(Json(json!({ "transactions": transactions })))
}

/// `GET /api/wallet/:address/balance`
async fn balance_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let address = parse_address(&address)
        .ok_or_else(|| ApiError::bad_request(format!("invalid address: {address}")))?;
    Ok(Json(state.payments.wallet_balance(address).await?))
}

/// `GET /api/apy`
async fn apy_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.payments.current_apy().await)
}

/// `POST /api/payments/quote`
async fn quote_handler(
    State(state): State<AppState>,
    Json(req): Json<PaymentRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.payments.quote_payment(&req).await?))
}

/// `POST /api/payments`
async fn payment_handler(
    State(state): State<AppState>,
    Json(req): Json<PaymentRequest>,
) -> ApiResult<impl IntoResponse> {
    let m = &state.metrics;
    m.payment_requests_total.inc();
    let started = Instant::now();

    let result = state.payments.send_payment(req).await;
    m.payment_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(outcome) => {
            m.payments_submitted_total.inc();
            m.payments_confirmed_total.inc();
            let conversions = outcome
                .batch
                .kinds
                .iter()
                .filter(|k| k.is_conversion())
                .count();
            m.conversion_calls_total.inc_by(conversions as u64);
            Ok(Json(outcome))
        }
        Err(e) => {
            if e.after_submission() {
                m.payments_submitted_total.inc();
            }
            m.payments_failed_total.inc();
            tracing::warn!(error = %e, "payment failed");
            Err(e.into())
        }
    }
}

/// `POST /api/earn`
async fn earn_handler(
    State(state): State<AppState>,
    Json(req): Json<EarnRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.payments.set_earning(&req.user_id, req.enabled).await?;
    state.metrics.earn_toggles_total.inc();
    if let Some(batch) = &outcome.batch {
        let conversions = batch
            .kinds
            .iter()
            .filter(|k| k.is_conversion())
            .count();
        state.metrics.conversion_calls_total.inc_by(conversions as u64);
    }
    Ok(Json(outcome))
}

/// `POST /api/earn/sync`
async fn earn_sync_handler(
    State(state): State<AppState>,
    Json(req): Json<UserRequest>,
) -> ApiResult<Json<Value>> {
    let profile = state.payments.sync_earning_status(&req.user_id).await?;
    Ok(Json(json!({ "profile": profile })))
}

/// `POST /api/top-up`
async fn top_up_handler(
    State(state): State<AppState>,
    Json(req): Json<UserRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.payments.top_up(&req.user_id).await?;
    state.metrics.top_ups_total.inc();
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
