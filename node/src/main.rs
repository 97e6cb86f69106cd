// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # YieldPay Node
//!
//! Entry point for the `yieldpay-node` binary. Parses CLI arguments,
//! initializes logging and metrics, wires the payment service to the chain,
//! and serves the HTTP API.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start the API server
//! - `quote`   — route a payment offline and print the call batch
//! - `status`  — query a running node's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod proxy;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

use yieldpay_protocol::amount::{parse_payment_amount, parse_units};
use yieldpay_protocol::chain::{
    BatchSubmitter, ChainReader, JsonRpcClient, RpcChainReader, SubmitterConfig,
    WalletCallsSubmitter,
};
use yieldpay_protocol::config::{
    chain_rpc_url, parse_address, Addresses, APY_CACHE_TTL, RPC_REQUEST_TIMEOUT, TOKEN_DECIMALS,
};
use yieldpay_protocol::payment::{PaymentService, ServiceConfig};
use yieldpay_protocol::routing::{BalancePair, PaymentRouter, TransferRequest};
use yieldpay_protocol::storage::{AppDb, LedgerSink};

use cli::{Commands, YieldPayCli};
use logging::LogFormat;
use metrics::NodeMetrics;
use proxy::{ProxyConfig, RpcProxy};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; flags and the real environment still apply.
    let _ = dotenvy::dotenv();
    let cli = YieldPayCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Quote(args) => quote_offline(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: API server (with RPC proxy) and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "yieldpay_node=info,yieldpay_protocol=info,tower_http=debug",
        LogFormat::from(args.log_format),
    );

    let addresses = Addresses {
        liquid_token: address_arg("liquid-token", &args.liquid_token)?,
        yield_token: address_arg("yield-token", &args.yield_token)?,
        pool: address_arg("pool", &args.pool)?,
    };

    let chain_url = args
        .chain_rpc_url
        .clone()
        .or_else(|| args.api_key.as_deref().map(chain_rpc_url))
        .context("no chain RPC endpoint: set --chain-rpc-url or ALCHEMY_API_KEY")?;
    let wallet_url = args.wallet_rpc_url.clone().unwrap_or_else(|| chain_url.clone());

    if args.policy_id.is_none() {
        tracing::warn!("ALCHEMY_POLICY_ID is not set, batches will not be sponsored");
    }

    tracing::info!(
        port = args.port,
        metrics_port = args.metrics_port,
        chain_id = args.chain_id,
        network = %args.network,
        data_dir = %args.data_dir.display(),
        "starting yieldpay-node"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = AppDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Chain access ---
    let http = reqwest::Client::builder()
        .timeout(RPC_REQUEST_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;
    let reader: Arc<dyn ChainReader> = Arc::new(RpcChainReader::from_client(
        JsonRpcClient::with_client(chain_url.clone(), http.clone()),
    ));
    let submitter: Arc<dyn BatchSubmitter> = Arc::new(WalletCallsSubmitter::new(
        JsonRpcClient::with_client(wallet_url, http.clone()),
        SubmitterConfig {
            chain_id: args.chain_id,
            policy_id: args.policy_id.clone(),
            confirmation_attempts: args.confirmation_attempts,
            confirmation_interval: args.confirmation_interval(),
        },
    ));

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- Payment service ---
    let ledger: Arc<dyn LedgerSink> = Arc::new(db.ledger().clone());
    let payments = PaymentService::new(
        reader,
        submitter,
        db.profiles().clone(),
        ledger,
        ServiceConfig {
            addresses,
            explorer_base: args.explorer_url.clone(),
            apy_ttl: APY_CACHE_TTL,
        },
    );

    // --- RPC proxy ---
    let proxy = Arc::new(RpcProxy::new(
        ProxyConfig {
            api_key: args.api_key.clone(),
            policy_id: args.policy_id.clone(),
            rpc_url: Some(chain_url),
            aa_api_base: args.aa_api_base.clone(),
        },
        http,
        Arc::clone(&node_metrics),
    ));

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        network: args.network.clone(),
        chain_id: args.chain_id,
        db: db.clone(),
        payments: Arc::new(payments),
        proxy,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    db.flush().context("failed to flush database")?;
    tracing::info!("yieldpay-node stopped");
    Ok(())
}

fn address_arg(name: &str, value: &str) -> Result<alloy_primitives::Address> {
    parse_address(value).with_context(|| format!("--{name} is not a valid address: {value}"))
}

/// Routes a payment from balances given on the command line and prints the
/// resulting batch as JSON. Touches neither the chain nor the database.
fn quote_offline(args: cli::QuoteArgs) -> Result<()> {
    let owner = address_arg("owner", &args.owner)?;
    let recipient = address_arg("recipient", &args.recipient)?;

    let balances = BalancePair::new(
        parse_units(&args.liquid, TOKEN_DECIMALS).context("invalid --liquid")?,
        parse_units(&args.yielding, TOKEN_DECIMALS).context("invalid --yielding")?,
    );
    let allowance = parse_units(&args.allowance, TOKEN_DECIMALS).context("invalid --allowance")?;
    let amount = parse_payment_amount(&args.amount).context("invalid --amount")?;

    let request = TransferRequest::new(amount, recipient, args.recipient_wants_yield)?;
    let router = PaymentRouter::new(Addresses::default(), owner);
    let batch = router.build_transfer_batch(balances, &request, &router.pool_allowance(allowance))?;

    let out = json!({
        "delivers": request.target(),
        "conversions": batch.conversion_count(),
        "kinds": batch.kinds(),
        "calls": batch.calls(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.url.trim_end_matches('/'));
    let resp = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to reach {}", url))?
        .error_for_status()?;
    let body: serde_json::Value = resp.json().await.context("status response was not JSON")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("yieldpay-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc         {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
