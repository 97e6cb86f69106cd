//! # CLI Interface
//!
//! Defines the command-line argument structure for `yieldpay-node` using
//! `clap` derive. Supports four subcommands: `run`, `quote`, `status`,
//! and `version`. Every `run` flag can also come from the environment (or
//! a `.env` file loaded at startup).

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use yieldpay_protocol::config::{
    DEFAULT_AA_API_BASE, DEFAULT_BLOCK_EXPLORER_URL, DEFAULT_CHAIN_ID,
    DEFAULT_CONFIRMATION_ATTEMPTS, DEFAULT_LIQUID_TOKEN, DEFAULT_NETWORK_NAME, DEFAULT_POOL,
    DEFAULT_YIELD_TOKEN,
};

/// YieldPay payment node.
///
/// Serves the profile, ledger and payment API, routes payments between
/// liquid and yield-bearing stablecoin balances, and proxies wallet RPC
/// traffic with gas sponsorship injected.
#[derive(Parser, Debug)]
#[command(
    name = "yieldpay-node",
    about = "Yield-aware stablecoin payment node",
    version,
    propagate_version = true
)]
pub struct YieldPayCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the API server.
    Run(RunArgs),
    /// Route a payment offline from given balances and print the batch.
    Quote(QuoteArgs),
    /// Query the status of a running node.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the profile and ledger database.
    #[arg(long, short = 'd', env = "YIELDPAY_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Port for the REST API and RPC proxy.
    #[arg(long, env = "YIELDPAY_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "YIELDPAY_METRICS_PORT", default_value_t = 9742)]
    pub metrics_port: u16,

    /// Provider API key. Builds the default chain RPC URL and authorizes
    /// proxied account-abstraction calls.
    #[arg(long, env = "ALCHEMY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Gas manager policy that sponsors submitted batches.
    #[arg(long, env = "ALCHEMY_POLICY_ID")]
    pub policy_id: Option<String>,

    /// Chain RPC endpoint. Derived from the API key when omitted.
    #[arg(long, env = "YIELDPAY_CHAIN_RPC_URL")]
    pub chain_rpc_url: Option<String>,

    /// Wallet endpoint for `wallet_sendCalls`. Defaults to the chain RPC URL.
    #[arg(long, env = "YIELDPAY_WALLET_RPC_URL")]
    pub wallet_rpc_url: Option<String>,

    /// Base URL for proxied account-abstraction API routes.
    #[arg(long, env = "YIELDPAY_AA_API_BASE", default_value = DEFAULT_AA_API_BASE)]
    pub aa_api_base: String,

    #[arg(long, env = "YIELDPAY_CHAIN_ID", default_value_t = DEFAULT_CHAIN_ID)]
    pub chain_id: u64,

    #[arg(long, env = "YIELDPAY_NETWORK", default_value = DEFAULT_NETWORK_NAME)]
    pub network: String,

    #[arg(long, env = "YIELDPAY_EXPLORER_URL", default_value = DEFAULT_BLOCK_EXPLORER_URL)]
    pub explorer_url: String,

    /// The liquid stablecoin contract.
    #[arg(long, env = "YIELDPAY_LIQUID_TOKEN", default_value_t = DEFAULT_LIQUID_TOKEN.to_string())]
    pub liquid_token: String,

    /// The pool's receipt token for the liquid stablecoin.
    #[arg(long, env = "YIELDPAY_YIELD_TOKEN", default_value_t = DEFAULT_YIELD_TOKEN.to_string())]
    pub yield_token: String,

    /// The lending pool.
    #[arg(long, env = "YIELDPAY_POOL", default_value_t = DEFAULT_POOL.to_string())]
    pub pool: String,

    /// Status polls before a submitted batch is reported as still pending.
    #[arg(long, env = "YIELDPAY_CONFIRMATION_ATTEMPTS", default_value_t = DEFAULT_CONFIRMATION_ATTEMPTS)]
    pub confirmation_attempts: u32,

    /// Delay between status polls, in milliseconds.
    #[arg(long, env = "YIELDPAY_CONFIRMATION_INTERVAL_MS", default_value_t = 2_000)]
    pub confirmation_interval_ms: u64,

    #[arg(long, env = "YIELDPAY_LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,
}

impl RunArgs {
    pub fn confirmation_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_interval_ms)
    }
}

/// Arguments for the `quote` subcommand. Amounts are decimal token units.
#[derive(Parser, Debug)]
pub struct QuoteArgs {
    /// Sender's liquid balance.
    #[arg(long)]
    pub liquid: String,

    /// Sender's yield-bearing balance.
    #[arg(long, default_value = "0")]
    pub yielding: String,

    /// Amount to send.
    #[arg(long)]
    pub amount: String,

    /// Current pool allowance over the sender's liquid tokens.
    #[arg(long, default_value = "0")]
    pub allowance: String,

    /// Sender's smart account.
    #[arg(long)]
    pub owner: String,

    /// Recipient's smart account.
    #[arg(long)]
    pub recipient: String,

    /// Deliver the yield-bearing token instead of the liquid one.
    #[arg(long)]
    pub recipient_wants_yield: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Base URL of the running node.
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    pub url: String,
}
