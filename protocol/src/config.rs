//! # Protocol Configuration & Constants
//!
//! Every magic number in YieldPay lives here. Contract addresses default to
//! the Base Sepolia deployment the app was built against; the node can
//! override all of them from the command line or environment.
//!
//! Deployment addresses are carried around as an explicit [`Addresses`]
//! value rather than globals, so tests can point the router at anything.

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{address, Address, U256};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Token Parameters
// ---------------------------------------------------------------------------

/// Decimal places of the stablecoin (and of its yield-bearing receipt
/// token). All amounts are integers scaled by `10^TOKEN_DECIMALS`.
pub const TOKEN_DECIMALS: u8 = 6;

/// One whole token in minor units.
pub const ONE_TOKEN: u64 = 1_000_000;

/// Referral code passed to the lending pool's `supply`. Zero means none.
pub const REFERRAL_CODE: u16 = 0;

/// Withdraw-everything sentinel. The lending pool treats `type(uint256).max`
/// as "redeem the caller's entire receipt-token balance", so this value must
/// be passed through exactly.
pub const WITHDRAW_ALL: U256 = U256::MAX;

/// A wallet counts as "earning" once it holds more than 0.01 tokens in the
/// yield-bearing representation. Dust below that is ignored.
pub const EARNING_THRESHOLD_MINOR: u64 = 10_000;

/// Faucet top-up amount for the test token: 20 tokens.
pub const TOP_UP_AMOUNT_MINOR: u64 = 20 * ONE_TOKEN;

// ---------------------------------------------------------------------------
// Lending Pool Rates
// ---------------------------------------------------------------------------

/// Lending pool rates are expressed in RAY units (`10^27`).
pub const RAY_DECIMALS: u32 = 27;

/// APY shown when the reserve data read fails, in basis points (3.50%).
pub const FALLBACK_APY_BPS: u64 = 350;

/// How long a fetched APY stays fresh. The rate moves slowly.
pub const APY_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

// ---------------------------------------------------------------------------
// Ledger Limits
// ---------------------------------------------------------------------------

/// Maximum length of an optional payment message, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 500;

/// Entries returned by the per-user activity feed.
pub const RECENT_TRANSACTIONS_LIMIT: usize = 10;

/// Entries returned by the global activity feed.
pub const ALL_TRANSACTIONS_LIMIT: usize = 20;

/// Maximum username length (matches the original profile schema).
pub const MAX_USERNAME_LENGTH: usize = 50;

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Default number of `wallet_getCallsStatus` polls before giving up.
pub const DEFAULT_CONFIRMATION_ATTEMPTS: u32 = 60;

/// Default delay between confirmation polls.
pub const DEFAULT_CONFIRMATION_INTERVAL: Duration = Duration::from_secs(2);

/// Timeout applied to every outbound JSON-RPC request.
pub const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Network Defaults (Base Sepolia)
// ---------------------------------------------------------------------------

/// Base Sepolia chain id.
pub const DEFAULT_CHAIN_ID: u64 = 84_532;

/// Human-readable network name, for logs and `/status`.
pub const DEFAULT_NETWORK_NAME: &str = "Base Sepolia";

/// Block explorer root used to build receipt links.
pub const DEFAULT_BLOCK_EXPLORER_URL: &str = "https://sepolia.basescan.org";

/// Chain RPC root; the API key is appended as the last path segment.
pub const DEFAULT_CHAIN_RPC_BASE: &str = "https://base-sepolia.g.alchemy.com/v2";

/// Root for the account-abstraction API passthrough (`/api/rpc/*routes`).
pub const DEFAULT_AA_API_BASE: &str = "https://api.g.alchemy.com";

/// Mintable test stablecoin on Base Sepolia (6 decimals).
pub const DEFAULT_LIQUID_TOKEN: Address = address!("ba50Cd2A20f6DA35D788639E581bca8d0B5d4D5f");

/// Yield-bearing receipt token for the stablecoin reserve.
pub const DEFAULT_YIELD_TOKEN: Address = address!("f53B60F4006cab2b3C4688ce41fD5362427A2A66");

/// Lending pool proxy.
pub const DEFAULT_POOL: Address = address!("07eA79F68B2B3df564D0A34F8e19D9B1e339814b");

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// The three contracts the router talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Addresses {
    /// The liquid stablecoin.
    pub liquid_token: Address,
    /// The lending pool's receipt token for `liquid_token` deposits.
    pub yield_token: Address,
    /// The lending pool that converts between the two.
    pub pool: Address,
}

impl Default for Addresses {
    fn default() -> Self {
        Self {
            liquid_token: DEFAULT_LIQUID_TOKEN,
            yield_token: DEFAULT_YIELD_TOKEN,
            pool: DEFAULT_POOL,
        }
    }
}

/// Parses a `0x`-prefixed hex address. Returns `None` on anything else.
pub fn parse_address(s: &str) -> Option<Address> {
    let trimmed = s.trim();
    if !trimmed.starts_with("0x") && !trimmed.starts_with("0X") {
        return None;
    }
    Address::from_str(trimmed).ok()
}

/// Builds the chain RPC URL for a given API key.
pub fn chain_rpc_url(api_key: &str) -> String {
    format!("{}/{}", DEFAULT_CHAIN_RPC_BASE, api_key)
}

/// Explorer link for a transaction hash.
pub fn explorer_tx_url(explorer_base: &str, tx_hash: &str) -> String {
    format!("{}/tx/{}", explorer_base.trim_end_matches('/'), tx_hash)
}
