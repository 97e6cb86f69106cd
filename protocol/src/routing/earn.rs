//! Earning status and lending pool rate helpers.

use alloy_primitives::U256;

use crate::config::{EARNING_THRESHOLD_MINOR, RAY_DECIMALS};

/// Whether a yielding balance is large enough to count as "earning".
pub fn is_earning(yielding_balance: U256) -> bool {
    yielding_balance > U256::from(EARNING_THRESHOLD_MINOR)
}

/// Converts a RAY-denominated liquidity rate into basis points, rounding
/// down. `0.035e27` becomes `350`.
pub fn apy_basis_points(liquidity_rate_ray: U256) -> u64 {
    let ray = U256::from(10u64).pow(U256::from(RAY_DECIMALS));
    let bps = liquidity_rate_ray.saturating_mul(U256::from(10_000u64)) / ray;
    if bps > U256::from(u64::MAX) {
        u64::MAX
    } else {
        bps.to::<u64>()
    }
}

/// Renders basis points as a percentage with two decimals: `350` → `"3.50"`.
pub fn format_apy(bps: u64) -> String {
    format!("{}.{:02}", bps / 100, bps % 100)
}
