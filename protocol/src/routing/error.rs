//! Error taxonomy for payment routing and submission.

use alloy_primitives::U256;
use thiserror::Error;

use crate::amount::{format_units, AmountError};
use crate::config::TOKEN_DECIMALS;
use crate::evm::AbiError;

/// Everything that can stop a payment attempt.
///
/// `InsufficientBalance` and `InvalidAmount` are local validation failures
/// shown to the user as-is. `UpstreamUnavailable` is the only retryable
/// variant: re-run the whole attempt from fresh reads. `BatchReverted` is
/// terminal for the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// Liquid plus yielding balance does not cover the request.
    #[error("insufficient balance: have {}, need {}", display(.have), display(.need))]
    InsufficientBalance {
        /// Sender's total across both representations.
        have: U256,
        /// Amount requested.
        need: U256,
    },

    /// The amount string was not a valid positive amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A balance/allowance read or the submission endpoint failed.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The batch executed on-chain and reverted as a unit.
    #[error("batch reverted{}: {reason}", hash_suffix(.tx_hash))]
    BatchReverted {
        /// Hash of the reverted transaction, when one was produced.
        tx_hash: Option<String>,
        /// Reason reported by the submission layer.
        reason: String,
    },

    /// The batch was accepted but did not reach a terminal state in time.
    /// It may still land, so re-submitting could pay twice.
    #[error("batch {submission_id} still pending after confirmation window")]
    ConfirmationPending {
        /// Wallet-assigned identifier to check on later.
        submission_id: String,
    },

    /// Turning on earning with an empty liquid balance.
    #[error("no liquid balance to supply")]
    NothingToSupply,
}

impl RoutingError {
    /// Whether re-running the attempt from scratch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RoutingError::UpstreamUnavailable(_))
    }
}

impl From<AmountError> for RoutingError {
    fn from(e: AmountError) -> Self {
        RoutingError::InvalidAmount(e.to_string())
    }
}

impl From<AbiError> for RoutingError {
    fn from(e: AbiError) -> Self {
        RoutingError::UpstreamUnavailable(format!("malformed return data: {e}"))
    }
}

fn display(v: &U256) -> String {
    format_units(*v, TOKEN_DECIMALS)
}

fn hash_suffix(tx_hash: &Option<String>) -> String {
    tx_hash
        .as_ref()
        .map(|h| format!(" ({h})"))
        .unwrap_or_default()
}
