//! Seams between the payment flows and the outside world.
//!
//! The flows only see these traits. Production wires in the JSON-RPC
//! implementations from [`super::reader`] and [`super::wallet`]; tests wire
//! in in-memory fakes.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::routing::{CallBatch, RoutingError};

/// Read-only chain queries. No side effects, safe to abandon mid-flight.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// `token.balanceOf(owner)`.
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, RoutingError>;

    /// `token.allowance(owner, spender)`.
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, RoutingError>;

    /// The pool's current liquidity rate for `asset`, in RAY.
    async fn liquidity_rate(&self, pool: Address, asset: Address) -> Result<U256, RoutingError>;
}

/// Opaque identifier for a submitted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionHandle {
    /// Identifier assigned by the wallet endpoint.
    pub id: String,
}

/// Terminal on-chain outcome of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// Every call in the batch executed.
    Confirmed,
    /// The batch reverted; no call took effect.
    Reverted,
}

/// Receipt for a batch that reached a terminal state on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceipt {
    /// Hash of the transaction that carried the batch.
    pub tx_hash: String,
    pub status: BatchStatus,
}

/// Atomic multi-call submission.
///
/// Implementations must guarantee all-or-nothing execution of the calls in
/// the order given. Signing and gas sponsorship are the implementation's
/// concern.
#[async_trait]
pub trait BatchSubmitter: Send + Sync {
    /// Hands `batch` to the wallet for execution from `from`.
    async fn submit_atomic_batch(
        &self,
        from: Address,
        batch: &CallBatch,
    ) -> Result<SubmissionHandle, RoutingError>;

    /// Waits until the batch is included and reports its outcome.
    async fn await_confirmation(
        &self,
        handle: &SubmissionHandle,
    ) -> Result<BatchReceipt, RoutingError>;
}

#[async_trait]
impl<T: ChainReader + ?Sized> ChainReader for Arc<T> {
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, RoutingError> {
        (**self).token_balance(token, owner).await
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, RoutingError> {
        (**self).allowance(token, owner, spender).await
    }

    async fn liquidity_rate(&self, pool: Address, asset: Address) -> Result<U256, RoutingError> {
        (**self).liquidity_rate(pool, asset).await
    }
}

#[async_trait]
impl<T: BatchSubmitter + ?Sized> BatchSubmitter for Arc<T> {
    async fn submit_atomic_batch(
        &self,
        from: Address,
        batch: &CallBatch,
    ) -> Result<SubmissionHandle, RoutingError> {
        (**self).submit_atomic_batch(from, batch).await
    }

    async fn await_confirmation(
        &self,
        handle: &SubmissionHandle,
    ) -> Result<BatchReceipt, RoutingError> {
        (**self).await_confirmation(handle).await
    }
}
