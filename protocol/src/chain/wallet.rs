//! EIP-5792 wallet submission: `wallet_sendCalls` + `wallet_getCallsStatus`.
//!
//! The wallet endpoint owns the smart account's signer. We hand it the
//! batch with `atomicRequired: true` and the gas-sponsorship policy, then
//! poll until it reports a terminal status. A status of 200 with a
//! successful receipt is the only thing treated as confirmed.

use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;

use super::rpc::JsonRpcClient;
use super::traits::{BatchReceipt, BatchStatus, BatchSubmitter, SubmissionHandle};
use crate::routing::{CallBatch, RoutingError};

/// EIP-5792 request version we speak.
const CALLS_VERSION: &str = "2.0.0";

/// Status codes from `wallet_getCallsStatus`.
const STATUS_PENDING: u64 = 100;
const STATUS_CONFIRMED: u64 = 200;

/// Polling and sponsorship settings for [`WalletCallsSubmitter`].
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    pub chain_id: u64,
    /// Gas manager policy to sponsor the batch; omitted when `None`.
    pub policy_id: Option<String>,
    pub confirmation_attempts: u32,
    pub confirmation_interval: Duration,
}

/// Submits batches through a wallet endpoint speaking EIP-5792.
#[derive(Debug)]
pub struct WalletCallsSubmitter {
    client: JsonRpcClient,
    config: SubmitterConfig,
}

impl WalletCallsSubmitter {
    pub fn new(client: JsonRpcClient, config: SubmitterConfig) -> Self {
        Self { client, config }
    }

    /// Params for `wallet_sendCalls`.
    pub fn send_calls_params(&self, from: Address, batch: &CallBatch) -> serde_json::Value {
        let calls: Vec<serde_json::Value> = batch
            .calls()
            .iter()
            .map(|c| {
                serde_json::json!({
                    "to": c.target(),
                    "data": c.data(),
                    "value": "0x0",
                })
            })
            .collect();

        let mut request = serde_json::json!({
            "version": CALLS_VERSION,
            "chainId": format!("0x{:x}", self.config.chain_id),
            "from": from,
            "atomicRequired": true,
            "calls": calls,
        });
        if let Some(policy_id) = &self.config.policy_id {
            request["capabilities"] = serde_json::json!({
                "paymasterService": { "policyId": policy_id }
            });
        }
        serde_json::json!([request])
    }
}

/// `wallet_sendCalls` returns an object in v2 and a bare id string in v1.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SendCallsResult {
    Object { id: String },
    Bare(String),
}

#[derive(Debug, Deserialize)]
struct CallsStatus {
    status: StatusCode,
    #[serde(default)]
    receipts: Vec<CallsReceipt>,
}

/// Numeric in current wallets, "PENDING"/"CONFIRMED" in older ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatusCode {
    Numeric(u64),
    Named(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallsReceipt {
    transaction_hash: String,
    /// "0x1" success, "0x0" reverted.
    status: String,
}

/// What one status response says about the batch.
#[derive(Debug, PartialEq)]
enum PollOutcome {
    Pending,
    /// Terminal code but no receipt yet. The batch may still have landed.
    Unreceipted,
    Settled(BatchReceipt),
}

fn interpret(status: &CallsStatus) -> PollOutcome {
    let pending = match &status.status {
        StatusCode::Numeric(code) => *code == STATUS_PENDING,
        StatusCode::Named(name) => name.eq_ignore_ascii_case("PENDING"),
    };
    if pending {
        return PollOutcome::Pending;
    }

    let confirmed_code = match &status.status {
        StatusCode::Numeric(code) => *code == STATUS_CONFIRMED,
        StatusCode::Named(name) => name.eq_ignore_ascii_case("CONFIRMED"),
    };

    let Some(receipt) = status.receipts.last() else {
        return PollOutcome::Unreceipted;
    };
    let succeeded = confirmed_code
        && status
            .receipts
            .iter()
            .all(|r| r.status == "0x1" || r.status == "success");

    PollOutcome::Settled(BatchReceipt {
        tx_hash: receipt.transaction_hash.clone(),
        status: if succeeded {
            BatchStatus::Confirmed
        } else {
            BatchStatus::Reverted
        },
    })
}

#[async_trait]
impl BatchSubmitter for WalletCallsSubmitter {
    async fn submit_atomic_batch(
        &self,
        from: Address,
        batch: &CallBatch,
    ) -> Result<SubmissionHandle, RoutingError> {
        let params = self.send_calls_params(from, batch);
        let result: SendCallsResult = self.client.call("wallet_sendCalls", params).await?;
        let id = match result {
            SendCallsResult::Object { id } | SendCallsResult::Bare(id) => id,
        };
        tracing::info!(submission_id = %id, calls = batch.len(), "batch submitted");
        Ok(SubmissionHandle { id })
    }

    async fn await_confirmation(
        &self,
        handle: &SubmissionHandle,
    ) -> Result<BatchReceipt, RoutingError> {
        // Past this point the wallet owns the batch. Nothing below may be
        // reported as retryable or the caller could send it twice.
        let pending = || RoutingError::ConfirmationPending {
            submission_id: handle.id.clone(),
        };

        for attempt in 1..=self.config.confirmation_attempts {
            let status: CallsStatus = match self
                .client
                .call("wallet_getCallsStatus", serde_json::json!([handle.id]))
                .await
            {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(
                        submission_id = %handle.id,
                        attempt,
                        error = %e,
                        "status poll failed after submission"
                    );
                    return Err(pending());
                }
            };

            match interpret(&status) {
                PollOutcome::Pending => {
                    tracing::debug!(submission_id = %handle.id, attempt, "batch pending");
                    tokio::time::sleep(self.config.confirmation_interval).await;
                }
                PollOutcome::Settled(receipt) => return Ok(receipt),
                PollOutcome::Unreceipted => {
                    tracing::warn!(
                        submission_id = %handle.id,
                        status = ?status.status,
                        "terminal status without a receipt"
                    );
                    return Err(pending());
                }
            }
        }

        Err(pending())
    }
}
