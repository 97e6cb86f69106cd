//! The payment, earn and top-up flows.
//!
//! ```text
//! resolve users ─► parse amount ─► read balances + allowance (concurrent)
//!        │
//!        ▼
//!  PaymentRouter ─► submit_atomic_batch ─► await_confirmation
//!                                               │
//!                              Confirmed ───────┼──────► Reverted
//!                                  │                        │
//!                         ledger / profile write     BatchReverted
//! ```
//!
//! Nothing is written off-chain until the batch is confirmed. A ledger
//! failure after confirmation is logged and reported in the outcome; the
//! payment itself has already happened and is not failed retroactively.

use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use super::apy::{ApyCache, ApyQuote, ApySource};
use crate::amount::{format_units, format_usd, parse_payment_amount};
use crate::chain::{BatchReceipt, BatchStatus, BatchSubmitter, ChainReader};
use crate::config::{
    explorer_tx_url, parse_address, Addresses, APY_CACHE_TTL, DEFAULT_BLOCK_EXPLORER_URL,
    FALLBACK_APY_BPS, MAX_MESSAGE_LENGTH, TOKEN_DECIMALS, TOP_UP_AMOUNT_MINOR,
};
use crate::routing::{
    apy_basis_points, is_earning, BalancePair, CallBatch, CallDescriptor, CallKind, PaymentRouter,
    RoutingError, TokenKind, TransferRequest,
};
use crate::storage::{LedgerSink, NewTransaction, Profile, ProfileStore, StoreError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("user {0} has no payment address")]
    NoPaymentAddress(String),

    #[error("message is {0} characters, at most {max} allowed", max = MAX_MESSAGE_LENGTH)]
    MessageTooLong(usize),
}

impl PaymentError {
    /// True once the wallet has accepted the batch, whatever happened next.
    pub fn after_submission(&self) -> bool {
        matches!(
            self,
            PaymentError::Routing(
                RoutingError::BatchReverted { .. } | RoutingError::ConfirmationPending { .. }
            )
        )
    }
}

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// "Send `amount` from one user to another."
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub from_user_id: String,
    pub to_user_id: String,
    /// Decimal token amount as typed, e.g. `"12.50"`.
    pub amount: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// The batch a payment would submit, without submitting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQuote {
    pub from: Address,
    pub to: Address,
    pub amount: String,
    /// Representation the recipient receives.
    pub delivers: TokenKind,
    pub liquid_balance: String,
    pub yielding_balance: String,
    pub conversions: usize,
    pub calls: Vec<CallDescriptor>,
}

/// A confirmed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub tx_hash: String,
    pub calls: usize,
    pub kinds: Vec<CallKind>,
    pub explorer_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    #[serde(flatten)]
    pub batch: BatchOutcome,
    pub amount: String,
    /// Whether the ledger accepted the record.
    pub recorded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnOutcome {
    pub profile: Profile,
    /// `None` when nothing had to move on-chain.
    pub batch: Option<BatchOutcome>,
}

/// Balance breakdown for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub address: Address,
    pub liquid: String,
    pub yielding: String,
    pub total: String,
    /// Two-decimal display values.
    pub liquid_display: String,
    pub yielding_display: String,
    pub total_display: String,
    pub is_earning: bool,
}

impl WalletBalance {
    pub fn from_balances(address: Address, balances: BalancePair) -> Self {
        let total = balances.total();
        Self {
            address,
            liquid: format_units(balances.liquid, TOKEN_DECIMALS),
            yielding: format_units(balances.yielding, TOKEN_DECIMALS),
            total: format_units(total, TOKEN_DECIMALS),
            liquid_display: format_usd(balances.liquid),
            yielding_display: format_usd(balances.yielding),
            total_display: format_usd(total),
            is_earning: is_earning(balances.yielding),
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub addresses: Addresses,
    pub explorer_base: String,
    pub apy_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            addresses: Addresses::default(),
            explorer_base: DEFAULT_BLOCK_EXPLORER_URL.to_string(),
            apy_ttl: APY_CACHE_TTL,
        }
    }
}

/// Drives payments end to end for the users in a [`ProfileStore`].
pub struct PaymentService<R, S> {
    reader: R,
    submitter: S,
    profiles: ProfileStore,
    ledger: Arc<dyn LedgerSink>,
    config: ServiceConfig,
    apy: ApyCache,
}

impl<R: ChainReader, S: BatchSubmitter> PaymentService<R, S> {
    pub fn new(
        reader: R,
        submitter: S,
        profiles: ProfileStore,
        ledger: Arc<dyn LedgerSink>,
        config: ServiceConfig,
    ) -> Self {
        let apy = ApyCache::new(config.apy_ttl);
        Self {
            reader,
            submitter,
            profiles,
            ledger,
            config,
            apy,
        }
    }

    pub fn addresses(&self) -> &Addresses {
        &self.config.addresses
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    /// Routes a payment against live balances without submitting it.
    pub async fn quote_payment(&self, req: &PaymentRequest) -> Result<PaymentQuote, PaymentError> {
        let plan = self.plan(req).await?;
        Ok(PaymentQuote {
            from: plan.sender,
            to: plan.request.recipient(),
            amount: format_units(plan.request.amount(), TOKEN_DECIMALS),
            delivers: plan.request.target(),
            liquid_balance: format_units(plan.balances.liquid, TOKEN_DECIMALS),
            yielding_balance: format_units(plan.balances.yielding, TOKEN_DECIMALS),
            conversions: plan.batch.conversion_count(),
            calls: plan.batch.calls().to_vec(),
        })
    }

    /// Routes, submits and confirms a payment, then records it.
    pub async fn send_payment(&self, req: PaymentRequest) -> Result<PaymentOutcome, PaymentError> {
        let attempt = Uuid::new_v4();
        let span = tracing::info_span!(
            "payment",
            %attempt,
            from = %req.from_user_id,
            to = %req.to_user_id,
        );

        async move {
            let message = req.message.as_deref().map(str::trim).filter(|m| !m.is_empty());
            if let Some(m) = message {
                let chars = m.chars().count();
                if chars > MAX_MESSAGE_LENGTH {
                    return Err(PaymentError::MessageTooLong(chars));
                }
            }

            let plan = self.plan(&req).await?;
            let receipt = self.submit_and_confirm(plan.sender, &plan.batch).await?;
            tracing::info!(tx_hash = %receipt.tx_hash, calls = plan.batch.len(), "payment confirmed");

            let recorded = match self.ledger.append(NewTransaction {
                transaction_hash: receipt.tx_hash.clone(),
                from_user_id: req.from_user_id.clone(),
                to_user_id: req.to_user_id.clone(),
                amount: plan.request.amount(),
                message: message.map(str::to_string),
            }) {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(tx_hash = %receipt.tx_hash, error = %e, "failed to record payment");
                    false
                }
            };

            Ok(PaymentOutcome {
                batch: self.outcome(&receipt, &plan.batch),
                amount: format_units(plan.request.amount(), TOKEN_DECIMALS),
                recorded,
            })
        }
        .instrument(span)
        .await
    }

    /// Turns earning on (supply the whole liquid balance) or off (withdraw
    /// everything). The profile flag follows only a confirmed batch.
    pub async fn set_earning(&self, user_id: &str, enabled: bool) -> Result<EarnOutcome, PaymentError> {
        let (_, owner) = self.resolve(user_id)?;
        let router = PaymentRouter::new(self.config.addresses, owner);
        let a = self.config.addresses;

        let batch = if enabled {
            let liquid = self.reader.token_balance(a.liquid_token, owner).await?;
            Some(router.build_enable_earning_batch(liquid)?)
        } else {
            let yielding = self.reader.token_balance(a.yield_token, owner).await?;
            (!yielding.is_zero()).then(|| router.build_disable_earning_batch())
        };

        let outcome = match batch {
            Some(batch) => {
                let receipt = self.submit_and_confirm(owner, &batch).await?;
                Some(self.outcome(&receipt, &batch))
            }
            None => None,
        };

        let profile = self.profiles.set_earning_yield(user_id, enabled)?;
        tracing::info!(user_id, enabled, "earning toggled");
        Ok(EarnOutcome {
            profile,
            batch: outcome,
        })
    }

    /// Re-derives the earning flag from the on-chain yielding balance.
    pub async fn sync_earning_status(&self, user_id: &str) -> Result<Profile, PaymentError> {
        let (profile, owner) = self.resolve(user_id)?;
        let yielding = self
            .reader
            .token_balance(self.config.addresses.yield_token, owner)
            .await?;
        let earning = is_earning(yielding);
        if earning == profile.is_earning_yield {
            return Ok(profile);
        }
        tracing::info!(user_id, earning, "earning flag out of sync, updating");
        Ok(self.profiles.set_earning_yield(user_id, earning)?)
    }

    /// Mints testnet stablecoins to the user's account.
    pub async fn top_up(&self, user_id: &str) -> Result<BatchOutcome, PaymentError> {
        let (_, owner) = self.resolve(user_id)?;
        let router = PaymentRouter::new(self.config.addresses, owner);
        let batch = router.build_top_up_batch(U256::from(TOP_UP_AMOUNT_MINOR))?;
        let receipt = self.submit_and_confirm(owner, &batch).await?;
        tracing::info!(user_id, tx_hash = %receipt.tx_hash, "top-up confirmed");
        Ok(self.outcome(&receipt, &batch))
    }

    pub async fn wallet_balance(&self, address: Address) -> Result<WalletBalance, PaymentError> {
        let a = self.config.addresses;
        let (liquid, yielding) = tokio::try_join!(
            self.reader.token_balance(a.liquid_token, address),
            self.reader.token_balance(a.yield_token, address),
        )?;
        Ok(WalletBalance::from_balances(
            address,
            BalancePair::new(liquid, yielding),
        ))
    }

    /// Supply APY of the liquid token's reserve. Never fails: an
    /// unreadable pool yields the fallback figure.
    pub async fn current_apy(&self) -> ApyQuote {
        if let Some(bps) = self.apy.get() {
            return ApyQuote::new(bps, ApySource::Pool);
        }
        let a = self.config.addresses;
        match self.reader.liquidity_rate(a.pool, a.liquid_token).await {
            Ok(rate) => {
                let bps = apy_basis_points(rate);
                self.apy.put(bps);
                ApyQuote::new(bps, ApySource::Pool)
            }
            Err(e) => {
                tracing::warn!(error = %e, "liquidity rate unavailable, using fallback APY");
                ApyQuote::new(FALLBACK_APY_BPS, ApySource::Fallback)
            }
        }
    }

    // -- internals ----------------------------------------------------------

    fn resolve(&self, user_id: &str) -> Result<(Profile, Address), PaymentError> {
        let profile = self
            .profiles
            .get(user_id)?
            .ok_or_else(|| PaymentError::UnknownUser(user_id.to_string()))?;
        let address = profile
            .payment_address
            .as_deref()
            .and_then(parse_address)
            .ok_or_else(|| PaymentError::NoPaymentAddress(user_id.to_string()))?;
        Ok((profile, address))
    }

    async fn plan(&self, req: &PaymentRequest) -> Result<Plan, PaymentError> {
        let amount = parse_payment_amount(&req.amount).map_err(RoutingError::from)?;
        let (_, sender) = self.resolve(&req.from_user_id)?;
        let (recipient, to) = self.resolve(&req.to_user_id)?;
        let request = TransferRequest::new(amount, to, recipient.is_earning_yield)?;

        let started = Instant::now();
        let a = self.config.addresses;
        let (liquid, yielding, allowance) = tokio::try_join!(
            self.reader.token_balance(a.liquid_token, sender),
            self.reader.token_balance(a.yield_token, sender),
            self.reader.allowance(a.liquid_token, sender, a.pool),
        )?;
        tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "sender state read");

        let balances = BalancePair::new(liquid, yielding);
        let router = PaymentRouter::new(a, sender);
        let batch = router.build_transfer_batch(balances, &request, &router.pool_allowance(allowance))?;
        Ok(Plan {
            sender,
            request,
            balances,
            batch,
        })
    }

    async fn submit_and_confirm(
        &self,
        from: Address,
        batch: &CallBatch,
    ) -> Result<BatchReceipt, RoutingError> {
        let handle = self.submitter.submit_atomic_batch(from, batch).await?;
        let receipt = self.submitter.await_confirmation(&handle).await?;
        match receipt.status {
            BatchStatus::Confirmed => Ok(receipt),
            BatchStatus::Reverted => {
                tracing::warn!(tx_hash = %receipt.tx_hash, "batch reverted");
                Err(RoutingError::BatchReverted {
                    tx_hash: Some(receipt.tx_hash),
                    reason: "execution reverted".to_string(),
                })
            }
        }
    }

    fn outcome(&self, receipt: &BatchReceipt, batch: &CallBatch) -> BatchOutcome {
        BatchOutcome {
            tx_hash: receipt.tx_hash.clone(),
            calls: batch.len(),
            kinds: batch.kinds(),
            explorer_url: explorer_tx_url(&self.config.explorer_base, &receipt.tx_hash),
        }
    }
}

struct Plan {
    sender: Address,
    request: TransferRequest,
    balances: BalancePair,
    batch: CallBatch,
}
