//! The payment router: decides which token moves and what has to be
//! converted first, then emits the call batch.
//!
//! ```text
//!                    total < amount ──► InsufficientBalance
//!                          │
//!          target = recipient wants yield ? yielding : liquid
//!                          │
//!        target balance ≥ amount ──► [transfer]
//!                          │ no: shortfall = amount − target balance
//!             ┌────────────┴────────────┐
//!        target yielding           target liquid
//!   [approve?] supply(shortfall)   withdraw(shortfall)
//!             └────────────┬────────────┘
//!                     transfer(amount)
//! ```
//!
//! The router never reads the chain. Callers read both balances and the
//! pool allowance first and pass them in, which keeps every decision here
//! a pure function of its inputs.

use alloy_primitives::{Address, U256};

use super::error::RoutingError;
use super::types::{
    Allowance, BalancePair, CallBatch, CallDescriptor, CallKind, TokenKind, TransferRequest,
};
use crate::config::{Addresses, REFERRAL_CODE, WITHDRAW_ALL};
use crate::evm::{erc20, pool};

/// Builds call batches for one smart account.
///
/// Holds only immutable configuration, so one instance can be shared
/// freely across concurrent requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentRouter {
    addresses: Addresses,
    owner: Address,
}

impl PaymentRouter {
    /// `owner` is the sender's smart account: it receives supplied
    /// receipt tokens and withdrawn stablecoins.
    pub fn new(addresses: Addresses, owner: Address) -> Self {
        Self { addresses, owner }
    }

    pub fn addresses(&self) -> &Addresses {
        &self.addresses
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// The pool's approval over this owner's liquid tokens.
    pub fn pool_allowance(&self, amount: U256) -> Allowance {
        Allowance {
            owner: self.owner,
            spender: self.addresses.pool,
            amount,
        }
    }

    /// Token contract for a representation.
    pub fn token_address(&self, kind: TokenKind) -> Address {
        match kind {
            TokenKind::Liquid => self.addresses.liquid_token,
            TokenKind::Yielding => self.addresses.yield_token,
        }
    }

    /// Computes the batch that delivers `request.amount()` to the recipient
    /// in the representation they prefer.
    ///
    /// `allowance` only matters when a supply is needed. An approval held by
    /// anyone other than the pool over this owner's tokens counts as none.
    pub fn build_transfer_batch(
        &self,
        balances: BalancePair,
        request: &TransferRequest,
        allowance: &Allowance,
    ) -> Result<CallBatch, RoutingError> {
        let amount = request.amount();
        let total = balances.total();
        if total < amount {
            return Err(RoutingError::InsufficientBalance {
                have: total,
                need: amount,
            });
        }

        let target = request.target();
        let target_balance = balances.of(target);
        let mut batch = CallBatch::new();

        if target_balance < amount {
            let shortfall = amount - target_balance;
            tracing::debug!(
                %target,
                %shortfall,
                %target_balance,
                "converting shortfall before transfer"
            );

            match target {
                TokenKind::Yielding => {
                    let approved = allowance.owner == self.owner
                        && allowance.spender == self.addresses.pool
                        && allowance.covers(shortfall);
                    if !approved {
                        batch.push(self.approve_pool(shortfall));
                    }
                    batch.push(self.supply(shortfall));
                }
                TokenKind::Liquid => {
                    batch.push(self.withdraw(shortfall));
                }
            }
        }

        batch.push(CallDescriptor::new(
            CallKind::Transfer,
            self.token_address(target),
            erc20::transfer(request.recipient(), amount),
        ));

        tracing::debug!(
            calls = batch.len(),
            kinds = ?batch.kinds(),
            "transfer batch built"
        );
        Ok(batch)
    }

    /// Moves the entire liquid balance into the pool.
    ///
    /// Always approves exactly the amount being supplied, independent of
    /// the current allowance.
    pub fn build_enable_earning_batch(&self, liquid_balance: U256) -> Result<CallBatch, RoutingError> {
        if liquid_balance.is_zero() {
            return Err(RoutingError::NothingToSupply);
        }
        let mut batch = CallBatch::new();
        batch.push(self.approve_pool(liquid_balance));
        batch.push(self.supply(liquid_balance));
        Ok(batch)
    }

    /// Redeems every receipt token back to the stablecoin.
    pub fn build_disable_earning_batch(&self) -> CallBatch {
        let mut batch = CallBatch::new();
        batch.push(self.withdraw(WITHDRAW_ALL));
        batch
    }

    /// Faucet mint of the testnet stablecoin to the owner.
    pub fn build_top_up_batch(&self, amount: U256) -> Result<CallBatch, RoutingError> {
        if amount.is_zero() {
            return Err(RoutingError::InvalidAmount(
                "top-up amount must be greater than zero".into(),
            ));
        }
        let mut batch = CallBatch::new();
        batch.push(CallDescriptor::new(
            CallKind::Mint,
            self.addresses.liquid_token,
            erc20::mint(self.owner, amount),
        ));
        Ok(batch)
    }

    fn approve_pool(&self, amount: U256) -> CallDescriptor {
        CallDescriptor::new(
            CallKind::Approve,
            self.addresses.liquid_token,
            erc20::approve(self.addresses.pool, amount),
        )
    }

    fn supply(&self, amount: U256) -> CallDescriptor {
        CallDescriptor::new(
            CallKind::Supply,
            self.addresses.pool,
            pool::supply(self.addresses.liquid_token, amount, self.owner, REFERRAL_CODE),
        )
    }

    fn withdraw(&self, amount: U256) -> CallDescriptor {
        CallDescriptor::new(
            CallKind::Withdraw,
            self.addresses.pool,
            pool::withdraw(self.addresses.liquid_token, amount, self.owner),
        )
    }
}
