//! Value types shared by the router, the earn flow and the submission layer.
//!
//! Everything here is built fresh for one payment attempt and thrown away
//! once the batch is handed off. Nothing is persisted.

use std::fmt;

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use super::error::RoutingError;

// ---------------------------------------------------------------------------
// TokenKind
// ---------------------------------------------------------------------------

/// The two representations a sender can hold funds in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// The plain stablecoin.
    Liquid,
    /// The lending pool's receipt token, accruing interest.
    Yielding,
}

impl TokenKind {
    /// The representation a recipient with the given preference receives.
    pub fn for_preference(wants_yield: bool) -> Self {
        if wants_yield {
            TokenKind::Yielding
        } else {
            TokenKind::Liquid
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Liquid => write!(f, "liquid"),
            Self::Yielding => write!(f, "yielding"),
        }
    }
}

// ---------------------------------------------------------------------------
// BalancePair
// ---------------------------------------------------------------------------

/// A sender's holdings in both representations, in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BalancePair {
    pub liquid: U256,
    pub yielding: U256,
}

impl BalancePair {
    pub fn new(liquid: U256, yielding: U256) -> Self {
        Self { liquid, yielding }
    }

    /// Sum of both balances, clamped to `U256::MAX` on overflow.
    pub fn total(&self) -> U256 {
        self.liquid.checked_add(self.yielding).unwrap_or(U256::MAX)
    }

    /// Balance already held in `kind`.
    pub fn of(&self, kind: TokenKind) -> U256 {
        match kind {
            TokenKind::Liquid => self.liquid,
            TokenKind::Yielding => self.yielding,
        }
    }
}

// ---------------------------------------------------------------------------
// TransferRequest
// ---------------------------------------------------------------------------

/// What the sender asked for. The amount is always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    amount: U256,
    recipient: Address,
    recipient_wants_yield: bool,
}

impl TransferRequest {
    /// Fails with [`RoutingError::InvalidAmount`] for a zero amount.
    pub fn new(
        amount: U256,
        recipient: Address,
        recipient_wants_yield: bool,
    ) -> Result<Self, RoutingError> {
        if amount.is_zero() {
            return Err(RoutingError::InvalidAmount(
                "amount must be greater than zero".into(),
            ));
        }
        Ok(Self {
            amount,
            recipient,
            recipient_wants_yield,
        })
    }

    pub fn amount(&self) -> U256 {
        self.amount
    }

    pub fn recipient(&self) -> Address {
        self.recipient
    }

    pub fn recipient_wants_yield(&self) -> bool {
        self.recipient_wants_yield
    }

    pub fn target(&self) -> TokenKind {
        TokenKind::for_preference(self.recipient_wants_yield)
    }
}

// ---------------------------------------------------------------------------
// Allowance
// ---------------------------------------------------------------------------

/// On-chain approval state for `spender` moving `owner`'s tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    pub owner: Address,
    pub spender: Address,
    pub amount: U256,
}

impl Allowance {
    /// Whether the existing approval already covers `needed`.
    pub fn covers(&self, needed: U256) -> bool {
        self.amount >= needed
    }
}

// ---------------------------------------------------------------------------
// CallDescriptor / CallBatch
// ---------------------------------------------------------------------------

/// What a call does. Informational only; never sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Approve,
    Supply,
    Withdraw,
    Transfer,
    Mint,
}

impl CallKind {
    /// Calls that move funds between the liquid and yielding representations.
    pub fn is_conversion(&self) -> bool {
        matches!(self, CallKind::Supply | CallKind::Withdraw)
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Approve => "approve",
            Self::Supply => "supply",
            Self::Withdraw => "withdraw",
            Self::Transfer => "transfer",
            Self::Mint => "mint",
        };
        f.write_str(name)
    }
}

/// One contract invocation: a target and its calldata.
///
/// Fields are private so a descriptor cannot be edited after the router
/// has built it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallDescriptor {
    target: Address,
    data: Bytes,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    kind: Option<CallKind>,
}

impl CallDescriptor {
    pub fn new(kind: CallKind, target: Address, data: Bytes) -> Self {
        Self {
            target,
            data,
            kind: Some(kind),
        }
    }

    pub fn target(&self) -> Address {
        self.target
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn kind(&self) -> Option<CallKind> {
        self.kind
    }
}

/// An ordered sequence of calls, executed all-or-nothing.
///
/// Order matters: an approval has to land before the supply that spends
/// it, and a conversion before the transfer that moves its output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallBatch {
    calls: Vec<CallDescriptor>,
}

impl CallBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, call: CallDescriptor) {
        self.calls.push(call);
    }

    pub fn calls(&self) -> &[CallDescriptor] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Kinds in execution order, e.g. `[Approve, Supply, Transfer]`.
    pub fn kinds(&self) -> Vec<CallKind> {
        self.calls.iter().filter_map(|c| c.kind).collect()
    }

    /// Number of supply/withdraw calls in the batch.
    pub fn conversion_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| c.kind.map(|k| k.is_conversion()).unwrap_or(false))
            .count()
    }
}

impl IntoIterator for CallBatch {
    type Item = CallDescriptor;
    type IntoIter = std::vec::IntoIter<CallDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.calls.into_iter()
    }
}

impl<'a> IntoIterator for &'a CallBatch {
    type Item = &'a CallDescriptor;
    type IntoIter = std::slice::Iter<'a, CallDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.calls.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_amount_request_is_rejected() {
        let err = TransferRequest::new(U256::ZERO, Address::ZERO, false).unwrap_err();
        assert!(matches!(err, RoutingError::InvalidAmount(_)));
    }

    #[test]
    fn target_follows_preference() {
        let req = TransferRequest::new(U256::from(1u64), Address::ZERO, true).unwrap();
        assert_eq!(req.target(), TokenKind::Yielding);
        let req = TransferRequest::new(U256::from(1u64), Address::ZERO, false).unwrap();
        assert_eq!(req.target(), TokenKind::Liquid);
    }

    #[test]
    fn balance_total_and_lookup() {
        let b = BalancePair::new(U256::from(5u64), U256::from(10u64));
        assert_eq!(b.total(), U256::from(15u64));
        assert_eq!(b.of(TokenKind::Liquid), U256::from(5u64));
        assert_eq!(b.of(TokenKind::Yielding), U256::from(10u64));
        assert_eq!(BalancePair::new(U256::MAX, U256::from(1u64)).total(), U256::MAX);
    }

    #[test]
    fn batch_serializes_kind_in_lowercase() {
        let mut batch = CallBatch::new();
        batch.push(CallDescriptor::new(
            CallKind::Transfer,
            Address::ZERO,
            Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]),
        ));
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["calls"][0]["kind"], "transfer");
        assert_eq!(json["calls"][0]["data"], "0xa9059cbb");
    }
}
