//! # Payment Routing
//!
//! Turns "send X to Bob" into an ordered, atomic batch of contract calls.
//! A recipient can opt into earning yield, in which case they are paid in
//! the lending pool's receipt token instead of the plain stablecoin. The
//! sender may hold either or both, so a payment sometimes has to convert
//! part of the sender's funds before transferring.
//!
//! ## Architecture
//!
//! ```text
//! types.rs  — BalancePair, TransferRequest, Allowance, CallDescriptor, CallBatch
//! router.rs — PaymentRouter: transfer, earn on/off and top-up batches
//! earn.rs   — earning threshold, RAY rate → APY conversion
//! error.rs  — RoutingError
//! ```
//!
//! ## Design Decisions
//!
//! - The router is pure. Balance and allowance reads happen before it is
//!   called, so the decision logic is testable without a chain.
//! - Conversions move exactly the shortfall, never the full amount.
//! - An approval is emitted only when the current allowance is too small.
//! - Atomicity is the submission layer's job. The router has no
//!   compensation logic because a batch either lands whole or not at all.

pub mod earn;
pub mod error;
pub mod router;
pub mod types;

pub use earn::{apy_basis_points, format_apy, is_earning};
pub use error::RoutingError;
pub use router::PaymentRouter;
pub use types::{
    Allowance, BalancePair, CallBatch, CallDescriptor, CallKind, TokenKind, TransferRequest,
};
