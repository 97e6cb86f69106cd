//! # Payment Flows
//!
//! Orchestration on top of the pure router: resolve users, read chain
//! state, route, submit, confirm, record.
//!
//! ```text
//! service.rs — PaymentService: send/quote, earn on/off, sync, top-up, balances
//! apy.rs     — ApyCache and ApyQuote
//! ```

pub mod apy;
pub mod service;

pub use apy::{ApyCache, ApyQuote, ApySource};
pub use service::{
    BatchOutcome, EarnOutcome, PaymentError, PaymentOutcome, PaymentQuote, PaymentRequest,
    PaymentService, ServiceConfig, WalletBalance,
};
