//! # EVM Encoding
//!
//! Calldata for the stablecoin, its yield-bearing receipt token and the
//! lending pool. Everything the router emits goes through here.
//!
//! ```text
//! abi.rs       — selectors, static-word encoding, return-data decoding
//! contracts.rs — typed builders: erc20::{transfer, approve, ...}, pool::{supply, withdraw, ...}
//! ```

pub mod abi;
pub mod contracts;

pub use abi::{selector, AbiError};
pub use contracts::{decode_uint_return, erc20, pool};
