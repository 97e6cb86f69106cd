// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # YieldPay Protocol — Core Library
//!
//! Peer-to-peer stablecoin payments where the recipient decides how they
//! want to be paid: in the plain stablecoin, or in a lending pool's
//! interest-bearing receipt token. The sender may hold either or both.
//! This crate works out which calls are needed to make that happen and
//! submits them as one atomic batch from the sender's smart account.
//!
//! ## Architecture
//!
//! - **config** — Protocol constants, default contract addresses.
//! - **amount** — Exact decimal ↔ minor-unit conversion. No floats.
//! - **evm** — ABI encoding for the ERC-20 and lending pool calls we emit.
//! - **routing** — The pure router: balances in, ordered call batch out.
//! - **chain** — Chain reads and atomic batch submission over JSON-RPC.
//! - **storage** — Profiles and the payment ledger on sled.
//! - **payment** — End-to-end flows tying the above together.
//!
//! ## Design Philosophy
//!
//! 1. The router never touches the network. Everything it decides is a
//!    function of values read beforehand.
//! 2. A batch lands whole or not at all. No compensation logic.
//! 3. Nothing is recorded off-chain until the chain says it happened.

pub mod amount;
pub mod chain;
pub mod config;
pub mod evm;
pub mod payment;
pub mod routing;
pub mod storage;
