//! # Chain Access
//!
//! Everything that leaves the process to talk to the chain: balance and
//! allowance reads, the pool's reserve data, and atomic batch submission
//! through a smart-account wallet endpoint.
//!
//! ## Architecture
//!
//! ```text
//! traits.rs — ChainReader, BatchSubmitter, SubmissionHandle, BatchReceipt
//! rpc.rs    — JSON-RPC 2.0 envelopes and reqwest client
//! reader.rs — RpcChainReader (eth_call)
//! wallet.rs — WalletCallsSubmitter (wallet_sendCalls / wallet_getCallsStatus)
//! ```

pub mod reader;
pub mod rpc;
pub mod traits;
pub mod wallet;

pub use reader::RpcChainReader;
pub use rpc::{JsonRpcClient, RpcError, RpcErrorObject, RpcRequest, RpcResponse};
pub use traits::{BatchReceipt, BatchStatus, BatchSubmitter, ChainReader, SubmissionHandle};
pub use wallet::{SubmitterConfig, WalletCallsSubmitter};
