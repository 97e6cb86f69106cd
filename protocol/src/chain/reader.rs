//! `eth_call`-backed [`ChainReader`].

use std::time::Duration;

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;

use super::rpc::{JsonRpcClient, RpcError};
use super::traits::ChainReader;
use crate::evm::abi::decode_hex;
use crate::evm::{decode_uint_return, erc20, pool};
use crate::routing::RoutingError;

/// Reads token and pool state from a chain node over JSON-RPC.
#[derive(Debug)]
pub struct RpcChainReader {
    client: JsonRpcClient,
}

impl RpcChainReader {
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        Ok(Self {
            client: JsonRpcClient::new(rpc_url, timeout)?,
        })
    }

    pub fn from_client(client: JsonRpcClient) -> Self {
        Self { client }
    }

    /// `eth_call` against the latest block, returning raw return data.
    pub async fn eth_call(&self, to: Address, data: &Bytes) -> Result<Vec<u8>, RoutingError> {
        let params = serde_json::json!([{ "to": to, "data": data }, "latest"]);
        let raw: String = self.client.call("eth_call", params).await?;
        Ok(decode_hex(&raw)?)
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, RoutingError> {
        let out = self.eth_call(token, &erc20::balance_of(owner)).await?;
        Ok(decode_uint_return(&out)?)
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, RoutingError> {
        let out = self.eth_call(token, &erc20::allowance(owner, spender)).await?;
        Ok(decode_uint_return(&out)?)
    }

    async fn liquidity_rate(&self, pool_addr: Address, asset: Address) -> Result<U256, RoutingError> {
        let out = self.eth_call(pool_addr, &pool::get_reserve_data(asset)).await?;
        Ok(pool::decode_liquidity_rate(&out)?)
    }
}
