//! Calldata builders for the token and lending-pool functions we touch.

use alloy_primitives::{Address, Bytes, U256};

use super::abi::{decode_uint_word, encode_call, AbiError};

pub const TRANSFER: &str = "transfer(address,uint256)";
pub const APPROVE: &str = "approve(address,uint256)";
pub const BALANCE_OF: &str = "balanceOf(address)";
pub const ALLOWANCE: &str = "allowance(address,address)";
pub const MINT: &str = "mint(address,uint256)";
pub const SUPPLY: &str = "supply(address,uint256,address,uint16)";
pub const WITHDRAW: &str = "withdraw(address,uint256,address)";
pub const GET_RESERVE_DATA: &str = "getReserveData(address)";

/// ERC-20 calls. The yield-bearing receipt token is an ERC-20 as well, so
/// the same encoders serve both representations.
pub mod erc20 {
    use super::*;

    pub fn transfer(to: Address, amount: U256) -> Bytes {
        encode_call(TRANSFER, &[to.into(), amount.into()])
    }

    pub fn approve(spender: Address, amount: U256) -> Bytes {
        encode_call(APPROVE, &[spender.into(), amount.into()])
    }

    pub fn balance_of(owner: Address) -> Bytes {
        encode_call(BALANCE_OF, &[owner.into()])
    }

    pub fn allowance(owner: Address, spender: Address) -> Bytes {
        encode_call(ALLOWANCE, &[owner.into(), spender.into()])
    }

    /// Faucet mint exposed by the testnet stablecoin.
    pub fn mint(to: Address, amount: U256) -> Bytes {
        encode_call(MINT, &[to.into(), amount.into()])
    }
}

/// Lending pool calls.
pub mod pool {
    use super::*;

    pub fn supply(asset: Address, amount: U256, on_behalf_of: Address, referral_code: u16) -> Bytes {
        encode_call(
            SUPPLY,
            &[
                asset.into(),
                amount.into(),
                on_behalf_of.into(),
                referral_code.into(),
            ],
        )
    }

    pub fn withdraw(asset: Address, amount: U256, to: Address) -> Bytes {
        encode_call(WITHDRAW, &[asset.into(), amount.into(), to.into()])
    }

    pub fn get_reserve_data(asset: Address) -> Bytes {
        encode_call(GET_RESERVE_DATA, &[asset.into()])
    }

    /// Extracts `currentLiquidityRate` from `getReserveData` return data.
    ///
    /// The reserve struct starts with `configuration`, `liquidityIndex`,
    /// `currentLiquidityRate`; every field occupies a full word, so the
    /// rate is word 2.
    pub fn decode_liquidity_rate(data: &[u8]) -> Result<U256, AbiError> {
        decode_uint_word(data, 2)
    }
}

/// Decodes a function returning a single `uint256` (`balanceOf`, `allowance`).
pub fn decode_uint_return(data: &[u8]) -> Result<U256, AbiError> {
    decode_uint_word(data, 0)
}
