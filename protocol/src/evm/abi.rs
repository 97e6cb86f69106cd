//! Minimal Solidity ABI encoding for the handful of functions we call.
//!
//! Every argument we pass is a static type (`address`, `uint256`,
//! `uint16`), so calldata is simply the 4-byte selector followed by one
//! 32-byte big-endian word per argument. No dynamic types, no offsets.

use alloy_primitives::{Address, Bytes, U256};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Size of one ABI word.
pub const WORD: usize = 32;

/// Errors decoding return data from `eth_call`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    /// Return data shorter than the word we wanted to read.
    #[error("return data too short: need {needed} bytes, got {got}")]
    TooShort {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        got: usize,
    },

    /// Return data that is not valid hex.
    #[error("return data is not hex: {0}")]
    InvalidHex(String),
}

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// A single ABI argument. Only the static types this crate needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(U256),
}

impl Token {
    fn word(&self) -> [u8; WORD] {
        match self {
            Token::Address(addr) => {
                let mut w = [0u8; WORD];
                w[12..].copy_from_slice(addr.as_slice());
                w
            }
            Token::Uint(v) => v.to_be_bytes::<WORD>(),
        }
    }
}

impl From<Address> for Token {
    fn from(a: Address) -> Self {
        Token::Address(a)
    }
}

impl From<U256> for Token {
    fn from(v: U256) -> Self {
        Token::Uint(v)
    }
}

impl From<u16> for Token {
    fn from(v: u16) -> Self {
        Token::Uint(U256::from(v))
    }
}

/// Encodes a call: selector of `signature` followed by the argument words.
pub fn encode_call(signature: &str, args: &[Token]) -> Bytes {
    let mut buf = Vec::with_capacity(4 + args.len() * WORD);
    buf.extend_from_slice(&selector(signature));
    for arg in args {
        buf.extend_from_slice(&arg.word());
    }
    Bytes::from(buf)
}

/// Reads the `index`-th 32-byte word of `data` as a `uint256`.
pub fn decode_uint_word(data: &[u8], index: usize) -> Result<U256, AbiError> {
    let start = index * WORD;
    let end = start + WORD;
    if data.len() < end {
        return Err(AbiError::TooShort {
            needed: end,
            got: data.len(),
        });
    }
    Ok(U256::from_be_slice(&data[start..end]))
}

/// Decodes a `0x`-prefixed hex string as returned by `eth_call`.
pub fn decode_hex(data: &str) -> Result<Vec<u8>, AbiError> {
    let stripped = data.strip_prefix("0x").unwrap_or(data);
    hex::decode(stripped).map_err(|e| AbiError::InvalidHex(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn well_known_selectors() {
        // These are the canonical ERC-20 selectors every block explorer shows.
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(selector("approve(address,uint256)"), [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(selector("balanceOf(address)"), [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(selector("allowance(address,address)"), [0xdd, 0x62, 0xed, 0x3e]);
    }

    #[test]
    fn address_is_left_padded() {
        let addr = address!("00000000000000000000000000000000000000ff");
        let data = encode_call("balanceOf(address)", &[addr.into()]);
        assert_eq!(data.len(), 4 + WORD);
        assert!(data[4..4 + 31].iter().all(|b| *b == 0));
        assert_eq!(data[4 + 31], 0xff);
    }

    #[test]
    fn uint_is_big_endian() {
        let data = encode_call("f(uint256)", &[U256::from(0x0102u64).into()]);
        assert_eq!(data[4 + 30], 0x01);
        assert_eq!(data[4 + 31], 0x02);
    }

    #[test]
    fn decode_word_bounds() {
        let mut data = vec![0u8; 64];
        data[63] = 7;
        assert_eq!(decode_uint_word(&data, 1).unwrap(), U256::from(7u64));
        assert_eq!(
            decode_uint_word(&data, 2).unwrap_err(),
            AbiError::TooShort { needed: 96, got: 64 }
        );
    }

    #[test]
    fn decode_hex_accepts_prefix() {
        assert_eq!(decode_hex("0x0a0b").unwrap(), vec![0x0a, 0x0b]);
        assert_eq!(decode_hex("0a0b").unwrap(), vec![0x0a, 0x0b]);
        assert!(decode_hex("0xzz").is_err());
    }
}
