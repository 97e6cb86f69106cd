//! # Token Amounts
//!
//! Amounts are unsigned 256-bit integers in the token's minor unit. User
//! input arrives as a decimal string ("12.50") and is converted exactly,
//! digit by digit: there is no floating point anywhere between the text
//! box and the calldata.
//!
//! Parsing is strict. Signs, exponents, thousands separators and more
//! fractional digits than the token supports are all rejected rather than
//! rounded, because a silently rounded payment amount is a wrong payment
//! amount.

use alloy_primitives::U256;
use thiserror::Error;

use crate::config::TOKEN_DECIMALS;

/// Errors produced while parsing a decimal amount string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// Nothing to parse.
    #[error("amount is empty")]
    Empty,

    /// A character other than an ASCII digit or a single decimal point.
    #[error("amount is not a number: {0:?}")]
    NotNumeric(String),

    /// More fractional digits than the token can represent.
    #[error("amount {input:?} has {found} decimal places, at most {max} allowed")]
    TooPrecise {
        /// The rejected input.
        input: String,
        /// Fractional digits found.
        found: usize,
        /// Fractional digits supported by the token.
        max: u8,
    },

    /// The scaled value does not fit in 256 bits.
    #[error("amount {0:?} is too large")]
    Overflow(String),

    /// Payments must move something.
    #[error("amount must be greater than zero")]
    Zero,
}

/// Converts a decimal string into minor units with `decimals` places.
///
/// Accepts `"12"`, `"12.5"`, `".5"` and `"12."`. Surrounding whitespace is
/// ignored.
pub fn parse_units(input: &str, decimals: u8) -> Result<U256, AmountError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(AmountError::NotNumeric(s.to_string()));
    }
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) {
        return Err(AmountError::NotNumeric(s.to_string()));
    }
    if frac.len() > decimals as usize {
        return Err(AmountError::TooPrecise {
            input: s.to_string(),
            found: frac.len(),
            max: decimals,
        });
    }

    let mut digits = String::with_capacity(whole.len() + decimals as usize);
    digits.push_str(whole);
    digits.push_str(frac);
    for _ in frac.len()..decimals as usize {
        digits.push('0');
    }
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }

    U256::from_str_radix(digits, 10).map_err(|_| AmountError::Overflow(s.to_string()))
}

/// Parses a user-entered payment amount in whole tokens. Zero is rejected.
pub fn parse_payment_amount(input: &str) -> Result<U256, AmountError> {
    let value = parse_units(input, TOKEN_DECIMALS)?;
    if value.is_zero() {
        return Err(AmountError::Zero);
    }
    Ok(value)
}

/// Renders minor units as a canonical decimal string.
///
/// Trailing fractional zeros are dropped, so `12_500000` becomes `"12.5"`
/// and `3_000000` becomes `"3"`.
pub fn format_units(value: U256, decimals: u8) -> String {
    let raw = value.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return raw;
    }

    let padded = if raw.len() <= decimals {
        format!("{}{}", "0".repeat(decimals + 1 - raw.len()), raw)
    } else {
        raw
    };
    let (whole, frac) = padded.split_at(padded.len() - decimals);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, frac)
    }
}

/// Renders a token amount with exactly two decimals, truncating toward
/// zero. This is the balance display format ("$12.34").
pub fn format_usd(value: U256) -> String {
    let cents_divisor = U256::from(10u64.pow(TOKEN_DECIMALS as u32 - 2));
    let cents = value / cents_divisor;
    let hundred = U256::from(100u64);
    let whole = cents / hundred;
    let frac = cents % hundred;
    format!("{}.{:0>2}", whole, frac.to::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(v: u64) -> U256 {
        U256::from(v)
    }

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(parse_units("12", 6).unwrap(), units(12_000_000));
        assert_eq!(parse_units("12.5", 6).unwrap(), units(12_500_000));
        assert_eq!(parse_units("0.000001", 6).unwrap(), units(1));
        assert_eq!(parse_units(".5", 6).unwrap(), units(500_000));
        assert_eq!(parse_units("7.", 6).unwrap(), units(7_000_000));
        assert_eq!(parse_units("  100.25 ", 6).unwrap(), units(100_250_000));
        assert_eq!(parse_units("0", 6).unwrap(), U256::ZERO);
        assert_eq!(parse_units("000.000", 6).unwrap(), U256::ZERO);
    }

    #[test]
    fn rejects_excess_precision() {
        let err = parse_units("1.0000001", 6).unwrap_err();
        assert_eq!(
            err,
            AmountError::TooPrecise {
                input: "1.0000001".into(),
                found: 7,
                max: 6
            }
        );
    }

    #[test]
    fn rejects_non_numeric_input() {
        for bad in ["abc", "1,000", "-5", "+5", "1e6", "1.2.3", ".", "1 000", "١٢"] {
            assert!(
                matches!(parse_units(bad, 6), Err(AmountError::NotNumeric(_))),
                "{bad:?} should be rejected"
            );
        }
        assert_eq!(parse_units("   ", 6), Err(AmountError::Empty));
    }

    #[test]
    fn rejects_overflowing_input() {
        let huge = "9".repeat(80);
        assert!(matches!(parse_units(&huge, 6), Err(AmountError::Overflow(_))));
    }

    #[test]
    fn payment_amount_must_be_positive() {
        assert_eq!(parse_payment_amount("0.00"), Err(AmountError::Zero));
        assert_eq!(parse_payment_amount("50").unwrap(), units(50_000_000));
    }

    #[test]
    fn formats_canonically() {
        assert_eq!(format_units(units(12_500_000), 6), "12.5");
        assert_eq!(format_units(units(3_000_000), 6), "3");
        assert_eq!(format_units(units(1), 6), "0.000001");
        assert_eq!(format_units(U256::ZERO, 6), "0");
        assert_eq!(format_units(units(42), 0), "42");
    }

    #[test]
    fn format_then_parse_is_identity_for_typical_values() {
        for v in [1u64, 999_999, 1_000_000, 123_456_789] {
            let s = format_units(units(v), 6);
            assert_eq!(parse_units(&s, 6).unwrap(), units(v));
        }
    }

    #[test]
    fn usd_display_truncates_to_cents() {
        assert_eq!(format_usd(units(12_345_678)), "12.34");
        assert_eq!(format_usd(units(20_000_000)), "20.00");
        assert_eq!(format_usd(units(9_999)), "0.00");
        assert_eq!(format_usd(U256::ZERO), "0.00");
    }
}
