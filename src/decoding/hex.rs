//! Decoding of hex-encoded JSON-RPC quantities.
//!
//! Empty input and input without the `0x` marker decode to zero. Only a
//! prefixed string carrying non-hex digits is an error.

use std::fmt;

use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Fractional digits of an 18-decimal token amount (wei → ether).
pub const WEI_DECIMALS: u8 = 18;

/// Largest power of ten representable in a U256.
const MAX_FRACTIONAL_DIGITS: u8 = 77;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HexError {
    #[error("malformed hex quantity: {0:?}")]
    Malformed(String),

    #[error("hex quantity {input:?} does not fit in {target}")]
    Overflow { input: String, target: &'static str },
}

fn strip_marker(input: &str) -> Option<&str> {
    input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
}

/// Decodes a hex quantity into a 256-bit integer.
pub fn decode_int(input: &str) -> Result<U256, HexError> {
    let Some(digits) = strip_marker(input) else {
        return Ok(U256::ZERO);
    };

    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(HexError::Malformed(input.to_string()));
    }

    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return Ok(U256::ZERO);
    }
    if significant.len() > 64 {
        return Err(HexError::Overflow {
            input: input.to_string(),
            target: "u256",
        });
    }

    U256::from_str_radix(significant, 16).map_err(|_| HexError::Overflow {
        input: input.to_string(),
        target: "u256",
    })
}

/// Same as [`decode_int`] for fields the node may omit.
pub fn decode_opt_int(input: Option<&str>) -> Result<U256, HexError> {
    input.map_or(Ok(U256::ZERO), decode_int)
}

/// Decodes a quantity that must fit in 64 bits (gas, sizes, block numbers).
pub fn decode_u64(input: &str) -> Result<u64, HexError> {
    let value = decode_int(input)?;
    u64::try_from(value).map_err(|_| HexError::Overflow {
        input: input.to_string(),
        target: "u64",
    })
}

pub fn decode_opt_u64(input: Option<&str>) -> Result<u64, HexError> {
    input.map_or(Ok(0), decode_u64)
}

/// Re-encodes an integer as a lowercase, minimal `0x` quantity.
pub fn encode_int(value: U256) -> String {
    format!("0x{value:x}")
}

/// An exact decimal: `mantissa * 10^-scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedPoint {
    mantissa: U256,
    scale: u8,
}

impl FixedPoint {
    pub fn new(mantissa: U256, scale: u8) -> Result<Self, HexError> {
        if scale > MAX_FRACTIONAL_DIGITS {
            return Err(HexError::Overflow {
                input: mantissa.to_string(),
                target: "fixed-point scale",
            });
        }
        Ok(Self { mantissa, scale })
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        // scale <= 77 is enforced by the constructor, so the power fits
        let divisor = U256::from(10u64).pow(U256::from(self.scale));
        let whole = self.mantissa / divisor;
        let fraction = self.mantissa % divisor;
        write!(
            f,
            "{}.{:0>width$}",
            whole,
            fraction.to_string(),
            width = self.scale as usize
        )
    }
}

/// Decodes a hex quantity and scales it by `10^-fractional_digits`.
pub fn decode_fixed_point(input: &str, fractional_digits: u8) -> Result<FixedPoint, HexError> {
    FixedPoint::new(decode_int(input)?, fractional_digits)
}

/// Decodes a hex quantity of Unix seconds into a UTC instant.
pub fn decode_timestamp(input: &str) -> Result<DateTime<Utc>, HexError> {
    let seconds = decode_u64(input)?;
    i64::try_from(seconds)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .ok_or_else(|| HexError::Overflow {
            input: input.to_string(),
            target: "timestamp",
        })
}
