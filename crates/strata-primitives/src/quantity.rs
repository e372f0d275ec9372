//! Textual quantities and byte strings as they appear in fixtures and configs

use crate::error::PrimitiveError;
use primitive_types::U256;

/// Parse a `0x`-prefixed hex or plain decimal number into a word.
///
/// An empty string is zero.
pub fn parse_u256(s: &str) -> Result<U256, PrimitiveError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(U256::zero());
    }
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some("") => Ok(U256::zero()),
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|_| ()),
        None => U256::from_dec_str(s).map_err(|_| ()),
    };
    parsed.map_err(|_| PrimitiveError::InvalidQuantity(s.to_string()))
}

/// Parse a hex byte string, `0x` prefix optional
pub fn parse_bytes(s: &str) -> Result<Vec<u8>, PrimitiveError> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).map_err(|e| PrimitiveError::InvalidBytes(e.to_string()))
}
