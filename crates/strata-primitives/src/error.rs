//! Common error types for primitives

use crate::address::AddressError;
use crate::hash::HashError;
use thiserror::Error;

/// Primitive operation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// Address error
    #[error("address error: {0}")]
    Address(#[from] AddressError),

    /// Hash error
    #[error("hash error: {0}")]
    Hash(#[from] HashError),

    /// Quantity that is neither a 0x-prefixed hex nor a decimal number
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Malformed hex byte string
    #[error("invalid bytes: {0}")]
    InvalidBytes(String),
}
