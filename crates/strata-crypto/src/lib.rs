//! # strata-crypto
//!
//! Cryptographic primitives for the Strata execution engine.
//!
//! - Keccak-256, SHA-256 and RIPEMD-160 hashing
//! - CREATE / CREATE2 address derivation
//! - secp256k1 signing and signer recovery

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod error;
mod hash;
mod signature;

pub use address::{create2_address, create_address};
pub use error::CryptoError;
pub use hash::{keccak256, ripemd160, sha256, KECCAK_EMPTY};
pub use signature::{
    public_key_to_address, recover_address, sign, validate_signature_values, PrivateKey, Signature,
};
