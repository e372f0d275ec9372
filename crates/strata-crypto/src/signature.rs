//! secp256k1 signatures and public key recovery

use crate::{keccak256, CryptoError};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey};
use std::cmp::Ordering;
use strata_primitives::{Address, H256};

/// Half of the secp256k1 curve order (n/2)
const SECP256K1_N_DIV_2: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D,
    0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

/// Full secp256k1 curve order (n)
const SECP256K1_N: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B,
    0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// Private key (32 bytes)
pub type PrivateKey = SigningKey;

/// Recoverable signature, `v` is the raw recovery id (0 or 1)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// r component
    pub r: [u8; 32],
    /// s component
    pub s: [u8; 32],
    /// recovery id
    pub v: u8,
}

/// Check the scalar ranges of a signature.
///
/// `r` and `s` must lie in `[1, n-1]`; with `homestead` set `s` must also be
/// in the lower half of the order.
pub fn validate_signature_values(v: u8, r: &[u8; 32], s: &[u8; 32], homestead: bool) -> bool {
    if v > 1 {
        return false;
    }
    let zero = [0u8; 32];
    if r == &zero || s == &zero {
        return false;
    }
    if homestead && compare(s, &SECP256K1_N_DIV_2) == Ordering::Greater {
        return false;
    }
    compare(r, &SECP256K1_N) == Ordering::Less && compare(s, &SECP256K1_N) == Ordering::Less
}

fn compare(a: &[u8; 32], b: &[u8; 32]) -> Ordering {
    a.iter().cmp(b.iter())
}

/// n - s, used to fold a high-s signature into its low-s twin
fn subtract_from_n(s: &[u8; 32]) -> [u8; 32] {
    let mut result = [0u8; 32];
    let mut borrow: u16 = 0;
    for i in (0..32).rev() {
        let diff = (SECP256K1_N[i] as u16)
            .wrapping_sub(s[i] as u16)
            .wrapping_sub(borrow);
        result[i] = diff as u8;
        borrow = u16::from(diff > 255);
    }
    result
}

/// Sign a message hash, always producing a low-s signature
pub fn sign(message_hash: &H256, private_key: &PrivateKey) -> Result<Signature, CryptoError> {
    let (signature, mut recovery_id) = private_key
        .sign_prehash_recoverable(message_hash.as_bytes())
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    let r: [u8; 32] = signature.r().to_bytes().into();
    let mut s: [u8; 32] = signature.s().to_bytes().into();
    if compare(&s, &SECP256K1_N_DIV_2) == Ordering::Greater {
        s = subtract_from_n(&s);
        recovery_id = RecoveryId::try_from(recovery_id.to_byte() ^ 1)
            .map_err(|_| CryptoError::InvalidRecoveryId(recovery_id.to_byte() ^ 1))?;
    }
    Ok(Signature { r, s, v: recovery_id.to_byte() })
}

/// Recover the signer address from a message hash and signature.
///
/// High-s signatures are accepted: they are folded to low-s with the
/// recovery id flipped, which recovers the same public key.
pub fn recover_address(message_hash: &H256, signature: &Signature) -> Result<Address, CryptoError> {
    if signature.v > 1 {
        return Err(CryptoError::InvalidRecoveryId(signature.v));
    }
    let (s, v) = if compare(&signature.s, &SECP256K1_N_DIV_2) == Ordering::Greater {
        (subtract_from_n(&signature.s), signature.v ^ 1)
    } else {
        (signature.s, signature.v)
    };

    let r: k256::FieldBytes = signature.r.into();
    let s: k256::FieldBytes = s.into();
    let k256_sig = K256Signature::from_scalars(r, s)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let recovery_id = RecoveryId::try_from(v).map_err(|_| CryptoError::InvalidRecoveryId(v))?;

    let key = VerifyingKey::recover_from_prehash(message_hash.as_bytes(), &k256_sig, recovery_id)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;
    Ok(public_key_to_address(&key))
}

/// Derive the account address of a public key
pub fn public_key_to_address(public_key: &VerifyingKey) -> Address {
    let encoded = public_key.to_encoded_point(false);
    // 跳过 0x04 前缀
    let hash = keccak256(&encoded.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash.as_bytes()[12..]);
    Address::from_bytes(bytes)
}
