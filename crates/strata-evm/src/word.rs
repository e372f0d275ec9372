//! 256-bit word helpers
//!
//! Unsigned arithmetic wraps modulo 2^256; the signed helpers reinterpret a
//! word as two's complement.

use strata_primitives::U256;

/// Sign bit set
#[inline]
pub fn is_negative(x: &U256) -> bool {
    x.bit(255)
}

/// Two's complement negation
#[inline]
pub fn negate(x: U256) -> U256 {
    (!x).overflowing_add(U256::one()).0
}

#[inline]
fn abs(x: U256) -> U256 {
    if is_negative(&x) {
        negate(x)
    } else {
        x
    }
}

/// Boolean as word
#[inline]
pub fn from_bool(b: bool) -> U256 {
    if b {
        U256::one()
    } else {
        U256::zero()
    }
}

/// Value if it fits in 64 bits
#[inline]
pub fn to_u64(x: &U256) -> Option<u64> {
    if x.bits() <= 64 {
        Some(x.low_u64())
    } else {
        None
    }
}

/// Value clamped to `u64::MAX`
#[inline]
pub fn saturating_u64(x: &U256) -> u64 {
    to_u64(x).unwrap_or(u64::MAX)
}

/// Number of 32-byte words needed to hold `size` bytes
#[inline]
pub fn to_word_size(size: u64) -> u64 {
    if size > u64::MAX - 31 {
        return u64::MAX / 32 + 1;
    }
    (size + 31) / 32
}

/// Signed division, truncating toward zero. Division by zero yields zero.
pub fn sdiv(x: U256, y: U256) -> U256 {
    if y.is_zero() {
        return U256::zero();
    }
    let quotient = abs(x) / abs(y);
    if is_negative(&x) != is_negative(&y) {
        negate(quotient)
    } else {
        quotient
    }
}

/// Signed remainder, taking the sign of the dividend
pub fn smod(x: U256, y: U256) -> U256 {
    if y.is_zero() {
        return U256::zero();
    }
    let remainder = abs(x) % abs(y);
    if is_negative(&x) {
        negate(remainder)
    } else {
        remainder
    }
}

/// Signed less-than
pub fn slt(x: &U256, y: &U256) -> bool {
    match (is_negative(x), is_negative(y)) {
        (true, false) => true,
        (false, true) => false,
        _ => x < y,
    }
}

/// Signed greater-than
pub fn sgt(x: &U256, y: &U256) -> bool {
    slt(y, x)
}

/// Arithmetic shift right
pub fn sar(shift: U256, value: U256) -> U256 {
    let negative = is_negative(&value);
    if shift >= U256::from(256) {
        return if negative { U256::MAX } else { U256::zero() };
    }
    let n = shift.low_u64() as usize;
    if n == 0 {
        return value;
    }
    let shifted = value >> n;
    if negative {
        shifted | (U256::MAX << (256 - n))
    } else {
        shifted
    }
}

/// Sign-extend `value` from byte `back` (counted from the least
/// significant end)
pub fn signextend(back: U256, value: U256) -> U256 {
    if back >= U256::from(31) {
        return value;
    }
    let bit = back.low_u64() as usize * 8 + 7;
    let mask = (U256::one() << bit) - U256::one();
    if value.bit(bit) {
        value | !mask
    } else {
        value & mask
    }
}

/// `n`-th byte of `value` counted from the most significant end
pub fn byte(n: U256, value: U256) -> U256 {
    if n >= U256::from(32) {
        return U256::zero();
    }
    U256::from(value.byte(31 - n.low_u64() as usize))
}

/// `(x + y) % m` without intermediate overflow
pub fn addmod(x: U256, y: U256, m: U256) -> U256 {
    if m.is_zero() {
        return U256::zero();
    }
    let (sum, overflow) = x.overflowing_add(y);
    if !overflow {
        return sum % m;
    }
    let wide = primitive_types::U512::from(x) + primitive_types::U512::from(y);
    narrow(wide % primitive_types::U512::from(m))
}

/// `(x * y) % m` without intermediate overflow
pub fn mulmod(x: U256, y: U256, m: U256) -> U256 {
    if m.is_zero() {
        return U256::zero();
    }
    let wide = x.full_mul(y);
    narrow(wide % primitive_types::U512::from(m))
}

fn narrow(x: primitive_types::U512) -> U256 {
    let mut buf = [0u8; 64];
    x.to_big_endian(&mut buf);
    U256::from_big_endian(&buf[32..])
}

/// Exponentiation modulo 2^256
pub fn exp(base: U256, exponent: U256) -> U256 {
    base.overflowing_pow(exponent).0
}

/// Number of significant bytes
#[inline]
pub fn byte_len(x: &U256) -> u64 {
    (x.bits() as u64 + 7) / 8
}

/// Word as 32 big-endian bytes
#[inline]
pub fn to_bytes(x: &U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    x.to_big_endian(&mut buf);
    buf
}
