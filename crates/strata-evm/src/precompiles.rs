//! Precompiled contracts

use crate::contract::Contract;
use crate::error::{PrecompileError, VmError, VmResult};
use crate::word::to_word_size;
use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ec::pairing::Pairing;
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{BigInteger, PrimeField, Zero};
use num_bigint::BigUint;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use strata_crypto::{recover_address, ripemd160, sha256, validate_signature_values, Signature};
use strata_primitives::{Address, H256};

/// Native operation reachable at a reserved address
pub trait Precompile: Send + Sync {
    /// Gas charged before `run`
    fn required_gas(&self, input: &[u8]) -> u64;
    /// Execute on `input`
    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError>;
}

/// Address-keyed precompile registry
#[derive(Default)]
pub struct Precompiles {
    contracts: BTreeMap<Address, Box<dyn Precompile>>,
}

impl Precompiles {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// ecrecover, sha256, ripemd160, identity at 0x01..0x04
    pub fn homestead() -> Self {
        let mut set = Self::new();
        set.insert(Address::from_low_u64_be(1), Box::new(EcRecover));
        set.insert(Address::from_low_u64_be(2), Box::new(Sha256Hash));
        set.insert(Address::from_low_u64_be(3), Box::new(Ripemd160Hash));
        set.insert(Address::from_low_u64_be(4), Box::new(Identity));
        set
    }

    /// Homestead set plus modexp and the bn256 operations at 0x05..0x08
    pub fn byzantium() -> Self {
        let mut set = Self::homestead();
        set.insert(Address::from_low_u64_be(5), Box::new(ModExp));
        set.insert(Address::from_low_u64_be(6), Box::new(Bn256Add));
        set.insert(Address::from_low_u64_be(7), Box::new(Bn256ScalarMul));
        set.insert(Address::from_low_u64_be(8), Box::new(Bn256Pairing));
        set
    }

    /// Register `contract` at `address`, replacing any previous entry
    pub fn insert(&mut self, address: Address, contract: Box<dyn Precompile>) {
        self.contracts.insert(address, contract);
    }

    /// Contract at `address`
    pub fn get(&self, address: &Address) -> Option<&dyn Precompile> {
        self.contracts.get(address).map(|c| c.as_ref())
    }

    /// Whether `address` hosts a precompile
    pub fn contains(&self, address: &Address) -> bool {
        self.contracts.contains_key(address)
    }

    /// Registered addresses, ascending
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.contracts.keys()
    }

    /// Number of contracts
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

/// Precompiles active before Byzantium
pub static HOMESTEAD_PRECOMPILES: Lazy<Precompiles> = Lazy::new(Precompiles::homestead);
/// Precompiles active from Byzantium
pub static BYZANTIUM_PRECOMPILES: Lazy<Precompiles> = Lazy::new(Precompiles::byzantium);

/// Charge the required gas, then run. No work happens if the frame cannot
/// pay.
pub fn run_precompile(p: &dyn Precompile, input: &[u8], contract: &mut Contract) -> VmResult<Vec<u8>> {
    let gas = p.required_gas(input);
    if !contract.use_gas(gas) {
        return Err(VmError::OutOfGas);
    }
    p.run(input).map_err(VmError::from)
}

/// `size` bytes of `data` from `start`, zero padded on the right
fn get_data(data: &[u8], start: u64, size: u64) -> Vec<u8> {
    let len = data.len() as u64;
    let start = start.min(len);
    let end = start.saturating_add(size).min(len);
    let mut out = data[start as usize..end as usize].to_vec();
    out.resize(size as usize, 0);
    out
}

fn left_pad(bytes: &[u8], size: usize) -> Vec<u8> {
    if bytes.len() >= size {
        return bytes.to_vec();
    }
    let mut out = vec![0u8; size - bytes.len()];
    out.extend_from_slice(bytes);
    out
}

fn linear_cost(input: &[u8], base: u64, per_word: u64) -> u64 {
    to_word_size(input.len() as u64)
        .saturating_mul(per_word)
        .saturating_add(base)
}

// ==================== Hashing and recovery ====================

/// 0x01: signer recovery
pub struct EcRecover;

impl Precompile for EcRecover {
    fn required_gas(&self, _: &[u8]) -> u64 {
        3000
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        let input = get_data(input, 0, 128);
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&input[64..96]);
        s.copy_from_slice(&input[96..128]);
        let v = input[63].wrapping_sub(27);

        // 非法输入返回空，而不是报错
        if input[32..63].iter().any(|&b| b != 0) || !validate_signature_values(v, &r, &s, false) {
            return Ok(Vec::new());
        }
        let Ok(hash) = H256::from_slice(&input[..32]) else {
            return Ok(Vec::new());
        };
        match recover_address(&hash, &Signature { r, s, v }) {
            Ok(address) => Ok(left_pad(address.as_bytes(), 32)),
            Err(_) => Ok(Vec::new()),
        }
    }
}

/// 0x02: SHA-256
pub struct Sha256Hash;

impl Precompile for Sha256Hash {
    fn required_gas(&self, input: &[u8]) -> u64 {
        linear_cost(input, 60, 12)
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        Ok(sha256(input).to_vec())
    }
}

/// 0x03: RIPEMD-160, left padded to a word
pub struct Ripemd160Hash;

impl Precompile for Ripemd160Hash {
    fn required_gas(&self, input: &[u8]) -> u64 {
        linear_cost(input, 600, 120)
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        Ok(left_pad(&ripemd160(input), 32))
    }
}

/// 0x04: data copy
pub struct Identity;

impl Precompile for Identity {
    fn required_gas(&self, input: &[u8]) -> u64 {
        linear_cost(input, 15, 3)
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        Ok(input.to_vec())
    }
}

// ==================== Modular exponentiation ====================

/// 0x05: arbitrary precision modular exponentiation (EIP-198)
pub struct ModExp;

fn saturating_len(bytes: &[u8]) -> u64 {
    let value = BigUint::from_bytes_be(bytes);
    u64::try_from(value).unwrap_or(u64::MAX)
}

fn mult_complexity(x: BigUint) -> BigUint {
    if x <= BigUint::from(64u32) {
        &x * &x
    } else if x <= BigUint::from(1024u32) {
        &x * &x / 4u32 + &x * 96u32 - 3072u32
    } else {
        &x * &x / 16u32 + &x * 480u32 - 199_680u32
    }
}

impl Precompile for ModExp {
    fn required_gas(&self, input: &[u8]) -> u64 {
        let base_len = BigUint::from_bytes_be(&get_data(input, 0, 32));
        let exp_len = BigUint::from_bytes_be(&get_data(input, 32, 32));
        let mod_len = BigUint::from_bytes_be(&get_data(input, 64, 32));
        let body = input.get(96..).unwrap_or(&[]);

        // 指数的前 32 字节决定调整后的长度
        let exp_head = if BigUint::from(body.len()) <= base_len {
            BigUint::zero()
        } else {
            let start = u64::try_from(&base_len).unwrap_or(u64::MAX);
            let head_len = if exp_len > BigUint::from(32u32) {
                32
            } else {
                u64::try_from(&exp_len).unwrap_or(32)
            };
            BigUint::from_bytes_be(&get_data(body, start, head_len))
        };
        let msb = exp_head.bits().saturating_sub(1);
        let mut adj_exp_len = BigUint::zero();
        if exp_len > BigUint::from(32u32) {
            adj_exp_len = (&exp_len - 32u32) * 8u32;
        }
        adj_exp_len += msb;

        let gas = mult_complexity(base_len.max(mod_len))
            * adj_exp_len.max(BigUint::from(1u32))
            / 20u32;
        u64::try_from(gas).unwrap_or(u64::MAX)
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        let base_len = saturating_len(&get_data(input, 0, 32));
        let exp_len = saturating_len(&get_data(input, 32, 32));
        let mod_len = saturating_len(&get_data(input, 64, 32));
        let body = input.get(96..).unwrap_or(&[]);

        if base_len == 0 && mod_len == 0 {
            return Ok(Vec::new());
        }
        let base = BigUint::from_bytes_be(&get_data(body, 0, base_len));
        let exp = BigUint::from_bytes_be(&get_data(body, base_len, exp_len));
        let modulus = BigUint::from_bytes_be(&get_data(
            body,
            base_len.saturating_add(exp_len),
            mod_len,
        ));
        if modulus.is_zero() {
            return Ok(vec![0u8; mod_len as usize]);
        }
        Ok(left_pad(&base.modpow(&exp, &modulus).to_bytes_be(), mod_len as usize))
    }
}

// ==================== bn256 ====================

/// Base field modulus, big endian
const FIELD_MODULUS: [u8; 32] = [
    0x30, 0x64, 0x4e, 0x72, 0xe1, 0x31, 0xa0, 0x29,
    0xb8, 0x50, 0x45, 0xb6, 0x81, 0x81, 0x58, 0x5d,
    0x97, 0x81, 0x6a, 0x91, 0x68, 0x71, 0xca, 0x8d,
    0x3c, 0x20, 0x8c, 0x16, 0xd8, 0x7c, 0xfd, 0x47,
];

fn read_fq(bytes: &[u8]) -> Result<Fq, PrecompileError> {
    if bytes >= &FIELD_MODULUS[..] {
        return Err(PrecompileError::InvalidFieldElement);
    }
    Ok(Fq::from_be_bytes_mod_order(bytes))
}

fn read_g1(bytes: &[u8]) -> Result<G1Affine, PrecompileError> {
    let x = read_fq(&bytes[0..32])?;
    let y = read_fq(&bytes[32..64])?;
    if x.is_zero() && y.is_zero() {
        return Ok(G1Affine::zero());
    }
    let point = G1Affine::new_unchecked(x, y);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(PrecompileError::InvalidPoint);
    }
    Ok(point)
}

/// Imaginary part first, as in the Ethereum encoding
fn read_g2(bytes: &[u8]) -> Result<G2Affine, PrecompileError> {
    let x_im = read_fq(&bytes[0..32])?;
    let x_re = read_fq(&bytes[32..64])?;
    let y_im = read_fq(&bytes[64..96])?;
    let y_re = read_fq(&bytes[96..128])?;
    let x = Fq2::new(x_re, x_im);
    let y = Fq2::new(y_re, y_im);
    if x.is_zero() && y.is_zero() {
        return Ok(G2Affine::zero());
    }
    let point = G2Affine::new_unchecked(x, y);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(PrecompileError::InvalidPoint);
    }
    Ok(point)
}

fn write_fq(fq: &Fq, out: &mut [u8]) {
    let bytes = fq.into_bigint().to_bytes_be();
    out[32 - bytes.len()..].copy_from_slice(&bytes);
}

fn write_g1(point: &G1Affine) -> Vec<u8> {
    let mut out = vec![0u8; 64];
    if !point.is_zero() {
        write_fq(&point.x, &mut out[0..32]);
        write_fq(&point.y, &mut out[32..64]);
    }
    out
}

/// 0x06: G1 point addition
pub struct Bn256Add;

impl Precompile for Bn256Add {
    fn required_gas(&self, _: &[u8]) -> u64 {
        500
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        let a = read_g1(&get_data(input, 0, 64))?;
        let b = read_g1(&get_data(input, 64, 64))?;
        Ok(write_g1(&(a.into_group() + b.into_group()).into_affine()))
    }
}

/// 0x07: G1 scalar multiplication
pub struct Bn256ScalarMul;

impl Precompile for Bn256ScalarMul {
    fn required_gas(&self, _: &[u8]) -> u64 {
        40000
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        let point = read_g1(&get_data(input, 0, 64))?;
        let scalar = Fr::from_be_bytes_mod_order(&get_data(input, 64, 32));
        Ok(write_g1(&(point.into_group() * scalar).into_affine()))
    }
}

/// 0x08: pairing product check
pub struct Bn256Pairing;

impl Precompile for Bn256Pairing {
    fn required_gas(&self, input: &[u8]) -> u64 {
        100_000 + (input.len() as u64 / 192) * 80_000
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
        if input.len() % 192 != 0 {
            return Err(PrecompileError::BadPairingInput);
        }
        let mut g1s = Vec::with_capacity(input.len() / 192);
        let mut g2s = Vec::with_capacity(input.len() / 192);
        for pair in input.chunks_exact(192) {
            g1s.push(read_g1(&pair[..64])?);
            g2s.push(read_g2(&pair[64..])?);
        }
        let mut out = vec![0u8; 32];
        if g1s.is_empty() || Bn254::multi_pairing(g1s, g2s).is_zero() {
            out[31] = 1;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_crypto::{keccak256, public_key_to_address, sign, PrivateKey};
    use strata_primitives::U256;

    fn hex(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    // ==================== Registry ====================

    #[test]
    fn test_registry_sets() {
        assert_eq!(HOMESTEAD_PRECOMPILES.len(), 4);
        assert_eq!(BYZANTIUM_PRECOMPILES.len(), 8);
        assert!(!HOMESTEAD_PRECOMPILES.contains(&Address::from_low_u64_be(5)));
        assert!(BYZANTIUM_PRECOMPILES.contains(&Address::from_low_u64_be(8)));
        assert!(!BYZANTIUM_PRECOMPILES.contains(&Address::from_low_u64_be(9)));
    }

    #[test]
    fn test_run_charges_before_work() {
        let target = Address::from_low_u64_be(4);
        let mut contract = Contract::new(Address::ZERO, target, U256::zero(), 20);
        assert_eq!(run_precompile(&Identity, &[1, 2], &mut contract).unwrap(), vec![1, 2]);
        assert_eq!(contract.gas, 2);

        let mut poor = Contract::new(Address::ZERO, target, U256::zero(), 10);
        assert_eq!(run_precompile(&Identity, &[1], &mut poor), Err(VmError::OutOfGas));
        assert_eq!(poor.gas, 10);
    }

    // ==================== Hashes ====================

    #[test]
    fn test_hash_costs() {
        assert_eq!(Sha256Hash.required_gas(&[]), 60);
        assert_eq!(Sha256Hash.required_gas(&[0; 33]), 84);
        assert_eq!(Ripemd160Hash.required_gas(&[0; 32]), 720);
        assert_eq!(Identity.required_gas(&[0; 64]), 21);
    }

    #[test]
    fn test_ripemd_is_word_padded() {
        let out = Ripemd160Hash.run(b"").unwrap();
        assert_eq!(out.len(), 32);
        assert_eq!(&out[..12], &[0u8; 12]);
        assert_eq!(hex::encode(&out[12..]), "9c1185a5c5e9fc54612808977ee8f548b2258d31");
    }

    #[test]
    fn test_ecrecover() {
        let key = PrivateKey::from_slice(&[0x42; 32]).unwrap();
        let expected = public_key_to_address(key.verifying_key());
        let hash = keccak256(b"message");
        let sig = sign(&hash, &key).unwrap();

        let mut input = vec![0u8; 128];
        input[..32].copy_from_slice(hash.as_bytes());
        input[63] = sig.v + 27;
        input[64..96].copy_from_slice(&sig.r);
        input[96..128].copy_from_slice(&sig.s);
        let out = EcRecover.run(&input).unwrap();
        assert_eq!(&out[12..], expected.as_bytes());

        // v 的高位字节必须为零
        input[40] = 1;
        assert!(EcRecover.run(&input).unwrap().is_empty());
        assert!(EcRecover.run(&[]).unwrap().is_empty());
    }

    // ==================== ModExp ====================

    #[test]
    fn test_modexp() {
        // 3^5 mod 7 = 5
        let mut input = Vec::new();
        for len in [1u8, 1, 1] {
            let mut word = [0u8; 32];
            word[31] = len;
            input.extend_from_slice(&word);
        }
        input.extend_from_slice(&[3, 5, 7]);
        assert_eq!(ModExp.run(&input).unwrap(), vec![5]);
        // complexity 1, adjusted exponent length max(2, 1) = 2 → 2 / 20 = 0
        assert_eq!(ModExp.required_gas(&input), 0);
    }

    #[test]
    fn test_modexp_edge_cases() {
        assert!(ModExp.run(&[]).unwrap().is_empty());
        let mut input = vec![0u8; 96];
        input[31] = 1;
        input[95] = 2;
        input.extend_from_slice(&[9]);
        // modulus reads as zero
        assert_eq!(ModExp.run(&input).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_modexp_gas_eip198_vector() {
        let input = hex(concat!(
            "0000000000000000000000000000000000000000000000000000000000000001",
            "0000000000000000000000000000000000000000000000000000000000000020",
            "0000000000000000000000000000000000000000000000000000000000000020",
            "03",
            "fffffffffffffffffffffffffffffffffffffffffffffffffffffffefffffc2e",
            "fffffffffffffffffffffffffffffffffffffffffffffffffffffffefffffc2f",
        ));
        assert_eq!(ModExp.required_gas(&input), 13056);
        let out = ModExp.run(&input).unwrap();
        assert_eq!(out.len(), 32);
        assert_eq!(out[31], 1);
    }

    // ==================== bn256 ====================

    #[test]
    fn test_bn256_add_generator() {
        // G + G
        let mut input = vec![0u8; 128];
        input[31] = 1;
        input[63] = 2;
        input[95] = 1;
        input[127] = 2;
        let out = Bn256Add.run(&input).unwrap();
        assert_eq!(
            hex::encode(&out),
            concat!(
                "030644e72e131a029b85045b68181585d97816a916871ca8d3c208c16d87cfd3",
                "15ed738c0e0a7c92e7845f96b2ae9c0a68a6a449e3538fc7ff3ebf7a5a18a2c4",
            )
        );
        // identity + identity
        assert_eq!(Bn256Add.run(&[]).unwrap(), vec![0u8; 64]);
    }

    #[test]
    fn test_bn256_rejects_bad_input() {
        let mut off_curve = vec![0u8; 64];
        off_curve[31] = 1;
        off_curve[63] = 3;
        assert_eq!(Bn256Add.run(&off_curve), Err(PrecompileError::InvalidPoint));

        let mut too_big = vec![0xffu8; 32];
        too_big.extend_from_slice(&[0u8; 32]);
        assert_eq!(Bn256Add.run(&too_big), Err(PrecompileError::InvalidFieldElement));
    }

    #[test]
    fn test_bn256_mul_by_two_matches_add() {
        let mut input = vec![0u8; 96];
        input[31] = 1;
        input[63] = 2;
        input[95] = 2;
        let doubled = Bn256ScalarMul.run(&input).unwrap();
        let mut add = vec![0u8; 128];
        add[31] = 1;
        add[63] = 2;
        add[95] = 1;
        add[127] = 2;
        assert_eq!(doubled, Bn256Add.run(&add).unwrap());
    }

    #[test]
    fn test_bn256_pairing_sizes() {
        let mut one = vec![0u8; 32];
        one[31] = 1;
        assert_eq!(Bn256Pairing.run(&[]).unwrap(), one);
        assert_eq!(Bn256Pairing.run(&[0u8; 100]), Err(PrecompileError::BadPairingInput));
        // 全零的一对是单位元
        assert_eq!(Bn256Pairing.run(&[0u8; 192]).unwrap(), one);
        assert_eq!(Bn256Pairing.required_gas(&[0u8; 384]), 260_000);
    }
}
