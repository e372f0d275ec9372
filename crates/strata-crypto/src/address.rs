//! Contract address derivation

use crate::keccak256;
use rlp::RlpStream;
use strata_primitives::{Address, H256};

/// Address of a contract created by `sender` with the given account nonce:
/// `keccak256(rlp([sender, nonce]))[12..]`
pub fn create_address(sender: &Address, nonce: u64) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(&sender.as_bytes().to_vec());
    stream.append(&nonce);
    let hash = keccak256(&stream.out());
    address_from_hash(&hash)
}

/// Address of a CREATE2 contract:
/// `keccak256(0xff ++ sender ++ salt ++ keccak256(init_code))[12..]`
pub fn create2_address(sender: &Address, salt: &H256, init_code_hash: &H256) -> Address {
    let mut buf = [0u8; 1 + 20 + 32 + 32];
    buf[0] = 0xff;
    buf[1..21].copy_from_slice(sender.as_bytes());
    buf[21..53].copy_from_slice(salt.as_bytes());
    buf[53..].copy_from_slice(init_code_hash.as_bytes());
    address_from_hash(&keccak256(&buf))
}

fn address_from_hash(hash: &H256) -> Address {
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash.as_bytes()[12..]);
    Address::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::from_hex(s).unwrap()
    }

    #[test]
    fn test_create_address_sequence() {
        let sender = addr("0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0");
        assert_eq!(
            create_address(&sender, 0),
            addr("0xcd234a471b72ba2f1ccf0a70fcaba648a5eecd8d")
        );
        assert_eq!(
            create_address(&sender, 1),
            addr("0x343c43a37d37dff08ae8c4a11544c718abb4fcf8")
        );
        assert_eq!(
            create_address(&sender, 2),
            addr("0xf778b86fa74e846c4f0a1fbd1335fe81c00a0c91")
        );
    }

    // ==================== EIP-1014 examples ====================

    #[test]
    fn test_create2_zero_sender() {
        let hash = keccak256(&[0x00]);
        assert_eq!(
            create2_address(&Address::ZERO, &H256::ZERO, &hash),
            addr("0x4d1a2e2bb4f88f0250f26ffff098b0b30b26bf38")
        );
    }

    #[test]
    fn test_create2_with_salt() {
        let sender = addr("0xdeadbeef00000000000000000000000000000000");
        let salt =
            H256::from_hex("0x000000000000000000000000feed000000000000000000000000000000000000")
                .unwrap();
        assert_eq!(
            create2_address(&sender, &salt, &keccak256(&[0x00])),
            addr("0xd04116cdd17bebe565eb2422f2497e06cc1c9833")
        );
    }

    #[test]
    fn test_create2_with_code() {
        let sender = addr("0x00000000000000000000000000000000deadbeef");
        let salt = H256::from_low_u64_be(0xcafebabe);
        assert_eq!(
            create2_address(&sender, &salt, &keccak256(&[0xde, 0xad, 0xbe, 0xef])),
            addr("0x60f3f640a8508fc6a86d45df051962668e1e8ac7")
        );
    }
}
