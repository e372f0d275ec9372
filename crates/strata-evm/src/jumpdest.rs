//! Jump destination analysis

use crate::opcode::OpCode;
use dashmap::DashMap;
use std::sync::Arc;
use strata_primitives::H256;

/// Valid jump destinations of one piece of code.
///
/// Bit `i` is set iff byte `i` is a JUMPDEST that is not part of a PUSH
/// immediate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    bits: Vec<u64>,
    len: usize,
}

impl Bitmap {
    /// Linear scan over `code`
    pub fn analyze(code: &[u8]) -> Self {
        let mut bits = vec![0u64; (code.len() + 63) / 64];
        let mut pc = 0;
        while pc < code.len() {
            let op = OpCode(code[pc]);
            if op == OpCode::JUMPDEST {
                bits[pc / 64] |= 1 << (pc % 64);
            }
            pc += 1 + op.push_size();
        }
        Self {
            bits,
            len: code.len(),
        }
    }

    /// Whether `pc` is a valid destination
    pub fn is_set(&self, pc: usize) -> bool {
        pc < self.len && self.bits[pc / 64] & (1 << (pc % 64)) != 0
    }

    /// Number of valid destinations
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// Bitmaps memoised by code hash.
///
/// Shared by every execution of a block; entries are never removed or
/// replaced, so two threads analysing the same code race harmlessly.
#[derive(Debug, Default)]
pub struct JumpdestCache {
    entries: DashMap<H256, Arc<Bitmap>>,
}

impl JumpdestCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached bitmap for `code_hash`, computing it from `code` on a miss
    pub fn get_or_analyze(&self, code_hash: H256, code: &[u8]) -> Arc<Bitmap> {
        if let Some(bitmap) = self.entries.get(&code_hash) {
            return Arc::clone(bitmap.value());
        }
        let bitmap = Arc::new(Bitmap::analyze(code));
        Arc::clone(self.entries.entry(code_hash).or_insert(bitmap).value())
    }

    /// Number of cached bitmaps
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_jumpdest_inside_push_data() {
        // PUSH1 0x5b JUMPDEST PUSH2 0x5b5b JUMPDEST
        let code = [0x60, 0x5b, 0x5b, 0x61, 0x5b, 0x5b, 0x5b];
        let bitmap = Bitmap::analyze(&code);
        assert!(!bitmap.is_set(1));
        assert!(bitmap.is_set(2));
        assert!(!bitmap.is_set(4));
        assert!(!bitmap.is_set(5));
        assert!(bitmap.is_set(6));
        assert!(!bitmap.is_set(7));
        assert_eq!(bitmap.count(), 2);
    }

    #[test]
    fn test_truncated_push() {
        // PUSH32 with only two bytes of data
        let bitmap = Bitmap::analyze(&[0x7f, 0x5b, 0x5b]);
        assert_eq!(bitmap.count(), 0);
    }

    #[test]
    fn test_cache_is_insert_only() {
        let cache = JumpdestCache::new();
        let hash = H256::from_low_u64_be(1);
        let first = cache.get_or_analyze(hash, &[0x5b]);
        // 同一哈希不会重新分析
        let second = cache.get_or_analyze(hash, &[0x00]);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.is_set(0));
        assert_eq!(cache.len(), 1);
    }

    proptest! {
        #[test]
        fn set_bits_are_jumpdests(code in prop::collection::vec(any::<u8>(), 0..512)) {
            let bitmap = Bitmap::analyze(&code);
            for (pc, &byte) in code.iter().enumerate() {
                if bitmap.is_set(pc) {
                    prop_assert_eq!(byte, OpCode::JUMPDEST.0);
                }
            }
        }

        #[test]
        fn push_data_never_valid(prefix in prop::collection::vec(0x00u8..0x60, 0..32), size in 1usize..=32) {
            let mut code = prefix.clone();
            code.push(0x5f + size as u8);
            code.extend(std::iter::repeat(0x5b).take(size));
            let bitmap = Bitmap::analyze(&code);
            for pc in prefix.len() + 1..code.len() {
                prop_assert!(!bitmap.is_set(pc));
            }
        }
    }
}
