//! EVM memory and its pool

use crate::error::InternalError;
use strata_primitives::U256;

/// EVM memory (byte-addressable, expandable in 32-byte words).
///
/// Expansion is charged by the gas function before [`Memory::resize`] is
/// called, so every access through this type is expected to be in bounds.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    store: Vec<u8>,
    /// Total expansion fee charged so far
    pub(crate) last_gas_cost: u64,
}

impl Memory {
    /// Create new empty memory
    pub fn new() -> Self {
        Self::default()
    }

    fn with_buffer(mut store: Vec<u8>) -> Self {
        store.clear();
        Self {
            store,
            last_gas_cost: 0,
        }
    }

    /// Get current memory size in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether nothing has been allocated
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Grow to `size` bytes, zero filled. Never shrinks.
    pub fn resize(&mut self, size: usize) {
        if size > self.store.len() {
            self.store.resize(size, 0);
        }
    }

    fn check(&self, offset: u64, len: u64) -> Result<(usize, usize), InternalError> {
        let size = self.store.len() as u64;
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok((offset as usize, end as usize)),
            _ => Err(InternalError::MemoryOutOfBounds { offset, len, size }),
        }
    }

    /// Copy at most `len` bytes of `value` to `offset`
    pub fn set(&mut self, offset: u64, len: u64, value: &[u8]) -> Result<(), InternalError> {
        if len == 0 {
            return Ok(());
        }
        let (start, end) = self.check(offset, len)?;
        let n = value.len().min(end - start);
        self.store[start..start + n].copy_from_slice(&value[..n]);
        Ok(())
    }

    /// Write a big-endian word at `offset`
    pub fn set32(&mut self, offset: u64, value: &U256) -> Result<(), InternalError> {
        let (start, end) = self.check(offset, 32)?;
        value.to_big_endian(&mut self.store[start..end]);
        Ok(())
    }

    /// Write a single byte
    pub fn set_byte(&mut self, offset: u64, value: u8) -> Result<(), InternalError> {
        let (start, _) = self.check(offset, 1)?;
        self.store[start] = value;
        Ok(())
    }

    /// Borrow `len` bytes at `offset`
    pub fn get(&self, offset: u64, len: u64) -> Result<&[u8], InternalError> {
        if len == 0 {
            return Ok(&[]);
        }
        let (start, end) = self.check(offset, len)?;
        Ok(&self.store[start..end])
    }

    /// Copy `len` bytes at `offset`
    pub fn get_copy(&self, offset: u64, len: u64) -> Result<Vec<u8>, InternalError> {
        self.get(offset, len).map(<[u8]>::to_vec)
    }

    /// Load a 32-byte word at `offset`
    pub fn get_word(&self, offset: u64) -> Result<U256, InternalError> {
        self.get(offset, 32).map(U256::from_big_endian)
    }

    /// Get raw data slice
    pub fn data(&self) -> &[u8] {
        &self.store
    }

    fn into_buffer(self) -> Vec<u8> {
        self.store
    }
}

/// Backing buffers keyed by call depth.
///
/// A frame at depth `d` reuses the buffer released by the previous frame at
/// the same depth. Depths beyond the pool size fall back to fresh
/// allocations.
#[derive(Debug)]
pub struct MemoryPool {
    slots: Vec<Option<Vec<u8>>>,
    preallocate: usize,
}

impl MemoryPool {
    /// Pool covering depths `0..depths`, each buffer pre-sized to
    /// `preallocate` bytes of capacity
    pub fn new(depths: usize, preallocate: usize) -> Self {
        Self {
            slots: (0..depths).map(|_| None).collect(),
            preallocate,
        }
    }

    /// Empty memory for a frame at `depth`
    pub fn acquire(&mut self, depth: usize) -> Memory {
        match self.slots.get_mut(depth).and_then(Option::take) {
            Some(buffer) => Memory::with_buffer(buffer),
            None => Memory::with_buffer(Vec::with_capacity(self.preallocate)),
        }
    }

    /// Return memory of a frame at `depth`; it is zeroed before reuse
    pub fn release(&mut self, depth: usize, memory: Memory) {
        if let Some(slot) = self.slots.get_mut(depth) {
            let mut buffer = memory.into_buffer();
            buffer.clear();
            *slot = Some(buffer);
        }
    }

    /// Number of depths with a parked buffer
    pub fn idle(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_memory_resize_never_shrinks() {
        let mut mem = Memory::new();
        mem.resize(64);
        assert_eq!(mem.len(), 64);
        mem.resize(32);
        assert_eq!(mem.len(), 64);
        assert!(mem.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_memory_word_roundtrip() {
        let mut mem = Memory::new();
        mem.resize(64);
        mem.set32(16, &U256::from(0x1234)).unwrap();
        assert_eq!(mem.get_word(16).unwrap(), U256::from(0x1234));
        assert_eq!(mem.get(46, 2).unwrap(), &[0x12, 0x34]);
    }

    #[test]
    fn test_memory_bounds() {
        let mut mem = Memory::new();
        mem.resize(32);
        assert!(mem.set32(1, &U256::one()).is_err());
        assert!(mem.set_byte(32, 1).is_err());
        assert!(mem.get(u64::MAX, 2).is_err());
        // 零长度访问总是合法
        assert_eq!(mem.get(1000, 0).unwrap(), &[] as &[u8]);
        assert!(mem.set(1000, 0, &[]).is_ok());
    }

    #[test]
    fn test_memory_set_short_value() {
        let mut mem = Memory::new();
        mem.resize(32);
        mem.set(0, 4, &[1, 2]).unwrap();
        assert_eq!(mem.get(0, 4).unwrap(), &[1, 2, 0, 0]);
    }

    #[test]
    fn test_pool_reuses_by_depth() {
        let mut pool = MemoryPool::new(2, 1024);
        let mut mem = pool.acquire(1);
        mem.resize(96);
        mem.set_byte(0, 0xff).unwrap();
        pool.release(1, mem);
        assert_eq!(pool.idle(), 1);

        let mem = pool.acquire(1);
        assert!(mem.is_empty());
        assert_eq!(mem.last_gas_cost, 0);
        assert_eq!(pool.idle(), 0);

        // 超出池深度时直接分配
        let deep = pool.acquire(5);
        pool.release(5, deep);
        assert_eq!(pool.idle(), 0);
    }

    proptest! {
        #[test]
        fn resized_length_is_word_aligned(sizes in prop::collection::vec(0u64..4096, 1..16)) {
            let mut mem = Memory::new();
            for size in sizes {
                let words = crate::word::to_word_size(size);
                mem.resize((words * 32) as usize);
                prop_assert_eq!(mem.len() % 32, 0);
            }
        }
    }
}
