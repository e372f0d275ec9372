//! Call frame bound to the code it executes

use crate::jumpdest::{Bitmap, JumpdestCache};
use crate::opcode::OpCode;
use std::sync::Arc;
use strata_primitives::{Address, H256, U256};

/// Execution context of one nested invocation.
///
/// `caller`, `address`, `value` and `input` are fixed at construction; only
/// `gas` changes while the frame runs.
#[derive(Clone, Debug)]
pub struct Contract {
    /// Account that initiated the frame
    pub caller: Address,
    /// Account whose storage and balance the code operates on
    pub address: Address,
    /// Value visible to CALLVALUE
    pub value: U256,
    /// Call data
    pub input: Vec<u8>,
    /// Remaining gas
    pub gas: u64,
    /// Code being executed
    pub code: Arc<[u8]>,
    /// Hash of `code`; zero when unknown
    pub code_hash: H256,
    /// Account the code was loaded from
    pub code_address: Address,
    analysis: Option<Arc<Bitmap>>,
}

impl Contract {
    /// New frame with no code attached
    pub fn new(caller: Address, address: Address, value: U256, gas: u64) -> Self {
        Self {
            caller,
            address,
            value,
            input: Vec::new(),
            gas,
            code: Arc::from(Vec::new()),
            code_hash: H256::ZERO,
            code_address: address,
            analysis: None,
        }
    }

    /// Attach code loaded from `code_address`
    pub fn with_code(mut self, code_address: Address, code: Arc<[u8]>, code_hash: H256) -> Self {
        self.code_address = code_address;
        self.code = code;
        self.code_hash = code_hash;
        self.analysis = None;
        self
    }

    /// Attach call data
    pub fn with_input(mut self, input: Vec<u8>) -> Self {
        self.input = input;
        self
    }

    /// Opcode at `pc`, STOP past the end
    #[inline]
    pub fn get_op(&self, pc: u64) -> OpCode {
        usize::try_from(pc)
            .ok()
            .and_then(|pc| self.code.get(pc))
            .map_or(OpCode::STOP, |&b| OpCode(b))
    }

    /// Deduct `gas`; false, leaving the balance untouched, if not enough
    #[inline]
    pub fn use_gas(&mut self, gas: u64) -> bool {
        if self.gas < gas {
            return false;
        }
        self.gas -= gas;
        true
    }

    /// Whether `dest` is a JUMPDEST outside PUSH data.
    ///
    /// Code with a known hash shares its analysis through `cache`; anonymous
    /// code is analysed once per frame.
    pub fn valid_jumpdest(&mut self, dest: &U256, cache: &JumpdestCache) -> bool {
        if dest.bits() > 63 {
            return false;
        }
        let udest = dest.low_u64() as usize;
        if udest >= self.code.len() || self.code[udest] != OpCode::JUMPDEST.0 {
            return false;
        }
        let analysis = match &self.analysis {
            Some(bitmap) => Arc::clone(bitmap),
            None => {
                let bitmap = if self.code_hash.is_zero() {
                    Arc::new(Bitmap::analyze(&self.code))
                } else {
                    cache.get_or_analyze(self.code_hash, &self.code)
                };
                self.analysis = Some(Arc::clone(&bitmap));
                bitmap
            }
        };
        analysis.is_set(udest)
    }
}
