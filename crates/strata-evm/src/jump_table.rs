//! Instruction dispatch tables

use crate::error::{VmError, VmResult};
use crate::evm::Evm;
use crate::gas::{self, cost};
use crate::instructions::*;
use crate::interpreter::Frame;
use crate::opcode::OpCode;
use crate::stack::{Stack, STACK_LIMIT};
use once_cell::sync::Lazy;
use std::ops::Index;
use strata_primitives::U256;

pub(crate) type ExecutionFn = fn(&mut Evm<'_>, &mut Frame<'_>) -> VmResult<Vec<u8>>;
pub(crate) type GasFn = fn(&mut Evm<'_>, &mut Frame<'_>, u64) -> VmResult<u64>;
pub(crate) type MemorySizeFn = fn(&Stack) -> VmResult<u64>;

/// Dispatch entry of one opcode
#[derive(Clone, Copy)]
pub struct Operation {
    pub(crate) execute: ExecutionFn,
    pub(crate) constant_gas: u64,
    pub(crate) dynamic_gas: Option<GasFn>,
    /// Items the instruction pops
    pub(crate) min_stack: usize,
    /// Largest stack size that leaves room for what it pushes
    pub(crate) max_stack: usize,
    pub(crate) memory_size: Option<MemorySizeFn>,
    pub(crate) halts: bool,
    pub(crate) jumps: bool,
    pub(crate) writes: bool,
    pub(crate) reverts: bool,
    pub(crate) returns: bool,
    pub(crate) valid: bool,
}

impl Operation {
    const INVALID: Operation = Operation {
        execute: op_stop,
        constant_gas: 0,
        dynamic_gas: None,
        min_stack: 0,
        max_stack: STACK_LIMIT,
        memory_size: None,
        halts: false,
        jumps: false,
        writes: false,
        reverts: false,
        returns: false,
        valid: false,
    };

    /// Whether the opcode exists in this table
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

const fn op(execute: ExecutionFn, constant_gas: u64, pops: usize, pushes: usize) -> Operation {
    Operation {
        execute,
        constant_gas,
        min_stack: pops,
        max_stack: STACK_LIMIT + pops - pushes,
        valid: true,
        ..Operation::INVALID
    }
}

/// Dispatch table indexed by opcode byte
#[derive(Clone)]
pub struct JumpTable([Operation; 256]);

impl JumpTable {
    fn set(&mut self, opcode: OpCode, operation: Operation) {
        self.0[opcode.0 as usize] = operation;
    }

    /// Number of defined opcodes
    pub fn defined(&self) -> usize {
        self.0.iter().filter(|o| o.valid).count()
    }
}

impl Index<OpCode> for JumpTable {
    type Output = Operation;

    #[inline]
    fn index(&self, opcode: OpCode) -> &Operation {
        &self.0[opcode.0 as usize]
    }
}

/// Frontier instructions
pub static FRONTIER_INSTRUCTION_SET: Lazy<JumpTable> = Lazy::new(new_frontier_instruction_set);
/// Frontier plus DELEGATECALL
pub static HOMESTEAD_INSTRUCTION_SET: Lazy<JumpTable> = Lazy::new(new_homestead_instruction_set);
/// Homestead plus STATICCALL, return data and REVERT
pub static BYZANTIUM_INSTRUCTION_SET: Lazy<JumpTable> = Lazy::new(new_byzantium_instruction_set);
/// Byzantium plus shifts, EXTCODEHASH and CREATE2
pub static CONSTANTINOPLE_INSTRUCTION_SET: Lazy<JumpTable> =
    Lazy::new(new_constantinople_instruction_set);

fn new_constantinople_instruction_set() -> JumpTable {
    let mut t = new_byzantium_instruction_set();
    t.set(OpCode::SHL, op(op_shl, cost::FASTEST, 2, 1));
    t.set(OpCode::SHR, op(op_shr, cost::FASTEST, 2, 1));
    t.set(OpCode::SAR, op(op_sar, cost::FASTEST, 2, 1));
    t.set(
        OpCode::EXTCODEHASH,
        Operation {
            dynamic_gas: Some(gas::gas_ext_code_hash),
            ..op(op_ext_code_hash, 0, 1, 1)
        },
    );
    t.set(
        OpCode::CREATE2,
        Operation {
            dynamic_gas: Some(gas::gas_create2),
            memory_size: Some(memory_create2),
            writes: true,
            returns: true,
            ..op(op_create2, 0, 4, 1)
        },
    );
    t
}

fn new_byzantium_instruction_set() -> JumpTable {
    let mut t = new_homestead_instruction_set();
    t.set(
        OpCode::STATICCALL,
        Operation {
            dynamic_gas: Some(gas::gas_call_no_value),
            memory_size: Some(memory_delegate_call),
            returns: true,
            ..op(op_static_call, 0, 6, 1)
        },
    );
    t.set(OpCode::RETURNDATASIZE, op(op_return_data_size, cost::QUICK, 0, 1));
    t.set(
        OpCode::RETURNDATACOPY,
        Operation {
            dynamic_gas: Some(gas::gas_copy),
            memory_size: Some(memory_copy),
            ..op(op_return_data_copy, cost::FASTEST, 3, 0)
        },
    );
    t.set(
        OpCode::REVERT,
        Operation {
            dynamic_gas: Some(gas::gas_memory),
            memory_size: Some(memory_return),
            reverts: true,
            returns: true,
            ..op(op_revert, 0, 2, 0)
        },
    );
    t
}

fn new_homestead_instruction_set() -> JumpTable {
    let mut t = new_frontier_instruction_set();
    t.set(
        OpCode::DELEGATECALL,
        Operation {
            dynamic_gas: Some(gas::gas_call_no_value),
            memory_size: Some(memory_delegate_call),
            returns: true,
            ..op(op_delegate_call, 0, 6, 1)
        },
    );
    t
}

fn new_frontier_instruction_set() -> JumpTable {
    let mut t = JumpTable([Operation::INVALID; 256]);

    // 0x00 range
    t.set(OpCode::STOP, Operation { halts: true, ..op(op_stop, cost::ZERO, 0, 0) });
    t.set(OpCode::ADD, op(op_add, cost::FASTEST, 2, 1));
    t.set(OpCode::MUL, op(op_mul, cost::FAST, 2, 1));
    t.set(OpCode::SUB, op(op_sub, cost::FASTEST, 2, 1));
    t.set(OpCode::DIV, op(op_div, cost::FAST, 2, 1));
    t.set(OpCode::SDIV, op(op_sdiv, cost::FAST, 2, 1));
    t.set(OpCode::MOD, op(op_mod, cost::FAST, 2, 1));
    t.set(OpCode::SMOD, op(op_smod, cost::FAST, 2, 1));
    t.set(OpCode::ADDMOD, op(op_addmod, cost::MID, 3, 1));
    t.set(OpCode::MULMOD, op(op_mulmod, cost::MID, 3, 1));
    t.set(
        OpCode::EXP,
        Operation {
            dynamic_gas: Some(gas::gas_exp),
            ..op(op_exp, 0, 2, 1)
        },
    );
    t.set(OpCode::SIGNEXTEND, op(op_signextend, cost::FAST, 2, 1));

    // 0x10 range
    t.set(OpCode::LT, op(op_lt, cost::FASTEST, 2, 1));
    t.set(OpCode::GT, op(op_gt, cost::FASTEST, 2, 1));
    t.set(OpCode::SLT, op(op_slt, cost::FASTEST, 2, 1));
    t.set(OpCode::SGT, op(op_sgt, cost::FASTEST, 2, 1));
    t.set(OpCode::EQ, op(op_eq, cost::FASTEST, 2, 1));
    t.set(OpCode::ISZERO, op(op_iszero, cost::FASTEST, 1, 1));
    t.set(OpCode::AND, op(op_and, cost::FASTEST, 2, 1));
    t.set(OpCode::OR, op(op_or, cost::FASTEST, 2, 1));
    t.set(OpCode::XOR, op(op_xor, cost::FASTEST, 2, 1));
    t.set(OpCode::NOT, op(op_not, cost::FASTEST, 1, 1));
    t.set(OpCode::BYTE, op(op_byte, cost::FASTEST, 2, 1));

    t.set(
        OpCode::SHA3,
        Operation {
            dynamic_gas: Some(gas::gas_sha3),
            memory_size: Some(memory_sha3),
            ..op(op_sha3, cost::SHA3, 2, 1)
        },
    );

    // 0x30 range
    t.set(OpCode::ADDRESS, op(op_address, cost::QUICK, 0, 1));
    t.set(
        OpCode::BALANCE,
        Operation {
            dynamic_gas: Some(gas::gas_balance),
            ..op(op_balance, 0, 1, 1)
        },
    );
    t.set(OpCode::ORIGIN, op(op_origin, cost::QUICK, 0, 1));
    t.set(OpCode::CALLER, op(op_caller, cost::QUICK, 0, 1));
    t.set(OpCode::CALLVALUE, op(op_call_value, cost::QUICK, 0, 1));
    t.set(OpCode::CALLDATALOAD, op(op_call_data_load, cost::FASTEST, 1, 1));
    t.set(OpCode::CALLDATASIZE, op(op_call_data_size, cost::QUICK, 0, 1));
    t.set(
        OpCode::CALLDATACOPY,
        Operation {
            dynamic_gas: Some(gas::gas_copy),
            memory_size: Some(memory_copy),
            ..op(op_call_data_copy, cost::FASTEST, 3, 0)
        },
    );
    t.set(OpCode::CODESIZE, op(op_code_size, cost::QUICK, 0, 1));
    t.set(
        OpCode::CODECOPY,
        Operation {
            dynamic_gas: Some(gas::gas_copy),
            memory_size: Some(memory_copy),
            ..op(op_code_copy, cost::FASTEST, 3, 0)
        },
    );
    t.set(OpCode::GASPRICE, op(op_gas_price, cost::QUICK, 0, 1));
    t.set(
        OpCode::EXTCODESIZE,
        Operation {
            dynamic_gas: Some(gas::gas_ext_code_size),
            ..op(op_ext_code_size, 0, 1, 1)
        },
    );
    t.set(
        OpCode::EXTCODECOPY,
        Operation {
            dynamic_gas: Some(gas::gas_ext_code_copy),
            memory_size: Some(memory_ext_code_copy),
            ..op(op_ext_code_copy, 0, 4, 0)
        },
    );

    // 0x40 range
    t.set(OpCode::BLOCKHASH, op(op_blockhash, cost::EXT, 1, 1));
    t.set(OpCode::COINBASE, op(op_coinbase, cost::QUICK, 0, 1));
    t.set(OpCode::TIMESTAMP, op(op_timestamp, cost::QUICK, 0, 1));
    t.set(OpCode::NUMBER, op(op_number, cost::QUICK, 0, 1));
    t.set(OpCode::DIFFICULTY, op(op_difficulty, cost::QUICK, 0, 1));
    t.set(OpCode::GASLIMIT, op(op_gas_limit, cost::QUICK, 0, 1));

    // 0x50 range
    t.set(OpCode::POP, op(op_pop, cost::QUICK, 1, 0));
    t.set(
        OpCode::MLOAD,
        Operation {
            dynamic_gas: Some(gas::gas_memory),
            memory_size: Some(memory_mload),
            ..op(op_mload, cost::FASTEST, 1, 1)
        },
    );
    t.set(
        OpCode::MSTORE,
        Operation {
            dynamic_gas: Some(gas::gas_memory),
            memory_size: Some(memory_mstore),
            ..op(op_mstore, cost::FASTEST, 2, 0)
        },
    );
    t.set(
        OpCode::MSTORE8,
        Operation {
            dynamic_gas: Some(gas::gas_memory),
            memory_size: Some(memory_mstore8),
            ..op(op_mstore8, cost::FASTEST, 2, 0)
        },
    );
    t.set(
        OpCode::SLOAD,
        Operation {
            dynamic_gas: Some(gas::gas_sload),
            ..op(op_sload, 0, 1, 1)
        },
    );
    t.set(
        OpCode::SSTORE,
        Operation {
            dynamic_gas: Some(gas::gas_sstore),
            writes: true,
            ..op(op_sstore, 0, 2, 0)
        },
    );
    t.set(OpCode::JUMP, Operation { jumps: true, ..op(op_jump, cost::MID, 1, 0) });
    t.set(OpCode::JUMPI, Operation { jumps: true, ..op(op_jumpi, cost::SLOW, 2, 0) });
    t.set(OpCode::PC, op(op_pc, cost::QUICK, 0, 1));
    t.set(OpCode::MSIZE, op(op_msize, cost::QUICK, 0, 1));
    t.set(OpCode::GAS, op(op_gas, cost::QUICK, 0, 1));
    t.set(OpCode::JUMPDEST, op(op_jumpdest, cost::JUMPDEST, 0, 0));

    // 0x60 - 0x9f
    for n in 0..32u8 {
        t.set(OpCode(OpCode::PUSH1.0 + n), op(op_push, cost::FASTEST, 0, 1));
    }
    for n in 0..16u8 {
        let depth = n as usize + 1;
        t.set(OpCode(OpCode::DUP1.0 + n), op(op_dup, cost::FASTEST, depth, depth + 1));
        t.set(OpCode(OpCode::SWAP1.0 + n), op(op_swap, cost::FASTEST, depth + 1, depth + 1));
    }

    // 0xa0 range
    let log_gas: [GasFn; 5] = [
        gas::gas_log::<0>,
        gas::gas_log::<1>,
        gas::gas_log::<2>,
        gas::gas_log::<3>,
        gas::gas_log::<4>,
    ];
    for (n, gas_fn) in log_gas.into_iter().enumerate() {
        t.set(
            OpCode(OpCode::LOG0.0 + n as u8),
            Operation {
                dynamic_gas: Some(gas_fn),
                memory_size: Some(memory_log),
                writes: true,
                ..op(op_log, 0, n + 2, 0)
            },
        );
    }

    // 0xf0 range
    t.set(
        OpCode::CREATE,
        Operation {
            dynamic_gas: Some(gas::gas_create),
            memory_size: Some(memory_create),
            writes: true,
            returns: true,
            ..op(op_create, 0, 3, 1)
        },
    );
    t.set(
        OpCode::CALL,
        Operation {
            dynamic_gas: Some(gas::gas_call),
            memory_size: Some(memory_call),
            returns: true,
            ..op(op_call, 0, 7, 1)
        },
    );
    t.set(
        OpCode::CALLCODE,
        Operation {
            dynamic_gas: Some(gas::gas_call_code),
            memory_size: Some(memory_call),
            returns: true,
            ..op(op_call_code, 0, 7, 1)
        },
    );
    t.set(
        OpCode::RETURN,
        Operation {
            dynamic_gas: Some(gas::gas_memory),
            memory_size: Some(memory_return),
            halts: true,
            ..op(op_return, 0, 2, 0)
        },
    );
    t.set(
        OpCode::SELFDESTRUCT,
        Operation {
            dynamic_gas: Some(gas::gas_selfdestruct),
            halts: true,
            writes: true,
            ..op(op_selfdestruct, 0, 1, 0)
        },
    );
    t
}

// ==================== Memory size functions ====================
//
// Each returns the byte size (unrounded) the instruction needs memory to
// cover, computed from operands still on the stack.

fn calc_mem_size(offset: &U256, len: &U256) -> VmResult<u64> {
    if len.is_zero() {
        return Ok(0);
    }
    let (end, overflow) = offset.overflowing_add(*len);
    if overflow || end.bits() > 64 {
        return Err(VmError::GasUintOverflow);
    }
    Ok(end.low_u64())
}

fn mem_at(stack: &Stack, offset: usize, len: usize) -> VmResult<u64> {
    calc_mem_size(stack.peek(offset)?, stack.peek(len)?)
}

fn memory_sha3(stack: &Stack) -> VmResult<u64> {
    mem_at(stack, 0, 1)
}

/// CALLDATACOPY, CODECOPY and RETURNDATACOPY
fn memory_copy(stack: &Stack) -> VmResult<u64> {
    mem_at(stack, 0, 2)
}

fn memory_ext_code_copy(stack: &Stack) -> VmResult<u64> {
    mem_at(stack, 1, 3)
}

fn memory_mload(stack: &Stack) -> VmResult<u64> {
    calc_mem_size(stack.peek(0)?, &U256::from(32))
}

fn memory_mstore(stack: &Stack) -> VmResult<u64> {
    calc_mem_size(stack.peek(0)?, &U256::from(32))
}

fn memory_mstore8(stack: &Stack) -> VmResult<u64> {
    calc_mem_size(stack.peek(0)?, &U256::one())
}

fn memory_create(stack: &Stack) -> VmResult<u64> {
    mem_at(stack, 1, 2)
}

fn memory_create2(stack: &Stack) -> VmResult<u64> {
    mem_at(stack, 1, 2)
}

/// RETURN and REVERT
fn memory_return(stack: &Stack) -> VmResult<u64> {
    mem_at(stack, 0, 1)
}

fn memory_log(stack: &Stack) -> VmResult<u64> {
    mem_at(stack, 0, 1)
}

/// CALL and CALLCODE: the larger of the return and argument regions
fn memory_call(stack: &Stack) -> VmResult<u64> {
    Ok(mem_at(stack, 5, 6)?.max(mem_at(stack, 3, 4)?))
}

/// DELEGATECALL and STATICCALL
fn memory_delegate_call(stack: &Stack) -> VmResult<u64> {
    Ok(mem_at(stack, 4, 5)?.max(mem_at(stack, 2, 3)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_of(items: &[u64]) -> Stack {
        // items[0] ends up on top
        let mut stack = Stack::new();
        for item in items.iter().rev() {
            stack.push(U256::from(*item)).unwrap();
        }
        stack
    }

    #[test]
    fn test_defined_opcode_counts() {
        let frontier = FRONTIER_INSTRUCTION_SET.defined();
        assert_eq!(HOMESTEAD_INSTRUCTION_SET.defined(), frontier + 1);
        assert_eq!(BYZANTIUM_INSTRUCTION_SET.defined(), frontier + 5);
        assert_eq!(CONSTANTINOPLE_INSTRUCTION_SET.defined(), frontier + 10);
        assert!(!CONSTANTINOPLE_INSTRUCTION_SET[OpCode(0xfe)].is_valid());
        assert!(!CONSTANTINOPLE_INSTRUCTION_SET[OpCode(0x46)].is_valid());
    }

    #[test]
    fn test_stack_bounds() {
        let table = &*FRONTIER_INSTRUCTION_SET;
        let add = &table[OpCode::ADD];
        assert_eq!((add.min_stack, add.max_stack), (2, STACK_LIMIT + 1));
        let push = &table[OpCode::PUSH32];
        assert_eq!((push.min_stack, push.max_stack), (0, STACK_LIMIT - 1));
        let dup16 = &table[OpCode::DUP16];
        assert_eq!((dup16.min_stack, dup16.max_stack), (16, STACK_LIMIT - 1));
        let swap16 = &table[OpCode::SWAP16];
        assert_eq!((swap16.min_stack, swap16.max_stack), (17, STACK_LIMIT));
        let log4 = &table[OpCode::LOG4];
        assert_eq!(log4.min_stack, 6);
        assert!(log4.writes);
    }

    #[test]
    fn test_flags() {
        let table = &*CONSTANTINOPLE_INSTRUCTION_SET;
        assert!(table[OpCode::STOP].halts);
        assert!(table[OpCode::RETURN].halts);
        assert!(table[OpCode::SELFDESTRUCT].halts && table[OpCode::SELFDESTRUCT].writes);
        assert!(table[OpCode::REVERT].reverts);
        assert!(table[OpCode::JUMPI].jumps);
        assert!(table[OpCode::SSTORE].writes);
        assert!(!table[OpCode::CALL].writes);
        assert!(table[OpCode::CREATE2].returns);
    }

    #[test]
    fn test_calc_mem_size() {
        assert_eq!(calc_mem_size(&U256::MAX, &U256::zero()).unwrap(), 0);
        assert_eq!(calc_mem_size(&U256::from(10), &U256::from(22)).unwrap(), 32);
        assert_eq!(
            calc_mem_size(&U256::from(u64::MAX), &U256::one()),
            Err(VmError::GasUintOverflow)
        );
        assert_eq!(calc_mem_size(&U256::MAX, &U256::one()), Err(VmError::GasUintOverflow));
    }

    #[test]
    fn test_memory_call_takes_larger_region() {
        // gas addr value in_off in_size out_off out_size
        let stack = stack_of(&[0, 0, 0, 0, 64, 100, 8]);
        assert_eq!(memory_call(&stack).unwrap(), 108);
        let stack = stack_of(&[0, 0, 0, 200, 64, 100, 0]);
        assert_eq!(memory_call(&stack).unwrap(), 264);
        // gas addr in_off in_size out_off out_size
        let stack = stack_of(&[0, 0, 0, 4, 32, 32]);
        assert_eq!(memory_delegate_call(&stack).unwrap(), 64);
    }
}
