//! Gas schedule and dynamic gas functions

use crate::error::{ConsensusError, VmError, VmResult};
use crate::evm::Evm;
use crate::interpreter::Frame;
use crate::memory::Memory;
use crate::stack::Stack;
use crate::word::{byte_len, to_u64, to_word_size};
use strata_primitives::{Address, H256, U256};

/// Fixed gas costs
pub mod cost {
    /// Zero gas
    pub const ZERO: u64 = 0;
    /// Quick step (ADDRESS, CALLER, POP ...)
    pub const QUICK: u64 = 2;
    /// Fastest step (ADD, PUSH, DUP ...)
    pub const FASTEST: u64 = 3;
    /// Fast step (MUL, DIV ...)
    pub const FAST: u64 = 5;
    /// Mid step (ADDMOD, JUMP ...)
    pub const MID: u64 = 8;
    /// Slow step (JUMPI)
    pub const SLOW: u64 = 10;
    /// External step (BLOCKHASH)
    pub const EXT: u64 = 20;

    /// JUMPDEST
    pub const JUMPDEST: u64 = 1;
    /// EXP base
    pub const EXP: u64 = 10;
    /// SHA3 base
    pub const SHA3: u64 = 30;
    /// SHA3 per word
    pub const SHA3_WORD: u64 = 6;
    /// Copy per word
    pub const COPY: u64 = 3;

    /// Memory per word
    pub const MEMORY: u64 = 3;
    /// Divisor of the quadratic memory term
    pub const QUAD_COEFF_DIV: u64 = 512;

    /// LOG base
    pub const LOG: u64 = 375;
    /// LOG per topic
    pub const LOG_TOPIC: u64 = 375;
    /// LOG per data byte
    pub const LOG_DATA: u64 = 8;

    /// CREATE / CREATE2 base
    pub const CREATE: u64 = 32000;
    /// Deployed code per byte
    pub const CREATE_DATA: u64 = 200;
    /// Value transfer surcharge on calls
    pub const CALL_VALUE_TRANSFER: u64 = 9000;
    /// Surcharge for calling into a new account
    pub const CALL_NEW_ACCOUNT: u64 = 25000;
    /// Free gas handed to the callee on value transfer
    pub const CALL_STIPEND: u64 = 2300;

    /// Legacy SSTORE zero to nonzero
    pub const SSTORE_SET: u64 = 20000;
    /// Legacy SSTORE other writes
    pub const SSTORE_RESET: u64 = 5000;
    /// Legacy SSTORE clear refund
    pub const SSTORE_REFUND: u64 = 15000;

    /// EIP-1283 no-op write
    pub const NET_SSTORE_NOOP: u64 = 200;
    /// EIP-1283 write to a fresh slot
    pub const NET_SSTORE_INIT: u64 = 20000;
    /// EIP-1283 first write to an existing slot
    pub const NET_SSTORE_CLEAN: u64 = 5000;
    /// EIP-1283 write to an already dirty slot
    pub const NET_SSTORE_DIRTY: u64 = 200;
    /// EIP-1283 refund for clearing an existing slot
    pub const NET_SSTORE_CLEAR_REFUND: u64 = 15000;
    /// EIP-1283 refund for restoring a dirty slot to its original value
    pub const NET_SSTORE_RESET_REFUND: u64 = 4800;
    /// EIP-1283 refund for restoring a dirty slot to zero
    pub const NET_SSTORE_RESET_CLEAR_REFUND: u64 = 19800;

    /// SELFDESTRUCT refund, once per account
    pub const SELFDESTRUCT_REFUND: u64 = 24000;

    /// Transaction base
    pub const TX: u64 = 21000;
    /// Contract creation transaction base (Homestead)
    pub const TX_CREATE: u64 = 53000;
    /// Per zero byte of transaction data
    pub const TX_DATA_ZERO: u64 = 4;
    /// Per nonzero byte of transaction data
    pub const TX_DATA_NON_ZERO: u64 = 68;
}

/// Largest memory size whose expansion fee fits the gas arithmetic
const MAX_MEMORY_SIZE: u64 = 0x1F_FFFF_FFE0;

/// Ruleset-dependent prices of the state-accessing opcodes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasTable {
    /// EXTCODESIZE
    pub ext_code_size: u64,
    /// EXTCODECOPY base
    pub ext_code_copy: u64,
    /// EXTCODEHASH
    pub ext_code_hash: u64,
    /// BALANCE
    pub balance: u64,
    /// SLOAD
    pub sload: u64,
    /// CALL family base
    pub calls: u64,
    /// SELFDESTRUCT base
    pub suicide: u64,
    /// EXP per exponent byte
    pub exp_byte: u64,
    /// SELFDESTRUCT into a new account. Zero disables both the charge and
    /// the 63/64 call gas rule.
    pub create_by_suicide: u64,
}

impl GasTable {
    /// Frontier and Homestead prices
    pub const HOMESTEAD: GasTable = GasTable {
        ext_code_size: 20,
        ext_code_copy: 20,
        ext_code_hash: 0,
        balance: 20,
        sload: 50,
        calls: 40,
        suicide: 0,
        exp_byte: 10,
        create_by_suicide: 0,
    };

    /// Tangerine Whistle IO repricing
    pub const EIP150: GasTable = GasTable {
        ext_code_size: 700,
        ext_code_copy: 700,
        ext_code_hash: 0,
        balance: 400,
        sload: 200,
        calls: 700,
        suicide: 5000,
        exp_byte: 10,
        create_by_suicide: 25000,
    };

    /// Spurious Dragon EXP repricing
    pub const EIP158: GasTable = GasTable {
        exp_byte: 50,
        ..GasTable::EIP150
    };

    /// Constantinople adds EXTCODEHASH
    pub const CONSTANTINOPLE: GasTable = GasTable {
        ext_code_hash: 400,
        ..GasTable::EIP158
    };

    /// Whether calls forward at most 63/64 of the remaining gas
    pub fn all_but_one_64th(&self) -> bool {
        self.create_by_suicide > 0
    }
}

/// Expansion fee for growing `mem` to `new_size` bytes.
///
/// Only the increase over the fee already paid is returned. `new_size` must
/// be word aligned.
pub fn memory_gas_cost(mem: &mut Memory, new_size: u64) -> VmResult<u64> {
    if new_size == 0 {
        return Ok(0);
    }
    if new_size > MAX_MEMORY_SIZE {
        return Err(VmError::GasUintOverflow);
    }
    let words = to_word_size(new_size);
    let new_size = words * 32;
    if new_size > mem.len() as u64 {
        let linear = words * cost::MEMORY;
        let quadratic = words * words / cost::QUAD_COEFF_DIV;
        let fee = linear + quadratic;
        let charged = fee - mem.last_gas_cost;
        mem.last_gas_cost = fee;
        return Ok(charged);
    }
    Ok(0)
}

/// Gas handed to a callee.
///
/// With the 63/64 rule active the request is capped at all but one 64th of
/// what remains after `base` is paid.
pub fn call_gas(table: &GasTable, available: u64, base: u64, requested: &U256) -> VmResult<u64> {
    if table.all_but_one_64th() {
        let available = available.saturating_sub(base);
        let cap = available - available / 64;
        if requested.bits() > 64 || cap < requested.low_u64() {
            return Ok(cap);
        }
    }
    to_u64(requested).ok_or(VmError::GasUintOverflow)
}

/// Gas charged before a transaction executes
pub fn intrinsic_gas(data: &[u8], is_create: bool, homestead: bool) -> Result<u64, ConsensusError> {
    let base = if is_create && homestead {
        cost::TX_CREATE
    } else {
        cost::TX
    };
    let zeros = data.iter().filter(|&&b| b == 0).count() as u64;
    let non_zeros = data.len() as u64 - zeros;

    let mut gas = base;
    if (u64::MAX - gas) / cost::TX_DATA_NON_ZERO < non_zeros {
        return Err(ConsensusError::GasUintOverflow);
    }
    gas += non_zeros * cost::TX_DATA_NON_ZERO;
    if (u64::MAX - gas) / cost::TX_DATA_ZERO < zeros {
        return Err(ConsensusError::GasUintOverflow);
    }
    gas += zeros * cost::TX_DATA_ZERO;
    Ok(gas)
}

fn add(a: u64, b: u64) -> VmResult<u64> {
    a.checked_add(b).ok_or(VmError::GasUintOverflow)
}

fn mul(a: u64, b: u64) -> VmResult<u64> {
    a.checked_mul(b).ok_or(VmError::GasUintOverflow)
}

/// `per_word` for every word of the length at `stack[n]`
fn words_cost(stack: &Stack, n: usize, per_word: u64) -> VmResult<u64> {
    let len = to_u64(stack.peek(n)?).ok_or(VmError::GasUintOverflow)?;
    mul(to_word_size(len), per_word)
}

fn address_at(stack: &Stack, n: usize) -> VmResult<Address> {
    Ok(Address::from_word(*stack.peek(n)?))
}

// ==================== Dynamic gas functions ====================
//
// Each returns the cost on top of the opcode's constant gas. Opcodes whose
// price depends on the gas table carry a constant gas of zero.

pub(crate) fn gas_memory(_: &mut Evm<'_>, frame: &mut Frame<'_>, mem_size: u64) -> VmResult<u64> {
    memory_gas_cost(&mut frame.memory, mem_size)
}

pub(crate) fn gas_sha3(_: &mut Evm<'_>, frame: &mut Frame<'_>, mem_size: u64) -> VmResult<u64> {
    let gas = memory_gas_cost(&mut frame.memory, mem_size)?;
    add(gas, words_cost(&frame.stack, 1, cost::SHA3_WORD)?)
}

/// CALLDATACOPY, CODECOPY and RETURNDATACOPY
pub(crate) fn gas_copy(_: &mut Evm<'_>, frame: &mut Frame<'_>, mem_size: u64) -> VmResult<u64> {
    let gas = memory_gas_cost(&mut frame.memory, mem_size)?;
    add(gas, words_cost(&frame.stack, 2, cost::COPY)?)
}

pub(crate) fn gas_ext_code_copy(evm: &mut Evm<'_>, frame: &mut Frame<'_>, mem_size: u64) -> VmResult<u64> {
    let gas = add(
        evm.tables.gas.ext_code_copy,
        memory_gas_cost(&mut frame.memory, mem_size)?,
    )?;
    add(gas, words_cost(&frame.stack, 3, cost::COPY)?)
}

pub(crate) fn gas_ext_code_size(evm: &mut Evm<'_>, _: &mut Frame<'_>, _: u64) -> VmResult<u64> {
    Ok(evm.tables.gas.ext_code_size)
}

pub(crate) fn gas_ext_code_hash(evm: &mut Evm<'_>, _: &mut Frame<'_>, _: u64) -> VmResult<u64> {
    Ok(evm.tables.gas.ext_code_hash)
}

pub(crate) fn gas_balance(evm: &mut Evm<'_>, _: &mut Frame<'_>, _: u64) -> VmResult<u64> {
    Ok(evm.tables.gas.balance)
}

pub(crate) fn gas_sload(evm: &mut Evm<'_>, _: &mut Frame<'_>, _: u64) -> VmResult<u64> {
    Ok(evm.tables.gas.sload)
}

pub(crate) fn gas_exp(evm: &mut Evm<'_>, frame: &mut Frame<'_>, _: u64) -> VmResult<u64> {
    let exponent_bytes = byte_len(frame.stack.peek(1)?);
    add(cost::EXP, mul(exponent_bytes, evm.tables.gas.exp_byte)?)
}

pub(crate) fn gas_log<const TOPICS: u64>(
    _: &mut Evm<'_>,
    frame: &mut Frame<'_>,
    mem_size: u64,
) -> VmResult<u64> {
    let len = to_u64(frame.stack.peek(1)?).ok_or(VmError::GasUintOverflow)?;
    let mut gas = memory_gas_cost(&mut frame.memory, mem_size)?;
    gas = add(gas, cost::LOG)?;
    gas = add(gas, TOPICS * cost::LOG_TOPIC)?;
    add(gas, mul(len, cost::LOG_DATA)?)
}

pub(crate) fn gas_sstore(evm: &mut Evm<'_>, frame: &mut Frame<'_>, _: u64) -> VmResult<u64> {
    let address = frame.contract.address;
    let key = H256::from_word(*frame.stack.peek(0)?);
    let value = H256::from_word(*frame.stack.peek(1)?);
    let current = evm.state.get_state(&address, &key);

    let rules = evm.tables.ruleset;
    if !rules.constantinople || rules.petersburg {
        return Ok(if current.is_zero() && !value.is_zero() {
            cost::SSTORE_SET
        } else if !current.is_zero() && value.is_zero() {
            evm.state.add_refund(cost::SSTORE_REFUND);
            cost::SSTORE_RESET
        } else {
            cost::SSTORE_RESET
        });
    }

    // EIP-1283 net gas metering
    if current == value {
        return Ok(cost::NET_SSTORE_NOOP);
    }
    let original = evm.state.get_committed_state(&address, &key);
    if original == current {
        if original.is_zero() {
            return Ok(cost::NET_SSTORE_INIT);
        }
        if value.is_zero() {
            evm.state.add_refund(cost::NET_SSTORE_CLEAR_REFUND);
        }
        return Ok(cost::NET_SSTORE_CLEAN);
    }
    if !original.is_zero() {
        if current.is_zero() {
            evm.state.sub_refund(cost::NET_SSTORE_CLEAR_REFUND);
        } else if value.is_zero() {
            evm.state.add_refund(cost::NET_SSTORE_CLEAR_REFUND);
        }
    }
    if original == value {
        if original.is_zero() {
            evm.state.add_refund(cost::NET_SSTORE_RESET_CLEAR_REFUND);
        } else {
            evm.state.add_refund(cost::NET_SSTORE_RESET_REFUND);
        }
    }
    Ok(cost::NET_SSTORE_DIRTY)
}

pub(crate) fn gas_create(_: &mut Evm<'_>, frame: &mut Frame<'_>, mem_size: u64) -> VmResult<u64> {
    add(cost::CREATE, memory_gas_cost(&mut frame.memory, mem_size)?)
}

pub(crate) fn gas_create2(_: &mut Evm<'_>, frame: &mut Frame<'_>, mem_size: u64) -> VmResult<u64> {
    let gas = add(cost::CREATE, memory_gas_cost(&mut frame.memory, mem_size)?)?;
    add(gas, words_cost(&frame.stack, 2, cost::SHA3_WORD)?)
}

/// Charge the forwarded gas on top of `base` and remember it for the
/// execute step
fn with_call_gas(evm: &mut Evm<'_>, frame: &Frame<'_>, base: u64) -> VmResult<u64> {
    let requested = *frame.stack.peek(0)?;
    evm.call_gas_temp = call_gas(&evm.tables.gas, frame.contract.gas, base, &requested)?;
    add(base, evm.call_gas_temp)
}

pub(crate) fn gas_call(evm: &mut Evm<'_>, frame: &mut Frame<'_>, mem_size: u64) -> VmResult<u64> {
    let mut gas = evm.tables.gas.calls;
    let transfers_value = !frame.stack.peek(2)?.is_zero();
    let target = address_at(&frame.stack, 1)?;
    if evm.tables.ruleset.eip158 {
        if transfers_value && evm.state.empty(&target) {
            gas += cost::CALL_NEW_ACCOUNT;
        }
    } else if !evm.state.exist(&target) {
        gas += cost::CALL_NEW_ACCOUNT;
    }
    if transfers_value {
        gas += cost::CALL_VALUE_TRANSFER;
    }
    gas = add(gas, memory_gas_cost(&mut frame.memory, mem_size)?)?;
    with_call_gas(evm, frame, gas)
}

pub(crate) fn gas_call_code(evm: &mut Evm<'_>, frame: &mut Frame<'_>, mem_size: u64) -> VmResult<u64> {
    let mut gas = evm.tables.gas.calls;
    if !frame.stack.peek(2)?.is_zero() {
        gas += cost::CALL_VALUE_TRANSFER;
    }
    gas = add(gas, memory_gas_cost(&mut frame.memory, mem_size)?)?;
    with_call_gas(evm, frame, gas)
}

/// DELEGATECALL and STATICCALL
pub(crate) fn gas_call_no_value(evm: &mut Evm<'_>, frame: &mut Frame<'_>, mem_size: u64) -> VmResult<u64> {
    let gas = add(
        evm.tables.gas.calls,
        memory_gas_cost(&mut frame.memory, mem_size)?,
    )?;
    with_call_gas(evm, frame, gas)
}

pub(crate) fn gas_selfdestruct(evm: &mut Evm<'_>, frame: &mut Frame<'_>, _: u64) -> VmResult<u64> {
    let mut gas = 0;
    let rules = evm.tables.ruleset;
    let address = frame.contract.address;
    if rules.eip150 {
        gas = evm.tables.gas.suicide;
        let beneficiary = address_at(&frame.stack, 0)?;
        if rules.eip158 {
            if evm.state.empty(&beneficiary) && !evm.state.get_balance(&address).is_zero() {
                gas += evm.tables.gas.create_by_suicide;
            }
        } else if !evm.state.exist(&beneficiary) {
            gas += evm.tables.gas.create_by_suicide;
        }
    }
    if !evm.state.has_suicided(&address) {
        evm.state.add_refund(cost::SELFDESTRUCT_REFUND);
    }
    Ok(gas)
}
