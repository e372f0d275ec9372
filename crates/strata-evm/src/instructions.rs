//! Instruction implementations
//!
//! Every function here runs after the interpreter has validated stack
//! arity, charged gas and expanded memory. Operands are popped in the order
//! they were pushed last-first, so for `a b SUB` the result is `b - a`.

use crate::error::{VmError, VmResult};
use crate::evm::{CallOutcome, Evm};
use crate::gas::cost;
use crate::interpreter::Frame;
use crate::word::{self, from_bool, to_u64};
use strata_crypto::keccak256;
use strata_primitives::{Address, H256, U256};
use strata_state::Log;

type OpResult = VmResult<Vec<u8>>;

#[inline]
fn done() -> OpResult {
    Ok(Vec::new())
}

/// `size` bytes of `data` from `start`, zero padded past the end
fn get_data(data: &[u8], start: &U256, size: u64) -> Vec<u8> {
    let len = data.len() as u64;
    let start = to_u64(start).map_or(len, |s| s.min(len));
    let end = start.saturating_add(size).min(len);
    let mut out = data[start as usize..end as usize].to_vec();
    out.resize(size as usize, 0);
    out
}

macro_rules! binary_op {
    ($name:ident, |$x:ident, $y:ident| $body:expr) => {
        pub(crate) fn $name(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
            let $x = frame.stack.pop()?;
            let top = frame.stack.top_mut()?;
            let $y = *top;
            *top = $body;
            done()
        }
    };
}

macro_rules! ternary_op {
    ($name:ident, $f:path) => {
        pub(crate) fn $name(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
            let x = frame.stack.pop()?;
            let y = frame.stack.pop()?;
            let top = frame.stack.top_mut()?;
            *top = $f(x, y, *top);
            done()
        }
    };
}

macro_rules! push_value {
    ($name:ident, |$evm:ident, $frame:ident| $value:expr) => {
        pub(crate) fn $name($evm: &mut Evm<'_>, $frame: &mut Frame<'_>) -> OpResult {
            let value = $value;
            $frame.stack.push(value)?;
            done()
        }
    };
}

// ==================== Arithmetic ====================

pub(crate) fn op_stop(_: &mut Evm<'_>, _: &mut Frame<'_>) -> OpResult {
    done()
}

binary_op!(op_add, |x, y| x.overflowing_add(y).0);
binary_op!(op_mul, |x, y| x.overflowing_mul(y).0);
binary_op!(op_sub, |x, y| x.overflowing_sub(y).0);
binary_op!(op_div, |x, y| if y.is_zero() { U256::zero() } else { x / y });
binary_op!(op_sdiv, |x, y| word::sdiv(x, y));
binary_op!(op_mod, |x, y| if y.is_zero() { U256::zero() } else { x % y });
binary_op!(op_smod, |x, y| word::smod(x, y));
binary_op!(op_exp, |base, exponent| word::exp(base, exponent));
binary_op!(op_signextend, |back, value| word::signextend(back, value));
ternary_op!(op_addmod, word::addmod);
ternary_op!(op_mulmod, word::mulmod);

// ==================== Comparison and bitwise ====================

binary_op!(op_lt, |x, y| from_bool(x < y));
binary_op!(op_gt, |x, y| from_bool(x > y));
binary_op!(op_slt, |x, y| from_bool(word::slt(&x, &y)));
binary_op!(op_sgt, |x, y| from_bool(word::sgt(&x, &y)));
binary_op!(op_eq, |x, y| from_bool(x == y));
binary_op!(op_and, |x, y| x & y);
binary_op!(op_or, |x, y| x | y);
binary_op!(op_xor, |x, y| x ^ y);
binary_op!(op_byte, |n, value| word::byte(n, value));
binary_op!(op_shl, |shift, value| if shift < U256::from(256) {
    value << shift.low_u64() as usize
} else {
    U256::zero()
});
binary_op!(op_shr, |shift, value| if shift < U256::from(256) {
    value >> shift.low_u64() as usize
} else {
    U256::zero()
});
binary_op!(op_sar, |shift, value| word::sar(shift, value));

pub(crate) fn op_iszero(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let top = frame.stack.top_mut()?;
    *top = from_bool(top.is_zero());
    done()
}

pub(crate) fn op_not(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let top = frame.stack.top_mut()?;
    *top = !*top;
    done()
}

pub(crate) fn op_sha3(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let offset = frame.stack.pop()?;
    let top = frame.stack.top_mut()?;
    let data = frame.memory.get(offset.low_u64(), top.low_u64())?;
    *top = keccak256(data).to_word();
    done()
}

// ==================== Environment ====================

push_value!(op_address, |_evm, frame| frame.contract.address.to_word());
push_value!(op_origin, |evm, _frame| evm.tx.origin.to_word());
push_value!(op_caller, |_evm, frame| frame.contract.caller.to_word());
push_value!(op_call_value, |_evm, frame| frame.contract.value);
push_value!(op_call_data_size, |_evm, frame| U256::from(frame.contract.input.len()));
push_value!(op_code_size, |_evm, frame| U256::from(frame.contract.code.len()));
push_value!(op_gas_price, |evm, _frame| evm.tx.gas_price);
push_value!(op_return_data_size, |evm, _frame| U256::from(evm.return_data.len()));

pub(crate) fn op_balance(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let top = frame.stack.top_mut()?;
    *top = evm.state.get_balance(&Address::from_word(*top));
    done()
}

pub(crate) fn op_call_data_load(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let top = frame.stack.top_mut()?;
    *top = U256::from_big_endian(&get_data(&frame.contract.input, top, 32));
    done()
}

pub(crate) fn op_call_data_copy(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let mem_offset = frame.stack.pop()?.low_u64();
    let data_offset = frame.stack.pop()?;
    let len = frame.stack.pop()?.low_u64();
    let data = get_data(&frame.contract.input, &data_offset, len);
    frame.memory.set(mem_offset, len, &data)?;
    done()
}

pub(crate) fn op_return_data_copy(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let mem_offset = frame.stack.pop()?.low_u64();
    let data_offset = frame.stack.pop()?;
    let len = frame.stack.pop()?;

    let (end, overflow) = data_offset.overflowing_add(len);
    if overflow || end > U256::from(evm.return_data.len()) {
        return Err(VmError::ReturnDataOutOfBounds);
    }
    let start = data_offset.low_u64() as usize;
    let end = end.low_u64() as usize;
    frame
        .memory
        .set(mem_offset, len.low_u64(), &evm.return_data[start..end])?;
    done()
}

pub(crate) fn op_code_copy(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let mem_offset = frame.stack.pop()?.low_u64();
    let code_offset = frame.stack.pop()?;
    let len = frame.stack.pop()?.low_u64();
    let code = get_data(&frame.contract.code, &code_offset, len);
    frame.memory.set(mem_offset, len, &code)?;
    done()
}

pub(crate) fn op_ext_code_size(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let top = frame.stack.top_mut()?;
    *top = U256::from(evm.state.get_code_size(&Address::from_word(*top)));
    done()
}

pub(crate) fn op_ext_code_copy(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let address = Address::from_word(frame.stack.pop()?);
    let mem_offset = frame.stack.pop()?.low_u64();
    let code_offset = frame.stack.pop()?;
    let len = frame.stack.pop()?.low_u64();
    let code = get_data(&evm.state.get_code(&address), &code_offset, len);
    frame.memory.set(mem_offset, len, &code)?;
    done()
}

/// Zero for accounts that are empty or absent
pub(crate) fn op_ext_code_hash(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let top = frame.stack.top_mut()?;
    let address = Address::from_word(*top);
    *top = if evm.state.empty(&address) {
        U256::zero()
    } else {
        evm.state.get_code_hash(&address).to_word()
    };
    done()
}

// ==================== Block ====================

pub(crate) fn op_blockhash(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let top = frame.stack.top_mut()?;
    *top = to_u64(top).map_or(U256::zero(), |n| evm.block.block_hash(n).to_word());
    done()
}

push_value!(op_coinbase, |evm, _frame| evm.block.coinbase.to_word());
push_value!(op_timestamp, |evm, _frame| U256::from(evm.block.timestamp));
push_value!(op_number, |evm, _frame| U256::from(evm.block.number));
push_value!(op_difficulty, |evm, _frame| evm.block.difficulty);
push_value!(op_gas_limit, |evm, _frame| U256::from(evm.block.gas_limit));

// ==================== Stack, memory, storage, flow ====================

pub(crate) fn op_pop(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    frame.stack.pop()?;
    done()
}

pub(crate) fn op_mload(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let top = frame.stack.top_mut()?;
    *top = frame.memory.get_word(top.low_u64())?;
    done()
}

pub(crate) fn op_mstore(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let offset = frame.stack.pop()?.low_u64();
    let value = frame.stack.pop()?;
    frame.memory.set32(offset, &value)?;
    done()
}

pub(crate) fn op_mstore8(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let offset = frame.stack.pop()?.low_u64();
    let value = frame.stack.pop()?;
    frame.memory.set_byte(offset, value.byte(0))?;
    done()
}

pub(crate) fn op_sload(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let top = frame.stack.top_mut()?;
    let key = H256::from_word(*top);
    *top = evm.state.get_state(&frame.contract.address, &key).to_word();
    done()
}

pub(crate) fn op_sstore(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let key = H256::from_word(frame.stack.pop()?);
    let value = H256::from_word(frame.stack.pop()?);
    evm.state.set_state(&frame.contract.address, key, value);
    done()
}

pub(crate) fn op_jump(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let dest = frame.stack.pop()?;
    if !frame.contract.valid_jumpdest(&dest, &evm.jumpdests) {
        return Err(VmError::InvalidJump);
    }
    frame.pc = dest.low_u64();
    done()
}

pub(crate) fn op_jumpi(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let dest = frame.stack.pop()?;
    let cond = frame.stack.pop()?;
    if cond.is_zero() {
        frame.pc += 1;
        return done();
    }
    if !frame.contract.valid_jumpdest(&dest, &evm.jumpdests) {
        return Err(VmError::InvalidJump);
    }
    frame.pc = dest.low_u64();
    done()
}

pub(crate) fn op_jumpdest(_: &mut Evm<'_>, _: &mut Frame<'_>) -> OpResult {
    done()
}

push_value!(op_pc, |_evm, frame| U256::from(frame.pc));
push_value!(op_msize, |_evm, frame| U256::from(frame.memory.len()));
push_value!(op_gas, |_evm, frame| U256::from(frame.contract.gas));

/// PUSH1..PUSH32; immediates past the end of the code read as zero
pub(crate) fn op_push(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let size = frame.contract.get_op(frame.pc).push_size();
    let code = &frame.contract.code;
    let start = (frame.pc as usize + 1).min(code.len());
    let end = (start + size).min(code.len());

    let mut buf = [0u8; 32];
    buf[..end - start].copy_from_slice(&code[start..end]);
    frame.stack.push(U256::from_big_endian(&buf[..size]))?;
    frame.pc += size as u64;
    done()
}

/// DUP1..DUP16
pub(crate) fn op_dup(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let n = frame.contract.get_op(frame.pc).0 - 0x7f;
    frame.stack.dup(n as usize)?;
    done()
}

/// SWAP1..SWAP16
pub(crate) fn op_swap(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let n = frame.contract.get_op(frame.pc).0 - 0x8f;
    frame.stack.swap(n as usize)?;
    done()
}

/// LOG0..LOG4
pub(crate) fn op_log(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let topic_count = frame.contract.get_op(frame.pc).0 - 0xa0;
    let offset = frame.stack.pop()?.low_u64();
    let len = frame.stack.pop()?.low_u64();
    let mut topics = Vec::with_capacity(topic_count as usize);
    for _ in 0..topic_count {
        topics.push(H256::from_word(frame.stack.pop()?));
    }
    let data = frame.memory.get_copy(offset, len)?;
    evm.state.add_log(Log {
        address: frame.contract.address,
        topics,
        data,
    });
    done()
}

// ==================== System ====================

pub(crate) fn op_create(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let value = frame.stack.pop()?;
    let offset = frame.stack.pop()?.low_u64();
    let len = frame.stack.pop()?.low_u64();
    let init_code = frame.memory.get_copy(offset, len)?;

    let mut gas = frame.contract.gas;
    if evm.tables.ruleset.eip150 {
        gas -= gas / 64;
    }
    frame.contract.use_gas(gas);

    let outcome = evm.create(frame.contract.address, init_code, gas, value)?;
    let failed = match &outcome.error {
        Some(VmError::CodeStoreOutOfGas) => evm.tables.ruleset.homestead,
        Some(_) => true,
        None => false,
    };
    frame.stack.push(if failed {
        U256::zero()
    } else {
        outcome.address.to_word()
    })?;
    frame.contract.gas += outcome.gas_left;

    if outcome.error == Some(VmError::ExecutionReverted) {
        return Ok(outcome.output);
    }
    done()
}

pub(crate) fn op_create2(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let endowment = frame.stack.pop()?;
    let offset = frame.stack.pop()?.low_u64();
    let len = frame.stack.pop()?.low_u64();
    let salt = H256::from_word(frame.stack.pop()?);
    let init_code = frame.memory.get_copy(offset, len)?;

    let mut gas = frame.contract.gas;
    gas -= gas / 64;
    frame.contract.use_gas(gas);

    let outcome = evm.create2(frame.contract.address, init_code, gas, endowment, salt)?;
    frame.stack.push(if outcome.error.is_some() {
        U256::zero()
    } else {
        outcome.address.to_word()
    })?;
    frame.contract.gas += outcome.gas_left;

    if outcome.error == Some(VmError::ExecutionReverted) {
        return Ok(outcome.output);
    }
    done()
}

/// Arguments shared by the CALL family
struct CallArgs {
    target: Address,
    value: U256,
    input: Vec<u8>,
    ret_offset: u64,
    ret_len: u64,
}

fn pop_call_args(frame: &mut Frame<'_>, with_value: bool) -> VmResult<CallArgs> {
    // 请求的 gas 已在 gas 函数里结算
    frame.stack.pop()?;
    let target = Address::from_word(frame.stack.pop()?);
    let value = if with_value {
        frame.stack.pop()?
    } else {
        U256::zero()
    };
    let in_offset = frame.stack.pop()?.low_u64();
    let in_len = frame.stack.pop()?.low_u64();
    let ret_offset = frame.stack.pop()?.low_u64();
    let ret_len = frame.stack.pop()?.low_u64();
    Ok(CallArgs {
        target,
        value,
        input: frame.memory.get_copy(in_offset, in_len)?,
        ret_offset,
        ret_len,
    })
}

/// Push the status word, copy the output into memory and refund unused gas
fn finish_call(frame: &mut Frame<'_>, args: &CallArgs, outcome: CallOutcome) -> OpResult {
    frame.stack.push(from_bool(outcome.error.is_none()))?;
    if matches!(outcome.error, None | Some(VmError::ExecutionReverted)) {
        frame
            .memory
            .set(args.ret_offset, args.ret_len, &outcome.output)?;
    }
    frame.contract.gas += outcome.gas_left;
    Ok(outcome.output)
}

pub(crate) fn op_call(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let args = pop_call_args(frame, true)?;
    let mut gas = evm.call_gas_temp;
    if !args.value.is_zero() {
        gas += cost::CALL_STIPEND;
    }
    let input = args.input.clone();
    let outcome = evm.call(frame.contract.address, args.target, input, gas, args.value)?;
    finish_call(frame, &args, outcome)
}

pub(crate) fn op_call_code(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let args = pop_call_args(frame, true)?;
    let mut gas = evm.call_gas_temp;
    if !args.value.is_zero() {
        gas += cost::CALL_STIPEND;
    }
    let input = args.input.clone();
    let outcome = evm.call_code(frame.contract.address, args.target, input, gas, args.value)?;
    finish_call(frame, &args, outcome)
}

pub(crate) fn op_delegate_call(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let args = pop_call_args(frame, false)?;
    let gas = evm.call_gas_temp;
    let input = args.input.clone();
    let outcome = evm.delegate_call(frame.contract, args.target, input, gas)?;
    finish_call(frame, &args, outcome)
}

pub(crate) fn op_static_call(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let args = pop_call_args(frame, false)?;
    let gas = evm.call_gas_temp;
    let input = args.input.clone();
    let outcome = evm.static_call(frame.contract.address, args.target, input, gas)?;
    finish_call(frame, &args, outcome)
}

pub(crate) fn op_return(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let offset = frame.stack.pop()?.low_u64();
    let len = frame.stack.pop()?.low_u64();
    Ok(frame.memory.get_copy(offset, len)?)
}

pub(crate) fn op_revert(_: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let offset = frame.stack.pop()?.low_u64();
    let len = frame.stack.pop()?.low_u64();
    Ok(frame.memory.get_copy(offset, len)?)
}

pub(crate) fn op_selfdestruct(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> OpResult {
    let beneficiary = Address::from_word(frame.stack.pop()?);
    let address = frame.contract.address;
    let balance = evm.state.get_balance(&address);
    evm.state.add_balance(&beneficiary, balance);
    evm.state.suicide(&address);
    done()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_data_pads_and_clamps() {
        let data = [1u8, 2, 3];
        assert_eq!(get_data(&data, &U256::zero(), 2), vec![1, 2]);
        assert_eq!(get_data(&data, &U256::from(2), 3), vec![3, 0, 0]);
        assert_eq!(get_data(&data, &U256::from(10), 2), vec![0, 0]);
        assert_eq!(get_data(&data, &U256::MAX, 1), vec![0]);
        assert!(get_data(&data, &U256::zero(), 0).is_empty());
    }
}
