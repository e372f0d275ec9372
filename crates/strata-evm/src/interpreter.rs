//! EVM bytecode interpreter

use crate::contract::Contract;
use crate::error::{VmError, VmResult};
use crate::evm::Evm;
use crate::memory::Memory;
use crate::opcode::OpCode;
use crate::stack::Stack;
use crate::word::to_word_size;

/// Machine state of the frame being executed
pub(crate) struct Frame<'c> {
    pub(crate) pc: u64,
    pub(crate) stack: Stack,
    pub(crate) memory: Memory,
    pub(crate) contract: &'c mut Contract,
}

/// How a frame ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// STOP, RETURN or SELFDESTRUCT, or ran off the end of the code
    Halted(Vec<u8>),
    /// REVERT; remaining gas is kept
    Reverted(Vec<u8>),
    /// Code-level error; remaining gas is forfeited
    Faulted(VmError),
}

/// Decision of an [`InstructionHook`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    /// Execute the instruction
    Continue,
    /// Stop the whole execution with [`VmError::Aborted`]
    Abort,
}

/// Called before every instruction at every depth.
///
/// Used to cancel a speculative execution that is already known to be
/// wasted.
pub trait InstructionHook: Send + Sync {
    /// Inspect the instruction at `pc`
    fn on_instruction(&self, pc: u64) -> Control;
}

/// Hook that never aborts
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHook;

impl InstructionHook for NoopHook {
    #[inline]
    fn on_instruction(&self, _pc: u64) -> Control {
        Control::Continue
    }
}

/// Execute `contract` one level deeper than the current frame.
///
/// Only fatal errors are returned as `Err`; everything else is reported
/// through [`Outcome`].
pub(crate) fn run_code(evm: &mut Evm<'_>, contract: &mut Contract, read_only: bool) -> VmResult<Outcome> {
    evm.depth += 1;
    // 只读模式向下传递，由设置者负责恢复
    let enters_read_only = read_only && !evm.read_only;
    if enters_read_only {
        evm.read_only = true;
    }
    evm.return_data.clear();

    let result = if contract.code.is_empty() {
        Ok(Outcome::Halted(Vec::new()))
    } else {
        let depth = evm.depth;
        let mut frame = Frame {
            pc: 0,
            stack: evm.stacks.acquire(),
            memory: evm.memories.acquire(depth),
            contract,
        };
        let result = execute(evm, &mut frame);
        let Frame { stack, memory, .. } = frame;
        evm.stacks.release(stack);
        evm.memories.release(depth, memory);
        result
    };

    if enters_read_only {
        evm.read_only = false;
    }
    evm.depth -= 1;

    match result {
        Ok(outcome) => Ok(outcome),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => Ok(Outcome::Faulted(err)),
    }
}

fn execute(evm: &mut Evm<'_>, frame: &mut Frame<'_>) -> VmResult<Outcome> {
    let table = evm.tables.instructions;
    loop {
        if evm.hook.on_instruction(frame.pc) == Control::Abort {
            return Err(VmError::Aborted);
        }

        let opcode = frame.contract.get_op(frame.pc);
        let operation = &table[opcode];
        if !operation.valid {
            return Err(VmError::InvalidOpcode(opcode.0));
        }

        let len = frame.stack.len();
        if len < operation.min_stack {
            return Err(VmError::StackUnderflow {
                len,
                required: operation.min_stack,
            });
        }
        if len > operation.max_stack {
            return Err(VmError::StackOverflow {
                len,
                limit: operation.max_stack,
            });
        }

        if evm.read_only && evm.tables.ruleset.byzantium {
            // CALL 只在转账时算写操作
            let transfers = opcode == OpCode::CALL && !frame.stack.peek(2)?.is_zero();
            if operation.writes || transfers {
                return Err(VmError::WriteProtection);
            }
        }

        let mut memory_size = 0;
        if let Some(size_fn) = operation.memory_size {
            let size = size_fn(&frame.stack)?;
            memory_size = to_word_size(size)
                .checked_mul(32)
                .ok_or(VmError::GasUintOverflow)?;
        }

        let mut cost = operation.constant_gas;
        if let Some(gas_fn) = operation.dynamic_gas {
            match gas_fn(evm, frame, memory_size) {
                Ok(dynamic) => {
                    cost = cost.checked_add(dynamic).ok_or(VmError::OutOfGas)?;
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(_) => return Err(VmError::OutOfGas),
            }
        }
        if !frame.contract.use_gas(cost) {
            return Err(VmError::OutOfGas);
        }

        if memory_size > 0 {
            frame.memory.resize(memory_size as usize);
        }

        let res = (operation.execute)(evm, frame)?;

        if operation.returns {
            evm.return_data = res.clone();
        }
        if operation.reverts {
            return Ok(Outcome::Reverted(res));
        }
        if operation.halts {
            return Ok(Outcome::Halted(res));
        }
        if !operation.jumps {
            frame.pc += 1;
        }
    }
}
