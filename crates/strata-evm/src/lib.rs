//! # strata-evm
//!
//! Deterministic EVM for the Strata execution engine.
//!
//! This crate provides:
//! - Per-fork instruction tables, gas tables and precompiles
//! - The bytecode interpreter with pooled stacks and memory
//! - Call and create orchestration, and top-level transaction execution
//!
//! All state access goes through [`strata_state::StateDb`].

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod context;
mod contract;
mod error;
mod evm;
pub mod gas;
mod instructions;
mod interpreter;
mod jump_table;
mod jumpdest;
mod memory;
mod opcode;
pub mod precompiles;
mod ruleset;
mod stack;
pub mod word;

pub use config::{ExecutionOptions, PoolConfig, CALL_CREATE_DEPTH, MAX_CODE_SIZE};
pub use context::{BlockContext, Transaction, TxContext, BLOCK_HASH_WINDOW};
pub use contract::Contract;
pub use error::{
    ConfigError, ConsensusError, ExecutionResult, FatalError, InternalError, PrecompileError,
    VmError, VmResult,
};
pub use evm::{CallOutcome, CreateOutcome, Evm};
pub use gas::GasTable;
pub use interpreter::{Control, InstructionHook, NoopHook, Outcome};
pub use jump_table::{
    JumpTable, Operation, BYZANTIUM_INSTRUCTION_SET, CONSTANTINOPLE_INSTRUCTION_SET,
    FRONTIER_INSTRUCTION_SET, HOMESTEAD_INSTRUCTION_SET,
};
pub use jumpdest::{Bitmap, JumpdestCache};
pub use memory::{Memory, MemoryPool};
pub use opcode::OpCode;
pub use precompiles::{Precompile, Precompiles};
pub use ruleset::{ChainConfig, Fork, Ruleset, Tables};
pub use stack::{Stack, StackPool, STACK_LIMIT};
