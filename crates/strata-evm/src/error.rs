//! EVM error and result types

use crate::ruleset::Fork;
use strata_primitives::Address;
use strata_state::{Log, StateError};
use thiserror::Error;

/// Violation of an interpreter invariant.
///
/// The dispatch table validates stack arity and memory bounds before an
/// instruction executes, so these only surface on a defect in the engine
/// itself. They abort the whole execution instead of failing a frame.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InternalError {
    /// Push on a full stack
    #[error("stack overflow")]
    StackOverflow,

    /// Pop or peek below the bottom of the stack
    #[error("stack underflow")]
    StackUnderflow,

    /// Memory access past the current length
    #[error("memory access out of bounds (offset {offset}, len {len}, size {size})")]
    MemoryOutOfBounds {
        /// Start of the access
        offset: u64,
        /// Length of the access
        len: u64,
        /// Memory length at the time of access
        size: u64,
    },
}

/// Precompiled contract failure
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PrecompileError {
    /// Coordinate not below the field modulus
    #[error("bn256: invalid field element")]
    InvalidFieldElement,

    /// Point not on the curve or outside the prime-order subgroup
    #[error("bn256: malformed point")]
    InvalidPoint,

    /// Pairing input is not a whole number of (G1, G2) pairs
    #[error("bad elliptic curve pairing size")]
    BadPairingInput,
}

/// Code-level execution error.
///
/// Everything except [`VmError::Aborted`] and [`VmError::Internal`] is caught
/// at the enclosing call or create boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    /// Gas exhausted
    #[error("out of gas")]
    OutOfGas,

    /// Not enough gas left to pay for the deployed code
    #[error("contract creation code storage out of gas")]
    CodeStoreOutOfGas,

    /// Call or create nested too deep
    #[error("max call depth exceeded")]
    Depth,

    /// Caller cannot cover the transferred value
    #[error("insufficient balance for transfer")]
    InsufficientBalance,

    /// Target of a creation already has code or a nonce
    #[error("contract address collision")]
    ContractAddressCollision,

    /// REVERT executed
    #[error("execution reverted")]
    ExecutionReverted,

    /// Deployed code exceeds the size limit (EIP-170)
    #[error("max code size exceeded")]
    MaxCodeSizeExceeded,

    /// Jump to a location that is not a JUMPDEST
    #[error("invalid jump destination")]
    InvalidJump,

    /// State modification inside a static call
    #[error("write protection")]
    WriteProtection,

    /// RETURNDATACOPY past the end of the return buffer
    #[error("return data out of bounds")]
    ReturnDataOutOfBounds,

    /// Gas or memory size computation overflowed 64 bits
    #[error("gas uint64 overflow")]
    GasUintOverflow,

    /// Opcode undefined in the active ruleset
    #[error("invalid opcode 0x{0:x}")]
    InvalidOpcode(u8),

    /// Not enough operands
    #[error("stack underflow ({len} <=> {required})")]
    StackUnderflow {
        /// Current stack size
        len: usize,
        /// Operands required
        required: usize,
    },

    /// Instruction would push past the stack limit
    #[error("stack limit reached {len} ({limit})")]
    StackOverflow {
        /// Current stack size
        len: usize,
        /// Maximum size before this instruction
        limit: usize,
    },

    /// Precompiled contract rejected its input
    #[error(transparent)]
    Precompile(#[from] PrecompileError),

    /// Cancelled by the instruction hook
    #[error("execution aborted")]
    Aborted,

    /// Engine invariant violated
    #[error("internal error: {0}")]
    Internal(#[from] InternalError),
}

impl VmError {
    /// Whether the error must escape every frame instead of being caught at
    /// the nearest call boundary
    pub fn is_fatal(&self) -> bool {
        matches!(self, VmError::Aborted | VmError::Internal(_))
    }
}

/// Result type for EVM operations
pub type VmResult<T> = Result<T, VmError>;

/// Transaction rejected before execution; no state was changed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// Sender nonce below the transaction nonce
    #[error("nonce too high")]
    NonceTooHigh,

    /// Sender nonce above the transaction nonce
    #[error("nonce too low")]
    NonceTooLow,

    /// Sender cannot prepay `gas * gas_price`
    #[error("insufficient balance to pay for gas")]
    InsufficientBalanceForGas,

    /// Sender cannot cover the transferred value
    #[error("insufficient balance for transfer")]
    InsufficientBalanceForTransfer,

    /// Gas limit below the intrinsic cost
    #[error("intrinsic gas too low")]
    IntrinsicGasTooLow,

    /// Intrinsic gas computation overflowed
    #[error("gas uint64 overflow")]
    GasUintOverflow,
}

/// Error that invalidates everything computed in the current block
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FatalError {
    /// State backend failure
    #[error(transparent)]
    State(#[from] StateError),

    /// Cancelled by the instruction hook
    #[error("execution aborted")]
    Aborted,

    /// Engine invariant violated
    #[error("internal error: {0}")]
    Internal(InternalError),
}

/// Invalid engine configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A fork is scheduled before one it depends on, or after one that never
    /// activates
    #[error("unsupported fork ordering: {earlier} not enabled before {later}")]
    ForkOrder {
        /// Fork that must come first
        earlier: Fork,
        /// Fork scheduled too early
        later: Fork,
    },
}

/// Outcome of [`crate::Evm::main`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Bytes returned (or revert data)
    pub return_data: Vec<u8>,
    /// Address of the created contract, for creation transactions
    pub contract_address: Option<Address>,
    /// Logs emitted by the transaction
    pub logs: Vec<Log>,
    /// Gas charged to the sender after refunds
    pub gas_used: u64,
    /// Code-level error, if execution failed
    pub error: Option<VmError>,
    /// Rejection reason, if the transaction was not executed at all
    pub consensus_error: Option<ConsensusError>,
}

impl ExecutionResult {
    /// Result for a transaction rejected before execution
    pub fn rejected(error: ConsensusError) -> Self {
        Self {
            consensus_error: Some(error),
            ..Self::default()
        }
    }

    /// Whether the transaction executed without a code error
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.consensus_error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(VmError::OutOfGas.to_string(), "out of gas");
        assert_eq!(VmError::Depth.to_string(), "max call depth exceeded");
        assert_eq!(
            VmError::InsufficientBalance.to_string(),
            "insufficient balance for transfer"
        );
        assert_eq!(
            VmError::ContractAddressCollision.to_string(),
            "contract address collision"
        );
        assert_eq!(VmError::InvalidOpcode(0xfe).to_string(), "invalid opcode 0xfe");
        assert_eq!(VmError::WriteProtection.to_string(), "write protection");
        assert_eq!(
            VmError::CodeStoreOutOfGas.to_string(),
            "contract creation code storage out of gas"
        );
        assert_eq!(
            VmError::Precompile(PrecompileError::BadPairingInput).to_string(),
            "bad elliptic curve pairing size"
        );
    }

    #[test]
    fn test_consensus_display() {
        assert_eq!(ConsensusError::NonceTooHigh.to_string(), "nonce too high");
        assert_eq!(ConsensusError::NonceTooLow.to_string(), "nonce too low");
        assert_eq!(
            ConsensusError::InsufficientBalanceForGas.to_string(),
            "insufficient balance to pay for gas"
        );
        assert_eq!(
            ConsensusError::IntrinsicGasTooLow.to_string(),
            "intrinsic gas too low"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(VmError::Aborted.is_fatal());
        assert!(VmError::Internal(InternalError::StackUnderflow).is_fatal());
        assert!(!VmError::OutOfGas.is_fatal());
        assert!(!VmError::ExecutionReverted.is_fatal());
        assert!(!VmError::StackUnderflow { len: 0, required: 1 }.is_fatal());
    }

    #[test]
    fn test_result_helpers() {
        let rejected = ExecutionResult::rejected(ConsensusError::NonceTooLow);
        assert!(!rejected.is_success());
        assert_eq!(rejected.gas_used, 0);
        assert!(ExecutionResult::default().is_success());
    }
}
