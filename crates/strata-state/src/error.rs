//! State error types

use strata_primitives::{Address, H256};
use thiserror::Error;

/// Failure of the authoritative state backend.
///
/// These are fatal for a block transition: nothing computed on top of a
/// failed read can be committed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Backend I/O failure
    #[error("state backend error: {0}")]
    Backend(String),

    /// Account references code the backend does not hold
    #[error("missing code {code_hash} for account {address}")]
    MissingCode {
        /// Account whose code was requested
        address: Address,
        /// Hash that could not be resolved
        code_hash: H256,
    },
}

/// Result type for state operations
pub type StateResult<T> = Result<T, StateError>;
