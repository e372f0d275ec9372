//! Error types for the scheduler

use strata_evm::FatalError;
use thiserror::Error;

/// Scheduler errors
///
/// Any of these aborts the block transition; nothing is committed.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A transaction hit a state backend or engine failure
    #[error("transaction {index} failed fatally: {source}")]
    Fatal {
        /// Block position of the transaction
        index: usize,
        /// Underlying failure
        #[source]
        source: FatalError,
    },

    /// The sequential replay kept conflicting with the parallel set
    #[error("sequential replay did not converge after {attempts} attempts")]
    ReplayDidNotConverge {
        /// Replays performed
        attempts: usize,
    },

    /// Cumulative gas exceeded the block gas limit
    #[error("block gas limit {limit} exceeded at transaction {index} (cumulative {cumulative})")]
    BlockGasLimitExceeded {
        /// Block position of the offending transaction
        index: usize,
        /// Gas used up to and including it, saturated
        cumulative: u64,
        /// Block gas limit
        limit: u64,
    },

    /// A transaction ended the transition without a result
    #[error("no result for transaction {0}")]
    MissingResult(usize),

    /// The conflict detector thread is gone
    #[error("conflict detector stopped")]
    DetectorStopped,

    /// A worker thread could not be started
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// The execution pool could not be built
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedulerError::Fatal {
            index: 3,
            source: FatalError::Aborted,
        };
        assert_eq!(err.to_string(), "transaction 3 failed fatally: execution aborted");

        let err = SchedulerError::ReplayDidNotConverge { attempts: 5 };
        assert!(err.to_string().contains("5 attempts"));

        let err = SchedulerError::BlockGasLimitExceeded {
            index: 1,
            cumulative: 30_001,
            limit: 30_000,
        };
        assert!(err.to_string().contains("30000"));
    }
}
