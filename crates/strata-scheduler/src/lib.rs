//! # strata-scheduler
//!
//! Optimistic parallel block execution for Strata.
//!
//! Transactions of a block are executed speculatively in parallel while a
//! conflict detector watches their state accesses. Transactions found to
//! interfere are replayed in block order afterwards, so the outcome equals
//! strictly sequential execution.
//!
//! Features:
//! - Conflict keys and operation records
//! - Conflict detection, run as an actor on its own thread
//! - A state wrapper turning state accesses into operations
//! - The two-phase block transition with receipts

#![warn(missing_docs)]
#![warn(clippy::all)]

mod actor;
mod config;
mod detector;
mod error;
mod key;
mod logging_state;
mod transition;

pub use actor::{ConflictFlag, DetectorHandle, Recorder};
pub use config::SchedulerConfig;
pub use detector::ConflictDetector;
pub use error::{SchedulerError, SchedulerResult};
pub use key::{Author, ConflictKey, Field, OpKind, Operation, TxId};
pub use logging_state::LoggingState;
pub use transition::{ParallelExecutor, Partition, Receipt, TransitionResult};
