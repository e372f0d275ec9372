//! # strata-state
//!
//! Account state for the Strata execution engine.
//!
//! This crate provides:
//! - [`StateReader`]: read access to authoritative state
//! - [`StateDb`]: the interface the VM executes against
//! - [`JournaledState`]: a revertible overlay producing [`StateChanges`]
//! - [`InMemoryState`]: the authoritative in-memory backend

#![warn(missing_docs)]
#![warn(clippy::all)]

mod account;
mod changes;
mod error;
mod journal;
mod memory;
mod traits;

pub use account::{Account, Log, EMPTY_CODE_HASH};
pub use changes::{AccountChange, AccountUpdate, StateChanges};
pub use error::{StateError, StateResult};
pub use journal::JournaledState;
pub use memory::InMemoryState;
pub use traits::{Snapshot, StateDb, StateReader};
