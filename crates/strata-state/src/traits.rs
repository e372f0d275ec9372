//! State access traits

use crate::account::{Account, Log};
use crate::error::{StateError, StateResult};
use std::sync::Arc;
use strata_primitives::{Address, H256, U256};

/// Handle into the undo log of a [`StateDb`]
pub type Snapshot = usize;

/// Read access to authoritative state.
///
/// Shared by every speculative execution of a block, hence `Send + Sync`.
pub trait StateReader: Send + Sync {
    /// Get account by address
    fn account(&self, address: &Address) -> StateResult<Option<Account>>;

    /// Get storage value, zero when unset
    fn storage(&self, address: &Address, key: &H256) -> StateResult<H256>;

    /// Get contract code by hash
    fn code(&self, code_hash: &H256) -> StateResult<Option<Arc<[u8]>>>;
}

/// The state interface the VM executes against.
///
/// Methods are infallible from the VM's point of view. A backend failure is
/// recorded and surfaced through [`StateDb::db_error`]; callers must check it
/// before trusting any result computed on top of this state.
pub trait StateDb {
    /// Balance, zero for absent accounts
    fn get_balance(&mut self, address: &Address) -> U256;
    /// Credit an account, materialising it if absent
    fn add_balance(&mut self, address: &Address, amount: U256);
    /// Debit an account, materialising it if absent
    fn sub_balance(&mut self, address: &Address, amount: U256);

    /// Nonce, zero for absent accounts
    fn get_nonce(&mut self, address: &Address) -> u64;
    /// Overwrite the nonce
    fn set_nonce(&mut self, address: &Address, nonce: u64);
    /// Bump the nonce by one
    fn increment_nonce(&mut self, address: &Address);

    /// Code, empty for absent accounts
    fn get_code(&mut self, address: &Address) -> Arc<[u8]>;
    /// Install code
    fn set_code(&mut self, address: &Address, code: Vec<u8>);
    /// Code hash, zero for absent accounts
    fn get_code_hash(&mut self, address: &Address) -> H256;
    /// Code length
    fn get_code_size(&mut self, address: &Address) -> usize;

    /// Current value of a storage slot
    fn get_state(&mut self, address: &Address, key: &H256) -> H256;
    /// Write a storage slot
    fn set_state(&mut self, address: &Address, key: H256, value: H256);
    /// Value of a storage slot at the start of the current transaction
    fn get_committed_state(&mut self, address: &Address, key: &H256) -> H256;

    /// Whether the account exists
    fn exist(&mut self, address: &Address) -> bool;
    /// Whether the account is absent or empty (EIP-161)
    fn empty(&mut self, address: &Address) -> bool;
    /// Replace the account with a fresh one, keeping its balance
    fn create_account(&mut self, address: &Address);

    /// Mark the account destroyed and zero its balance.
    ///
    /// Returns false when the account does not exist.
    fn suicide(&mut self, address: &Address) -> bool;
    /// Whether the account was destroyed in the current transaction
    fn has_suicided(&mut self, address: &Address) -> bool;

    /// Append a log record
    fn add_log(&mut self, log: Log);
    /// Logs emitted by the current transaction
    fn logs(&self) -> &[Log];

    /// Increase the refund counter
    fn add_refund(&mut self, gas: u64);
    /// Decrease the refund counter
    fn sub_refund(&mut self, gas: u64);
    /// Current refund counter
    fn get_refund(&self) -> u64;

    /// Take a snapshot
    fn snapshot(&mut self) -> Snapshot;
    /// Undo every mutation since `snapshot`, including nested snapshots
    fn revert_to_snapshot(&mut self, snapshot: Snapshot);

    /// First backend failure observed, if any
    fn db_error(&self) -> Option<&StateError>;
}
