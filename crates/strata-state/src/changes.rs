//! Mergeable per-execution state changes

use std::collections::BTreeMap;
use std::sync::Arc;
use strata_primitives::{Address, H256, U256};

/// Effect of an execution on one account.
///
/// Balance and nonce are deltas modulo their width, so applying the changes
/// of several executions that only credited or debited the same account
/// commutes, while applying the changes of a single execution reproduces its
/// absolute result exactly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountChange {
    /// Account removed (self-destructed or cleared as empty)
    Deleted,
    /// Account created or modified
    Updated(AccountUpdate),
}

/// Field-level modifications of a live account
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountUpdate {
    /// Storage of the base account must be discarded before applying
    pub storage_reset: bool,
    /// `new_balance - old_balance` modulo 2^256
    pub balance_delta: U256,
    /// `new_nonce - old_nonce` modulo 2^64
    pub nonce_delta: u64,
    /// Newly installed code
    pub code: Option<(H256, Arc<[u8]>)>,
    /// Final value of each written slot
    pub storage: BTreeMap<H256, H256>,
}

/// Account-ordered change set produced by a journaled execution
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateChanges {
    /// Per-account effects
    pub accounts: BTreeMap<Address, AccountChange>,
}

impl StateChanges {
    /// Create an empty change set
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing changed
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Number of touched accounts
    pub fn len(&self) -> usize {
        self.accounts.len()
    }
}
