//! Journaled state overlay
//!
//! [`JournaledState`] layers the mutations of one or more transactions over a
//! read-only [`StateReader`]. Every mutation records an undo entry so nested
//! call frames can be rolled back, and [`JournaledState::finalise`] commits a
//! transaction boundary. The accumulated effect is extracted with
//! [`JournaledState::into_changes`].

use crate::account::{Account, Log, EMPTY_CODE_HASH};
use crate::changes::{AccountChange, AccountUpdate, StateChanges};
use crate::error::StateError;
use crate::traits::{Snapshot, StateDb, StateReader};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use strata_crypto::keccak256;
use strata_primitives::{Address, H256, U256};
use tracing::{trace, warn};

#[derive(Debug)]
struct CachedAccount {
    /// As read from the backend
    original: Option<Account>,
    current: Option<Account>,
    /// Slots written in the current transaction
    storage: HashMap<H256, H256>,
    /// Slots written by finalised transactions
    committed: HashMap<H256, H256>,
    /// Storage wiped in the current transaction
    storage_reset: bool,
    /// Storage wiped by a finalised transaction
    committed_reset: bool,
    suicided: bool,
    touched: bool,
}

impl CachedAccount {
    fn new(original: Option<Account>) -> Self {
        Self {
            current: original.clone(),
            original,
            storage: HashMap::new(),
            committed: HashMap::new(),
            storage_reset: false,
            committed_reset: false,
            suicided: false,
            touched: false,
        }
    }
}

#[derive(Debug)]
enum JournalEntry {
    AccountChanged {
        address: Address,
        prev: Option<Account>,
    },
    StorageChanged {
        address: Address,
        key: H256,
        prev: Option<H256>,
    },
    StorageReset {
        address: Address,
        prev_storage: HashMap<H256, H256>,
        prev_reset: bool,
    },
    Suicided {
        address: Address,
        prev: bool,
    },
    Touched {
        address: Address,
    },
    RefundChanged {
        prev: u64,
    },
    LogAdded,
}

/// Mutable, revertible view over a [`StateReader`].
pub struct JournaledState<'a> {
    backend: &'a dyn StateReader,
    accounts: HashMap<Address, CachedAccount>,
    code_cache: HashMap<H256, Arc<[u8]>>,
    journal: Vec<JournalEntry>,
    logs: Vec<Log>,
    refund: u64,
    error: Option<StateError>,
}

impl<'a> JournaledState<'a> {
    /// Create an overlay with no pending changes
    pub fn new(backend: &'a dyn StateReader) -> Self {
        Self {
            backend,
            accounts: HashMap::new(),
            code_cache: HashMap::new(),
            journal: Vec::new(),
            logs: Vec::new(),
            refund: 0,
            error: None,
        }
    }

    /// Commit a transaction boundary.
    ///
    /// Destroyed accounts are removed, and with `delete_empty` (EIP-158) so
    /// are empty accounts touched by the transaction. The journal, refund
    /// counter and logs are cleared; the logs are returned.
    pub fn finalise(&mut self, delete_empty: bool) -> Vec<Log> {
        for (address, account) in self.accounts.iter_mut() {
            let remove = account.suicided
                || (delete_empty
                    && account.touched
                    && account.current.as_ref().map_or(false, Account::is_empty));
            if remove {
                trace!(%address, suicided = account.suicided, "finalise: delete account");
                account.current = None;
                account.storage.clear();
                account.committed.clear();
                account.storage_reset = false;
                account.committed_reset = true;
                account.suicided = false;
            } else {
                if account.storage_reset {
                    account.committed.clear();
                    account.committed_reset = true;
                    account.storage_reset = false;
                }
                account.committed.extend(account.storage.drain());
            }
            account.touched = false;
        }
        self.journal.clear();
        self.refund = 0;
        std::mem::take(&mut self.logs)
    }

    /// Net effect of everything executed on this overlay.
    ///
    /// Pending (unfinalised) writes are included, but destroyed and touched
    /// empty accounts are only removed by [`JournaledState::finalise`].
    pub fn into_changes(self) -> StateChanges {
        let mut changes = BTreeMap::new();
        for (address, account) in self.accounts {
            let (storage_reset, slots) = if account.storage_reset {
                (true, account.storage)
            } else {
                let mut slots = account.committed;
                slots.extend(account.storage);
                (account.committed_reset, slots)
            };

            let current = match account.current {
                Some(current) => current,
                None => {
                    if account.original.is_some() {
                        changes.insert(address, AccountChange::Deleted);
                    }
                    continue;
                }
            };

            let created = account.original.is_none();
            let base = account.original.unwrap_or_default();
            let code = if current.code_hash != base.code_hash {
                let bytes = if current.code_hash == EMPTY_CODE_HASH {
                    Arc::from(Vec::new())
                } else {
                    match self.code_cache.get(&current.code_hash) {
                        Some(code) => code.clone(),
                        None => Arc::from(Vec::new()),
                    }
                };
                Some((current.code_hash, bytes))
            } else {
                None
            };

            let update = AccountUpdate {
                storage_reset,
                balance_delta: current.balance.overflowing_sub(base.balance).0,
                nonce_delta: current.nonce.wrapping_sub(base.nonce),
                code,
                storage: slots.into_iter().collect(),
            };
            if !created && update == AccountUpdate::default() {
                continue;
            }
            changes.insert(address, AccountChange::Updated(update));
        }
        StateChanges { accounts: changes }
    }

    fn record_error(&mut self, error: StateError) {
        if self.error.is_none() {
            warn!(%error, "state backend failure");
            self.error = Some(error);
        }
    }

    fn load(&mut self, address: &Address) -> &mut CachedAccount {
        let backend = self.backend;
        let error = &mut self.error;
        self.accounts.entry(*address).or_insert_with(|| {
            let original = match backend.account(address) {
                Ok(account) => account,
                Err(e) => {
                    if error.is_none() {
                        warn!(error = %e, "state backend failure");
                        *error = Some(e);
                    }
                    None
                }
            };
            CachedAccount::new(original)
        })
    }

    fn current(&mut self, address: &Address) -> Option<Account> {
        self.load(address).current.clone()
    }

    fn touch(&mut self, address: &Address) {
        let account = self.load(address);
        if !account.touched {
            account.touched = true;
            self.journal.push(JournalEntry::Touched { address: *address });
        }
    }

    /// Materialise the account if absent and return a mutable handle,
    /// journaling its previous value.
    fn modify(&mut self, address: &Address) -> &mut Account {
        self.touch(address);
        let prev = self.current(address);
        self.journal.push(JournalEntry::AccountChanged {
            address: *address,
            prev: prev.clone(),
        });
        let account = self.load(address);
        account.current.get_or_insert_with(Account::default)
    }

    fn ensure_exists(&mut self, address: &Address) {
        if self.current(address).is_none() {
            self.modify(address);
        } else {
            self.touch(address);
        }
    }

    fn code_by_hash(&mut self, address: &Address, code_hash: H256) -> Arc<[u8]> {
        if code_hash == EMPTY_CODE_HASH {
            return Arc::from(Vec::new());
        }
        if let Some(code) = self.code_cache.get(&code_hash) {
            return code.clone();
        }
        match self.backend.code(&code_hash) {
            Ok(Some(code)) => {
                self.code_cache.insert(code_hash, code.clone());
                code
            }
            Ok(None) => {
                self.record_error(StateError::MissingCode {
                    address: *address,
                    code_hash,
                });
                Arc::from(Vec::new())
            }
            Err(e) => {
                self.record_error(e);
                Arc::from(Vec::new())
            }
        }
    }

    fn committed_value(&mut self, address: &Address, key: &H256) -> H256 {
        let account = self.load(address);
        if let Some(value) = account.committed.get(key) {
            return *value;
        }
        if account.committed_reset || account.original.is_none() {
            return H256::ZERO;
        }
        match self.backend.storage(address, key) {
            Ok(value) => value,
            Err(e) => {
                self.record_error(e);
                H256::ZERO
            }
        }
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::AccountChanged { address, prev } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.current = prev;
                }
            }
            JournalEntry::StorageChanged { address, key, prev } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    match prev {
                        Some(value) => account.storage.insert(key, value),
                        None => account.storage.remove(&key),
                    };
                }
            }
            JournalEntry::StorageReset {
                address,
                prev_storage,
                prev_reset,
            } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.storage = prev_storage;
                    account.storage_reset = prev_reset;
                }
            }
            JournalEntry::Suicided { address, prev } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.suicided = prev;
                }
            }
            JournalEntry::Touched { address } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.touched = false;
                }
            }
            JournalEntry::RefundChanged { prev } => self.refund = prev,
            JournalEntry::LogAdded => {
                self.logs.pop();
            }
        }
    }
}

impl StateDb for JournaledState<'_> {
    fn get_balance(&mut self, address: &Address) -> U256 {
        self.current(address).map(|a| a.balance).unwrap_or_default()
    }

    fn add_balance(&mut self, address: &Address, amount: U256) {
        if amount.is_zero() {
            self.ensure_exists(address);
            return;
        }
        let account = self.modify(address);
        account.balance = account.balance.overflowing_add(amount).0;
    }

    fn sub_balance(&mut self, address: &Address, amount: U256) {
        if amount.is_zero() {
            self.ensure_exists(address);
            return;
        }
        let account = self.modify(address);
        account.balance = account.balance.overflowing_sub(amount).0;
    }

    fn get_nonce(&mut self, address: &Address) -> u64 {
        self.current(address).map(|a| a.nonce).unwrap_or_default()
    }

    fn set_nonce(&mut self, address: &Address, nonce: u64) {
        self.modify(address).nonce = nonce;
    }

    fn increment_nonce(&mut self, address: &Address) {
        let account = self.modify(address);
        account.nonce = account.nonce.wrapping_add(1);
    }

    fn get_code(&mut self, address: &Address) -> Arc<[u8]> {
        match self.current(address) {
            Some(account) => self.code_by_hash(address, account.code_hash),
            None => Arc::from(Vec::new()),
        }
    }

    fn set_code(&mut self, address: &Address, code: Vec<u8>) {
        let code_hash = if code.is_empty() {
            EMPTY_CODE_HASH
        } else {
            keccak256(&code)
        };
        self.code_cache
            .entry(code_hash)
            .or_insert_with(|| Arc::from(code));
        self.modify(address).code_hash = code_hash;
    }

    fn get_code_hash(&mut self, address: &Address) -> H256 {
        self.current(address)
            .map(|a| a.code_hash)
            .unwrap_or(H256::ZERO)
    }

    fn get_code_size(&mut self, address: &Address) -> usize {
        self.get_code(address).len()
    }

    fn get_state(&mut self, address: &Address, key: &H256) -> H256 {
        let account = self.load(address);
        if account.current.is_none() {
            return H256::ZERO;
        }
        if let Some(value) = account.storage.get(key) {
            return *value;
        }
        if account.storage_reset {
            return H256::ZERO;
        }
        self.committed_value(address, key)
    }

    fn set_state(&mut self, address: &Address, key: H256, value: H256) {
        self.ensure_exists(address);
        let account = self.load(address);
        let prev = account.storage.insert(key, value);
        self.journal.push(JournalEntry::StorageChanged {
            address: *address,
            key,
            prev,
        });
    }

    fn get_committed_state(&mut self, address: &Address, key: &H256) -> H256 {
        let account = self.load(address);
        if account.current.is_none() || account.storage_reset {
            return H256::ZERO;
        }
        self.committed_value(address, key)
    }

    fn exist(&mut self, address: &Address) -> bool {
        self.current(address).is_some()
    }

    fn empty(&mut self, address: &Address) -> bool {
        self.current(address).map_or(true, |a| a.is_empty())
    }

    fn create_account(&mut self, address: &Address) {
        let balance = self.get_balance(address);
        *self.modify(address) = Account::with_balance(balance);
        let account = self.load(address);
        let prev_storage = std::mem::take(&mut account.storage);
        let prev_reset = account.storage_reset;
        account.storage_reset = true;
        self.journal.push(JournalEntry::StorageReset {
            address: *address,
            prev_storage,
            prev_reset,
        });
    }

    fn suicide(&mut self, address: &Address) -> bool {
        if self.current(address).is_none() {
            return false;
        }
        let account = self.load(address);
        let prev = account.suicided;
        account.suicided = true;
        self.journal.push(JournalEntry::Suicided {
            address: *address,
            prev,
        });
        self.modify(address).balance = U256::zero();
        true
    }

    fn has_suicided(&mut self, address: &Address) -> bool {
        let account = self.load(address);
        account.current.is_some() && account.suicided
    }

    fn add_log(&mut self, log: Log) {
        self.logs.push(log);
        self.journal.push(JournalEntry::LogAdded);
    }

    fn logs(&self) -> &[Log] {
        &self.logs
    }

    fn add_refund(&mut self, gas: u64) {
        self.journal.push(JournalEntry::RefundChanged { prev: self.refund });
        self.refund = self.refund.saturating_add(gas);
    }

    fn sub_refund(&mut self, gas: u64) {
        self.journal.push(JournalEntry::RefundChanged { prev: self.refund });
        if gas > self.refund {
            warn!(refund = self.refund, gas, "refund counter below zero, saturating");
            self.refund = 0;
        } else {
            self.refund -= gas;
        }
    }

    fn get_refund(&self) -> u64 {
        self.refund
    }

    fn snapshot(&mut self) -> Snapshot {
        self.journal.len()
    }

    fn revert_to_snapshot(&mut self, snapshot: Snapshot) {
        while self.journal.len() > snapshot {
            if let Some(entry) = self.journal.pop() {
                self.undo(entry);
            }
        }
    }

    fn db_error(&self) -> Option<&StateError> {
        self.error.as_ref()
    }
}
