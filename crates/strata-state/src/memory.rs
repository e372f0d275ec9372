//! In-memory authoritative state

use crate::account::Account;
use crate::changes::{AccountChange, StateChanges};
use crate::error::StateResult;
use crate::traits::StateReader;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use strata_crypto::keccak256;
use strata_primitives::{Address, H256, U256};
use tracing::trace;

/// Authoritative account state held in memory.
///
/// Maps are ordered so iteration, and with it [`InMemoryState::state_root`],
/// is deterministic.
#[derive(Clone, Debug, Default)]
pub struct InMemoryState {
    accounts: BTreeMap<Address, Account>,
    storage: BTreeMap<Address, BTreeMap<H256, H256>>,
    code: HashMap<H256, Arc<[u8]>>,
}

impl InMemoryState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account together with its code and storage
    pub fn insert_account(
        &mut self,
        address: Address,
        balance: U256,
        nonce: u64,
        code: Vec<u8>,
        storage: impl IntoIterator<Item = (H256, H256)>,
    ) {
        let code_hash = self.insert_code(code);
        self.accounts.insert(address, Account { nonce, balance, code_hash });
        let slots: BTreeMap<H256, H256> = storage.into_iter().filter(|(_, v)| !v.is_zero()).collect();
        if slots.is_empty() {
            self.storage.remove(&address);
        } else {
            self.storage.insert(address, slots);
        }
    }

    fn insert_code(&mut self, code: Vec<u8>) -> H256 {
        if code.is_empty() {
            return crate::EMPTY_CODE_HASH;
        }
        let hash = keccak256(&code);
        self.code.entry(hash).or_insert_with(|| Arc::from(code));
        hash
    }

    /// Account by address
    pub fn get_account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Storage value by address and slot
    pub fn get_storage(&self, address: &Address, key: &H256) -> H256 {
        self.storage
            .get(address)
            .and_then(|slots| slots.get(key))
            .copied()
            .unwrap_or(H256::ZERO)
    }

    /// Number of accounts
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Apply a change set produced by an execution rooted at this state
    /// (or at a state differing only in commuting balance/nonce deltas).
    pub fn apply(&mut self, changes: &StateChanges) {
        for (address, change) in &changes.accounts {
            match change {
                AccountChange::Deleted => {
                    trace!(%address, "delete account");
                    self.accounts.remove(address);
                    self.storage.remove(address);
                }
                AccountChange::Updated(update) => {
                    if update.storage_reset {
                        self.storage.remove(address);
                    }
                    if let Some((hash, code)) = &update.code {
                        self.code.entry(*hash).or_insert_with(|| code.clone());
                    }
                    let account = self.accounts.entry(*address).or_default();
                    account.balance = account.balance.overflowing_add(update.balance_delta).0;
                    account.nonce = account.nonce.wrapping_add(update.nonce_delta);
                    if let Some((hash, _)) = &update.code {
                        account.code_hash = *hash;
                    }
                    if !update.storage.is_empty() {
                        let slots = self.storage.entry(*address).or_default();
                        for (key, value) in &update.storage {
                            if value.is_zero() {
                                slots.remove(key);
                            } else {
                                slots.insert(*key, *value);
                            }
                        }
                        if slots.is_empty() {
                            self.storage.remove(address);
                        }
                    }
                }
            }
        }
    }

    /// Deterministic digest of the whole state.
    ///
    /// This is a flat keccak commitment over the canonically ordered
    /// contents, not a Merkle-Patricia root.
    pub fn state_root(&self) -> H256 {
        let mut buf = Vec::with_capacity(self.accounts.len() * 124);
        for (address, account) in &self.accounts {
            let mut balance = [0u8; 32];
            account.balance.to_big_endian(&mut balance);
            buf.extend_from_slice(address.as_bytes());
            buf.extend_from_slice(&account.nonce.to_be_bytes());
            buf.extend_from_slice(&balance);
            buf.extend_from_slice(account.code_hash.as_bytes());
            buf.extend_from_slice(self.storage_digest(address).as_bytes());
        }
        keccak256(&buf)
    }

    fn storage_digest(&self, address: &Address) -> H256 {
        match self.storage.get(address) {
            Some(slots) => {
                let mut buf = Vec::with_capacity(slots.len() * 64);
                for (key, value) in slots {
                    buf.extend_from_slice(key.as_bytes());
                    buf.extend_from_slice(value.as_bytes());
                }
                keccak256(&buf)
            }
            None => H256::ZERO,
        }
    }
}

impl StateReader for InMemoryState {
    fn account(&self, address: &Address) -> StateResult<Option<Account>> {
        Ok(self.accounts.get(address).cloned())
    }

    fn storage(&self, address: &Address, key: &H256) -> StateResult<H256> {
        Ok(self.get_storage(address, key))
    }

    fn code(&self, code_hash: &H256) -> StateResult<Option<Arc<[u8]>>> {
        Ok(self.code.get(code_hash).cloned())
    }
}
