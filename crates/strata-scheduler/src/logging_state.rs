//! State wrapper recording every access as an operation
//!
//! Account-level accesses use the [`Field::Account`](crate::key::Field) key;
//! field reads are recorded only for existing accounts, since an absent
//! account is already covered by its account-level read.

use crate::actor::Recorder;
use crate::key::{ConflictKey, OpKind};
use std::sync::Arc;
use strata_primitives::{Address, H256, U256};
use strata_state::{Log, Snapshot, StateDb, StateError};

/// [`StateDb`] decorator feeding a [`Recorder`]
pub struct LoggingState<S> {
    inner: S,
    recorder: Recorder,
}

impl<S: StateDb> LoggingState<S> {
    /// Wrap `inner`
    pub fn new(inner: S, recorder: Recorder) -> Self {
        Self { inner, recorder }
    }

    /// Wrapped state
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Wrapped state, bypassing the recorder
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Operation sink
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Split into the wrapped state and the recorder
    pub fn into_parts(self) -> (S, Recorder) {
        (self.inner, self.recorder)
    }

    fn on_get_account(&mut self, address: &Address) {
        self.recorder.record(OpKind::Read, ConflictKey::account(*address));
    }

    fn on_create_or_delete_account(&mut self, address: &Address) {
        self.recorder.record(OpKind::Write, ConflictKey::account(*address));
    }

    fn on_get_or_create_account(&mut self, address: &Address) {
        self.recorder
            .record(OpKind::DefaultInitialize, ConflictKey::account(*address));
    }

    fn on_field_read(&mut self, key: ConflictKey) {
        self.on_get_account(&key.address);
        if self.inner.exist(&key.address) {
            self.recorder.record(OpKind::Read, key);
        }
    }

    fn on_field_write(&mut self, key: ConflictKey) {
        self.on_get_or_create_account(&key.address);
        self.recorder.record(OpKind::Write, key);
    }

    fn on_balance_update(&mut self, address: &Address, amount: &U256) {
        self.on_get_or_create_account(address);
        if !amount.is_zero() {
            self.recorder
                .record(OpKind::ReadModifyWrite, ConflictKey::balance(*address));
        }
    }

    fn on_empty_check(&mut self, address: &Address) {
        self.recorder.record(OpKind::Read, ConflictKey::balance(*address));
        self.recorder.record(OpKind::Read, ConflictKey::nonce(*address));
        self.recorder.record(OpKind::Read, ConflictKey::code(*address));
    }
}

impl<S: StateDb> StateDb for LoggingState<S> {
    fn get_balance(&mut self, address: &Address) -> U256 {
        self.on_field_read(ConflictKey::balance(*address));
        self.inner.get_balance(address)
    }

    fn add_balance(&mut self, address: &Address, amount: U256) {
        self.on_balance_update(address, &amount);
        // 零值转账会触发 EIP-158 清理，依赖账户是否为空
        if amount.is_zero() {
            self.on_empty_check(address);
        }
        self.inner.add_balance(address, amount)
    }

    fn sub_balance(&mut self, address: &Address, amount: U256) {
        self.on_balance_update(address, &amount);
        self.inner.sub_balance(address, amount)
    }

    fn get_nonce(&mut self, address: &Address) -> u64 {
        self.on_field_read(ConflictKey::nonce(*address));
        self.inner.get_nonce(address)
    }

    fn set_nonce(&mut self, address: &Address, nonce: u64) {
        self.on_field_write(ConflictKey::nonce(*address));
        self.inner.set_nonce(address, nonce)
    }

    fn increment_nonce(&mut self, address: &Address) {
        self.on_get_or_create_account(address);
        self.recorder
            .record(OpKind::ReadModifyWrite, ConflictKey::nonce(*address));
        self.inner.increment_nonce(address)
    }

    fn get_code(&mut self, address: &Address) -> Arc<[u8]> {
        self.on_field_read(ConflictKey::code(*address));
        self.inner.get_code(address)
    }

    fn set_code(&mut self, address: &Address, code: Vec<u8>) {
        self.on_field_write(ConflictKey::code(*address));
        self.inner.set_code(address, code)
    }

    fn get_code_hash(&mut self, address: &Address) -> H256 {
        self.on_field_read(ConflictKey::code(*address));
        self.inner.get_code_hash(address)
    }

    fn get_code_size(&mut self, address: &Address) -> usize {
        self.on_field_read(ConflictKey::code(*address));
        self.inner.get_code_size(address)
    }

    fn get_state(&mut self, address: &Address, key: &H256) -> H256 {
        self.on_field_read(ConflictKey::storage(*address, *key));
        self.inner.get_state(address, key)
    }

    fn set_state(&mut self, address: &Address, key: H256, value: H256) {
        self.on_field_write(ConflictKey::storage(*address, key));
        self.inner.set_state(address, key, value)
    }

    fn get_committed_state(&mut self, address: &Address, key: &H256) -> H256 {
        self.on_field_read(ConflictKey::storage(*address, *key));
        self.inner.get_committed_state(address, key)
    }

    fn exist(&mut self, address: &Address) -> bool {
        self.on_get_account(address);
        self.inner.exist(address)
    }

    fn empty(&mut self, address: &Address) -> bool {
        self.on_get_account(address);
        if self.inner.exist(address) {
            self.on_empty_check(address);
        }
        self.inner.empty(address)
    }

    fn create_account(&mut self, address: &Address) {
        self.on_create_or_delete_account(address);
        // 已存在账户的余额被保留下来
        if self.inner.exist(address) {
            self.recorder.record(OpKind::Write, ConflictKey::balance(*address));
        }
        self.inner.create_account(address)
    }

    fn suicide(&mut self, address: &Address) -> bool {
        self.on_get_account(address);
        let suicided = self.inner.suicide(address);
        if suicided {
            self.on_create_or_delete_account(address);
        }
        suicided
    }

    fn has_suicided(&mut self, address: &Address) -> bool {
        self.on_get_account(address);
        self.inner.has_suicided(address)
    }

    fn add_log(&mut self, log: Log) {
        self.inner.add_log(log)
    }

    fn logs(&self) -> &[Log] {
        self.inner.logs()
    }

    fn add_refund(&mut self, gas: u64) {
        self.inner.add_refund(gas)
    }

    fn sub_refund(&mut self, gas: u64) {
        self.inner.sub_refund(gas)
    }

    fn get_refund(&self) -> u64 {
        self.inner.get_refund()
    }

    fn snapshot(&mut self) -> Snapshot {
        self.inner.snapshot()
    }

    fn revert_to_snapshot(&mut self, snapshot: Snapshot) {
        self.inner.revert_to_snapshot(snapshot)
    }

    fn db_error(&self) -> Option<&StateError> {
        self.inner.db_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::DetectorHandle;
    use crate::key::{Author, Operation};
    use strata_state::{InMemoryState, JournaledState};

    const ALICE: Address = Address::from_low_u64_be(0xa1);
    const BOB: Address = Address::from_low_u64_be(0xb0);

    fn backend() -> InMemoryState {
        let mut state = InMemoryState::new();
        state.insert_account(ALICE, U256::from(100), 1, Vec::new(), []);
        state
    }

    fn recorded(f: impl FnOnce(&mut LoggingState<JournaledState<'_>>)) -> Vec<Operation> {
        let backend = backend();
        let detector = DetectorHandle::spawn(1).unwrap();
        let mut state = LoggingState::new(JournaledState::new(&backend), detector.recorder(Author::tx(0)));
        f(&mut state);
        let (_, recorder) = state.into_parts();
        recorder.finish().unwrap()
    }

    fn kinds(ops: &[Operation]) -> Vec<(OpKind, ConflictKey)> {
        ops.iter().map(|op| (op.kind, op.key)).collect()
    }

    #[test]
    fn test_read_existing_account() {
        let ops = recorded(|state| {
            assert_eq!(state.get_balance(&ALICE), U256::from(100));
        });
        assert_eq!(
            kinds(&ops),
            vec![
                (OpKind::Read, ConflictKey::account(ALICE)),
                (OpKind::Read, ConflictKey::balance(ALICE)),
            ]
        );
    }

    #[test]
    fn test_read_absent_account() {
        let ops = recorded(|state| {
            assert_eq!(state.get_nonce(&BOB), 0);
        });
        assert_eq!(kinds(&ops), vec![(OpKind::Read, ConflictKey::account(BOB))]);
    }

    #[test]
    fn test_credit_is_commutative() {
        let ops = recorded(|state| state.add_balance(&BOB, U256::from(5)));
        assert_eq!(
            kinds(&ops),
            vec![
                (OpKind::DefaultInitialize, ConflictKey::account(BOB)),
                (OpKind::ReadModifyWrite, ConflictKey::balance(BOB)),
            ]
        );
    }

    #[test]
    fn test_zero_credit_checks_emptiness() {
        let ops = recorded(|state| state.add_balance(&BOB, U256::zero()));
        assert_eq!(
            kinds(&ops),
            vec![
                (OpKind::DefaultInitialize, ConflictKey::account(BOB)),
                (OpKind::Read, ConflictKey::balance(BOB)),
                (OpKind::Read, ConflictKey::nonce(BOB)),
                (OpKind::Read, ConflictKey::code(BOB)),
            ]
        );
    }

    #[test]
    fn test_storage_access() {
        let slot = H256::from_low_u64_be(3);
        let ops = recorded(|state| {
            state.set_state(&ALICE, slot, H256::from_low_u64_be(1));
            state.get_state(&ALICE, &slot);
            state.get_committed_state(&ALICE, &slot);
        });
        assert_eq!(
            kinds(&ops),
            vec![
                (OpKind::DefaultInitialize, ConflictKey::account(ALICE)),
                (OpKind::Write, ConflictKey::storage(ALICE, slot)),
                (OpKind::Read, ConflictKey::account(ALICE)),
                (OpKind::Read, ConflictKey::storage(ALICE, slot)),
            ]
        );
    }

    #[test]
    fn test_nonce_and_code() {
        let ops = recorded(|state| {
            state.increment_nonce(&ALICE);
            state.set_code(&ALICE, vec![0x00]);
            state.get_code_size(&ALICE);
        });
        assert!(kinds(&ops).contains(&(OpKind::ReadModifyWrite, ConflictKey::nonce(ALICE))));
        assert!(kinds(&ops).contains(&(OpKind::Write, ConflictKey::code(ALICE))));
        assert!(kinds(&ops).contains(&(OpKind::Read, ConflictKey::code(ALICE))));
    }

    #[test]
    fn test_suicide_writes_account() {
        let ops = recorded(|state| {
            assert!(state.suicide(&ALICE));
            assert!(!state.suicide(&BOB));
        });
        assert_eq!(
            kinds(&ops),
            vec![
                (OpKind::Read, ConflictKey::account(ALICE)),
                (OpKind::Write, ConflictKey::account(ALICE)),
                (OpKind::Read, ConflictKey::account(BOB)),
            ]
        );
    }

    #[test]
    fn test_create_existing_account() {
        let ops = recorded(|state| state.create_account(&ALICE));
        assert_eq!(
            kinds(&ops),
            vec![
                (OpKind::Write, ConflictKey::account(ALICE)),
                (OpKind::Write, ConflictKey::balance(ALICE)),
            ]
        );
    }

    #[test]
    fn test_passes_through() {
        let ops = recorded(|state| {
            let snapshot = state.snapshot();
            state.add_refund(10);
            assert_eq!(state.get_refund(), 10);
            state.revert_to_snapshot(snapshot);
            assert_eq!(state.get_refund(), 0);
            assert!(state.db_error().is_none());
        });
        assert!(ops.is_empty());
    }
}
