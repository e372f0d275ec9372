//! Block transition tests for strata-scheduler
//!
//! Tests cover:
//! - Partitioning of independent and interfering transactions
//! - Equivalence with strictly sequential execution
//! - Replay limits
//! - Randomised transfer blocks (proptest)

use proptest::prelude::*;
use strata_crypto::create_address;
use strata_evm::{BlockContext, ChainConfig, Fork, Transaction};
use strata_primitives::{Address, H256, U256};
use strata_scheduler::{ParallelExecutor, SchedulerConfig, SchedulerError, TransitionResult};
use strata_state::InMemoryState;

const COINBASE: Address = Address::from_low_u64_be(0xcb);
const COUNTER: Address = Address::from_low_u64_be(0xc001);
const OTHER_COUNTER: Address = Address::from_low_u64_be(0xc002);
const RELAY: Address = Address::from_low_u64_be(0xc003);

// PUSH1 0 SLOAD PUSH1 1 ADD PUSH1 0 SSTORE STOP
const INCREMENT: &str = "60005460010160005500";

fn sender(n: u64) -> Address {
    Address::from_low_u64_be(0x1000 + n)
}

fn executor(config: SchedulerConfig) -> ParallelExecutor {
    ParallelExecutor::new(ChainConfig::all_from_genesis(Fork::Petersburg), config).unwrap()
}

fn block() -> BlockContext {
    BlockContext {
        number: 10,
        coinbase: COINBASE,
        timestamp: 1_600_000_000,
        ..BlockContext::default()
    }
}

fn tx(from: Address, nonce: u64, to: Option<Address>, value: u64, input: Vec<u8>) -> Transaction {
    Transaction {
        from,
        to,
        nonce,
        value: U256::from(value),
        gas: 200_000,
        gas_price: U256::one(),
        input,
    }
}

/// Relay code: CALL `target` with all gas, no value, then STOP
fn relay_code(target: &Address) -> Vec<u8> {
    let mut code = hex::decode("6000600060006000600073").unwrap();
    code.extend_from_slice(target.as_bytes());
    code.extend_from_slice(&[0x5a, 0xf1, 0x50, 0x00]);
    code
}

fn genesis(senders: u64) -> InMemoryState {
    let mut state = InMemoryState::new();
    for n in 0..senders {
        state.insert_account(sender(n), U256::from(10u64.pow(12)), 0, Vec::new(), []);
    }
    let increment = hex::decode(INCREMENT).unwrap();
    state.insert_account(COUNTER, U256::zero(), 1, increment.clone(), []);
    state.insert_account(OTHER_COUNTER, U256::zero(), 1, increment, []);
    state.insert_account(RELAY, U256::zero(), 1, relay_code(&COUNTER), []);
    state
}

fn assert_matches_sequential(
    executor: &ParallelExecutor,
    base: &InMemoryState,
    txs: &[Transaction],
) -> TransitionResult {
    let parallel = executor.execute_block(base, &block(), txs).unwrap();
    let sequential = executor.execute_sequential(base, &block(), txs).unwrap();
    assert_eq!(parallel.receipts, sequential.receipts);
    assert_eq!(parallel.state_root, sequential.state_root);

    let mut all: Vec<usize> = parallel
        .partition
        .parallel
        .iter()
        .chain(&parallel.partition.sequential)
        .copied()
        .collect();
    all.sort_unstable();
    assert_eq!(all, (0..txs.len()).collect::<Vec<_>>());
    parallel
}

// ============================================================================
// Partitioning
// ============================================================================

#[test]
fn disjoint_contracts_run_in_parallel() {
    let base = genesis(2);
    let txs = vec![
        tx(sender(0), 0, Some(COUNTER), 0, Vec::new()),
        tx(sender(1), 0, Some(OTHER_COUNTER), 0, Vec::new()),
    ];
    let result = assert_matches_sequential(&executor(SchedulerConfig::default()), &base, &txs);

    assert_eq!(result.partition.parallel, vec![0, 1]);
    assert!(result.partition.sequential.is_empty());
    assert_eq!(result.state.get_storage(&COUNTER, &H256::ZERO), H256::from_low_u64_be(1));
    assert_eq!(result.state.get_storage(&OTHER_COUNTER, &H256::ZERO), H256::from_low_u64_be(1));
}

#[test]
fn shared_slot_is_serialized() {
    let base = genesis(3);
    let txs = vec![
        tx(sender(0), 0, Some(COUNTER), 0, Vec::new()),
        tx(sender(1), 0, Some(COUNTER), 0, Vec::new()),
        tx(sender(2), 0, Some(RELAY), 0, Vec::new()),
    ];
    let result = assert_matches_sequential(&executor(SchedulerConfig::default()), &base, &txs);

    assert_eq!(result.partition.sequential, vec![0, 1, 2]);
    // three increments, not one
    assert_eq!(result.state.get_storage(&COUNTER, &H256::ZERO), H256::from_low_u64_be(3));
}

#[test]
fn mixed_block_keeps_independent_transactions_parallel() {
    let base = genesis(4);
    let txs = vec![
        tx(sender(0), 0, Some(COUNTER), 0, Vec::new()),
        tx(sender(1), 0, Some(OTHER_COUNTER), 0, Vec::new()),
        tx(sender(2), 0, Some(COUNTER), 0, Vec::new()),
        tx(sender(3), 0, Some(Address::from_low_u64_be(0x9999)), 5, Vec::new()),
    ];
    let result = assert_matches_sequential(&executor(SchedulerConfig::default()), &base, &txs);

    assert_eq!(result.partition.parallel, vec![1, 3]);
    assert_eq!(result.partition.sequential, vec![0, 2]);
    assert_eq!(result.receipts[3].cumulative_gas_used, result.receipts.iter().map(|r| r.gas_used).sum::<u64>());
}

#[test]
fn transfer_chain_matches_sequential() {
    let base = genesis(4);
    // each transfer funds the next sender
    let txs = vec![
        tx(sender(0), 0, Some(sender(1)), 1000, Vec::new()),
        tx(sender(1), 0, Some(sender(2)), 1000, Vec::new()),
        tx(sender(2), 0, Some(sender(3)), 1000, Vec::new()),
        tx(sender(0), 1, Some(sender(3)), 7, Vec::new()),
    ];
    let result = assert_matches_sequential(&executor(SchedulerConfig::default()), &base, &txs);
    assert!(result.receipts.iter().all(|r| r.success));
}

#[test]
fn contract_creations_are_independent() {
    let base = genesis(2);
    // PUSH1 1 PUSH1 0 RETURN: deploys the single byte 0x00
    let init = hex::decode("60016000f3").unwrap();
    let txs = vec![
        tx(sender(0), 0, None, 0, init.clone()),
        tx(sender(1), 0, None, 0, init),
    ];
    let result = assert_matches_sequential(&executor(SchedulerConfig::default()), &base, &txs);

    assert_eq!(result.partition.parallel, vec![0, 1]);
    assert_eq!(result.receipts[0].contract_address, Some(create_address(&sender(0), 0)));
    assert_eq!(result.receipts[1].contract_address, Some(create_address(&sender(1), 0)));
}

#[test]
fn repeated_runs_are_deterministic() {
    let base = genesis(4);
    let txs: Vec<_> = (0..4)
        .map(|n| tx(sender(n), 0, Some(if n % 2 == 0 { COUNTER } else { RELAY }), 0, Vec::new()))
        .collect();
    let executor = executor(SchedulerConfig::default());
    let first = executor.execute_block(&base, &block(), &txs).unwrap();
    for _ in 0..5 {
        let again = executor.execute_block(&base, &block(), &txs).unwrap();
        assert_eq!(again.state_root, first.state_root);
        assert_eq!(again.receipts, first.receipts);
    }
}

/// Gate code: with calldata, store 1 in slot 0; without, relay to COUNTER
/// when slot 0 is set
fn gate_code() -> Vec<u8> {
    // CALLDATASIZE PUSH1 47 JUMPI PUSH1 0 SLOAD PUSH1 11 JUMPI STOP JUMPDEST
    let mut code = vec![0x36, 0x60, 47, 0x57, 0x60, 0x00, 0x54, 0x60, 11, 0x57, 0x00, 0x5b];
    code.extend(relay_code(&COUNTER));
    // JUMPDEST PUSH1 1 PUSH1 0 SSTORE STOP
    code.extend_from_slice(&[0x5b, 0x60, 0x01, 0x60, 0x00, 0x55, 0x00]);
    code
}

#[test]
fn replay_pulls_in_parallel_transactions() {
    const GATE: Address = Address::from_low_u64_be(0xc004);
    let mut base = genesis(3);
    let code = gate_code();
    assert_eq!(code[47], 0x5b);
    base.insert_account(GATE, U256::zero(), 1, code, []);

    let txs = vec![
        tx(sender(0), 0, Some(GATE), 0, vec![0x01]),
        tx(sender(1), 0, Some(GATE), 0, Vec::new()),
        tx(sender(2), 0, Some(COUNTER), 0, Vec::new()),
    ];
    let result = assert_matches_sequential(&executor(SchedulerConfig::default()), &base, &txs);

    // the replayed read of the gate reaches COUNTER and drags tx 2 along
    assert!(result.partition.parallel.is_empty());
    assert_eq!(result.partition.sequential, vec![0, 1, 2]);
    assert_eq!(result.replays, 2);
    assert_eq!(result.state.get_storage(&COUNTER, &H256::ZERO), H256::from_low_u64_be(2));
    assert_eq!(result.state.get_storage(&GATE, &H256::ZERO), H256::from_low_u64_be(1));
}

// ============================================================================
// Limits
// ============================================================================

#[test]
fn replay_limit_is_enforced() {
    let base = genesis(2);
    let txs = vec![
        tx(sender(0), 0, Some(COUNTER), 0, Vec::new()),
        tx(sender(1), 0, Some(COUNTER), 0, Vec::new()),
    ];
    let config = SchedulerConfig {
        max_replays: Some(0),
        ..SchedulerConfig::default()
    };
    let err = executor(config).execute_block(&base, &block(), &txs).unwrap_err();
    assert!(matches!(err, SchedulerError::ReplayDidNotConverge { attempts: 0 }));
}

#[test]
fn single_worker_still_partitions() {
    let base = genesis(2);
    let txs = vec![
        tx(sender(0), 0, Some(COUNTER), 0, Vec::new()),
        tx(sender(1), 0, Some(OTHER_COUNTER), 0, Vec::new()),
    ];
    let config = SchedulerConfig {
        worker_threads: 1,
        ..SchedulerConfig::default()
    };
    let result = assert_matches_sequential(&executor(config), &base, &txs);
    assert_eq!(result.partition.parallel, vec![0, 1]);
}

// ============================================================================
// Randomised blocks
// ============================================================================

fn transfer_block(moves: &[(u64, u64, u64)]) -> Vec<Transaction> {
    let mut nonces = [0u64; 4];
    moves
        .iter()
        .map(|&(from, to, value)| {
            let nonce = nonces[from as usize];
            nonces[from as usize] += 1;
            tx(sender(from), nonce, Some(sender(to)), value, Vec::new())
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn random_transfers_match_sequential(
        moves in prop::collection::vec((0u64..4, 0u64..6, 0u64..1000), 0..12),
    ) {
        let base = genesis(4);
        let txs = transfer_block(&moves);
        let executor = executor(SchedulerConfig { worker_threads: 4, ..SchedulerConfig::default() });
        let parallel = executor.execute_block(&base, &block(), &txs).unwrap();
        let sequential = executor.execute_sequential(&base, &block(), &txs).unwrap();
        prop_assert_eq!(parallel.state_root, sequential.state_root);
        prop_assert_eq!(parallel.receipts, sequential.receipts);
    }
}
