//! Property tests for the journaled overlay

use proptest::prelude::*;
use std::collections::BTreeMap;
use strata_primitives::{Address, H256, U256};
use strata_state::{InMemoryState, JournaledState, StateDb};

#[derive(Clone, Debug)]
enum Op {
    Credit(u8, u64),
    Debit(u8, u64),
    Store(u8, u8, u64),
    Bump(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4, 1u64..1000).prop_map(|(a, v)| Op::Credit(a, v)),
        (0u8..4, 1u64..10).prop_map(|(a, v)| Op::Debit(a, v)),
        (0u8..4, 0u8..4, 0u64..3).prop_map(|(a, k, v)| Op::Store(a, k, v)),
        (0u8..4).prop_map(Op::Bump),
    ]
}

fn addr(n: u8) -> Address {
    Address::from_low_u64_be(n as u64 + 1)
}

fn genesis() -> InMemoryState {
    let mut state = InMemoryState::new();
    for n in 0..4u8 {
        state.insert_account(addr(n), U256::from(100), 1, vec![], []);
    }
    state
}

fn run(state: &mut JournaledState<'_>, ops: &[Op]) {
    for op in ops {
        match *op {
            Op::Credit(a, v) => state.add_balance(&addr(a), U256::from(v)),
            Op::Debit(a, v) => state.sub_balance(&addr(a), U256::from(v)),
            Op::Store(a, k, v) => {
                state.set_state(&addr(a), H256::from_low_u64_be(k as u64), H256::from_low_u64_be(v))
            }
            Op::Bump(a) => state.increment_nonce(&addr(a)),
        }
    }
}

fn view(state: &mut JournaledState<'_>) -> BTreeMap<(u8, u8), (U256, u64, H256)> {
    let mut out = BTreeMap::new();
    for a in 0..4u8 {
        for k in 0..4u8 {
            let value = state.get_state(&addr(a), &H256::from_low_u64_be(k as u64));
            out.insert((a, k), (state.get_balance(&addr(a)), state.get_nonce(&addr(a)), value));
        }
    }
    out
}

proptest! {
    #[test]
    fn reverted_suffix_leaves_no_trace(
        prefix in prop::collection::vec(op(), 0..20),
        suffix in prop::collection::vec(op(), 0..20),
    ) {
        let backend = genesis();

        let mut expected = JournaledState::new(&backend);
        run(&mut expected, &prefix);

        let mut state = JournaledState::new(&backend);
        run(&mut state, &prefix);
        let snapshot = state.snapshot();
        run(&mut state, &suffix);
        state.revert_to_snapshot(snapshot);

        prop_assert_eq!(view(&mut state), view(&mut expected));
    }

    #[test]
    fn applied_changes_match_overlay(ops in prop::collection::vec(op(), 0..30)) {
        let backend = genesis();
        let mut state = JournaledState::new(&backend);
        run(&mut state, &ops);
        state.finalise(true);
        let expected = view(&mut state);

        let mut applied = backend.clone();
        applied.apply(&state.into_changes());
        let mut reread = JournaledState::new(&applied);
        prop_assert_eq!(view(&mut reread), expected);
    }
}
