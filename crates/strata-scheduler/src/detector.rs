//! Conflict detection over operation records
//!
//! The detector is fed one [`Operation`] at a time, in a single order. It
//! keeps, per access kind, which authors touched each key. An incoming
//! operation clashes when a different author has logged a conflicting kind
//! on the same key; the key then becomes a conflict key and everyone who
//! touched it is marked. Marked authors are ignored until [`ConflictDetector::reset`].

use crate::key::{Author, ConflictKey, OpKind, Operation};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::trace;

/// Single-threaded conflict detector
#[derive(Debug, Default)]
pub struct ConflictDetector {
    /// Authors per key, indexed by [`OpKind::index`]
    log: [HashMap<ConflictKey, BTreeSet<Author>>; 4],
    conflict_keys: HashSet<ConflictKey>,
    conflicted: BTreeSet<Author>,
}

impl ConflictDetector {
    /// Create an empty detector
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one operation.
    ///
    /// Returns the authors marked conflicted by it, in ascending order.
    pub fn process(&mut self, op: Operation) -> Vec<Author> {
        if self.conflicted.contains(&op.author) {
            return Vec::new();
        }
        if self.conflict_keys.contains(&op.key) {
            return self.mark(BTreeSet::from([op.author]));
        }

        let clash = OpKind::ALL
            .iter()
            .filter(|kind| kind.conflicts_with(op.kind))
            .filter_map(|kind| self.log[kind.index()].get(&op.key))
            .any(|authors| authors.len() > 1 || !authors.contains(&op.author));

        if !clash {
            self.log[op.kind.index()]
                .entry(op.key)
                .or_default()
                .insert(op.author);
            return Vec::new();
        }

        trace!(key = %op.key, author = %op.author, kind = ?op.kind, "conflict");
        self.conflict_keys.insert(op.key);
        let mut authors = BTreeSet::from([op.author]);
        for by_key in self.log.iter_mut() {
            if let Some(touched) = by_key.remove(&op.key) {
                authors.extend(touched);
            }
        }
        self.mark(authors)
    }

    fn mark(&mut self, authors: BTreeSet<Author>) -> Vec<Author> {
        authors
            .into_iter()
            .filter(|author| self.conflicted.insert(*author))
            .collect()
    }

    /// Whether `author` has been marked in this round
    pub fn is_conflicted(&self, author: &Author) -> bool {
        self.conflicted.contains(author)
    }

    /// Authors marked so far
    pub fn conflicted(&self) -> &BTreeSet<Author> {
        &self.conflicted
    }

    /// Number of keys found in conflict
    pub fn conflict_key_count(&self) -> usize {
        self.conflict_keys.len()
    }

    /// Drain the conflicted set and forget all per-key tracking
    pub fn reset(&mut self) -> BTreeSet<Author> {
        for by_key in self.log.iter_mut() {
            by_key.clear();
        }
        self.conflict_keys.clear();
        std::mem::take(&mut self.conflicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_primitives::{Address, H256};

    fn key(n: u64) -> ConflictKey {
        ConflictKey::storage(Address::from_low_u64_be(0x100), H256::from_low_u64_be(n))
    }

    fn op(tx: usize, kind: OpKind, key: ConflictKey) -> Operation {
        Operation::new(Author::tx(tx), kind, key)
    }

    fn run(ops: impl IntoIterator<Item = Operation>) -> BTreeSet<Author> {
        let mut detector = ConflictDetector::new();
        for op in ops {
            detector.process(op);
        }
        detector.reset()
    }

    // ==================== No Conflict ====================

    #[test]
    fn test_shared_reads() {
        let conflicted = run([
            op(0, OpKind::Read, key(1)),
            op(1, OpKind::Read, key(1)),
            op(2, OpKind::Read, key(1)),
        ]);
        assert!(conflicted.is_empty());
    }

    #[test]
    fn test_commutative_updates() {
        let conflicted = run([
            op(0, OpKind::ReadModifyWrite, key(1)),
            op(1, OpKind::ReadModifyWrite, key(1)),
            op(0, OpKind::DefaultInitialize, key(2)),
            op(1, OpKind::DefaultInitialize, key(2)),
        ]);
        assert!(conflicted.is_empty());
    }

    #[test]
    fn test_single_author_never_conflicts() {
        let conflicted = run(OpKind::ALL.iter().map(|kind| op(3, *kind, key(1))));
        assert!(conflicted.is_empty());
    }

    #[test]
    fn test_disjoint_keys() {
        let conflicted = run([
            op(0, OpKind::Write, key(1)),
            op(1, OpKind::Write, key(2)),
            op(0, OpKind::Read, key(3)),
            op(1, OpKind::Write, key(4)),
        ]);
        assert!(conflicted.is_empty());
    }

    // ==================== Conflict ====================

    #[test]
    fn test_write_write() {
        let conflicted = run([op(0, OpKind::Write, key(1)), op(1, OpKind::Write, key(1))]);
        assert_eq!(conflicted, BTreeSet::from([Author::tx(0), Author::tx(1)]));
    }

    #[test]
    fn test_read_after_others_wrote() {
        let mut detector = ConflictDetector::new();
        assert!(detector.process(op(0, OpKind::Write, key(1))).is_empty());
        assert_eq!(
            detector.process(op(1, OpKind::Read, key(1))),
            vec![Author::tx(0), Author::tx(1)]
        );
        assert!(detector.is_conflicted(&Author::tx(0)));
        assert_eq!(detector.conflict_key_count(), 1);
    }

    #[test]
    fn test_write_after_shared_read() {
        // 1 and 2 both read; 1 writing clashes with 2's read
        let conflicted = run([
            op(1, OpKind::Read, key(1)),
            op(2, OpKind::Read, key(1)),
            op(1, OpKind::Write, key(1)),
        ]);
        assert_eq!(conflicted, BTreeSet::from([Author::tx(1), Author::tx(2)]));
    }

    #[test]
    fn test_all_touchers_are_marked() {
        let conflicted = run([
            op(0, OpKind::Read, key(1)),
            op(1, OpKind::Read, key(1)),
            op(2, OpKind::ReadModifyWrite, key(1)),
            op(3, OpKind::Read, key(2)),
        ]);
        assert_eq!(
            conflicted,
            BTreeSet::from([Author::tx(0), Author::tx(1), Author::tx(2)])
        );
    }

    #[test]
    fn test_late_toucher_of_conflict_key() {
        let mut detector = ConflictDetector::new();
        detector.process(op(0, OpKind::Write, key(1)));
        detector.process(op(1, OpKind::Write, key(1)));
        // a plain read of a conflict key is enough
        assert_eq!(detector.process(op(5, OpKind::Read, key(1))), vec![Author::tx(5)]);
    }

    #[test]
    fn test_conflicted_author_is_ignored() {
        let mut detector = ConflictDetector::new();
        detector.process(op(0, OpKind::Write, key(1)));
        detector.process(op(1, OpKind::Write, key(1)));
        // tx 0 no longer logs, so tx 2 stays clean
        assert!(detector.process(op(0, OpKind::Write, key(2))).is_empty());
        assert!(detector.process(op(2, OpKind::Read, key(2))).is_empty());
        assert!(!detector.is_conflicted(&Author::tx(2)));
    }

    #[test]
    fn test_sequential_group_author() {
        let conflicted = run([
            Operation::new(Author::SequentialGroup, OpKind::Write, key(1)),
            op(4, OpKind::ReadModifyWrite, key(1)),
        ]);
        assert_eq!(conflicted, BTreeSet::from([Author::tx(4), Author::SequentialGroup]));
    }

    #[test]
    fn test_reset_clears_tracking() {
        let mut detector = ConflictDetector::new();
        detector.process(op(0, OpKind::Write, key(1)));
        detector.process(op(1, OpKind::Write, key(1)));
        assert_eq!(detector.reset().len(), 2);

        assert!(detector.conflicted().is_empty());
        assert_eq!(detector.conflict_key_count(), 0);
        assert!(detector.process(op(1, OpKind::Read, key(1))).is_empty());
    }

    // ==================== Properties ====================

    use proptest::prelude::*;

    fn arb_op(authors: usize) -> impl Strategy<Value = Operation> {
        (0..authors, 0..4usize, 0..3u64).prop_map(|(tx, kind, slot)| op(tx, OpKind::ALL[kind], key(slot)))
    }

    /// Every pair of clashing operations leaves at least one author marked
    fn is_sound(ops: &[Operation], conflicted: &BTreeSet<Author>) -> bool {
        ops.iter().all(|a| {
            ops.iter().all(|b| {
                a.author == b.author
                    || a.key != b.key
                    || !a.kind.conflicts_with(b.kind)
                    || conflicted.contains(&a.author)
                    || conflicted.contains(&b.author)
            })
        })
    }

    proptest! {
        #[test]
        fn prop_clashes_are_caught_in_any_order(ops in prop::collection::vec(arb_op(4), 0..24)) {
            let forward = run(ops.clone());
            prop_assert!(is_sound(&ops, &forward));

            let reversed = run(ops.iter().rev().cloned());
            prop_assert!(is_sound(&ops, &reversed));
        }

        #[test]
        fn prop_single_author_never_conflicts(ops in prop::collection::vec(arb_op(1), 0..24)) {
            prop_assert!(run(ops).is_empty());
        }

        #[test]
        fn prop_reads_never_conflict(slots in prop::collection::vec((0..4usize, 0..3u64), 0..24)) {
            let ops = slots.into_iter().map(|(tx, slot)| op(tx, OpKind::Read, key(slot)));
            prop_assert!(run(ops).is_empty());
        }
    }
}
