//! Property-based tests for `OlcBTree`.
//!
//! Differential testing against `BTreeMap` as an oracle.

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

use std::collections::BTreeMap;

use olc_btree::OlcBTree;
use olc_btree::node::LEAF_CAPACITY;
use proptest::prelude::*;

// ============================================================================
//  Strategies
// ============================================================================

/// Keys from a narrow range, so updates of existing keys are common.
fn dense_key() -> impl Strategy<Value = u64> {
    0u64..2_000
}

/// Operations for random testing.
#[derive(Debug, Clone)]
enum Op {
    Upsert(u64, u64),
    Lookup(u64),
}

fn operations(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            3 => (dense_key(), any::<u64>()).prop_map(|(k, v)| Op::Upsert(k, v)),
            1 => dense_key().prop_map(Op::Lookup),
        ],
        0..=max_ops,
    )
}

// ============================================================================
//  Differential Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// OlcBTree behaves like BTreeMap for any upsert/lookup sequence.
    #[test]
    fn matches_btreemap(ops in operations(3_000)) {
        let tree = OlcBTree::new();
        let mut oracle: BTreeMap<u64, u64> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Upsert(k, v) => {
                    tree.upsert(k, v);
                    oracle.insert(k, v);
                }
                Op::Lookup(k) => {
                    prop_assert_eq!(tree.lookup(k), oracle.get(&k).copied());
                }
            }
        }

        prop_assert_eq!(tree.len(), oracle.len());
        for (k, v) in &oracle {
            prop_assert_eq!(tree.lookup(*k), Some(*v));
        }
    }

    /// Arbitrary 64-bit keys, including the extremes, survive splits.
    #[test]
    fn any_keys_survive_splits(
        pairs in prop::collection::vec((any::<u64>(), any::<u64>()), 0..=LEAF_CAPACITY * 8)
    ) {
        let mut tree = OlcBTree::new();
        let mut oracle: BTreeMap<u64, u64> = BTreeMap::new();

        for (k, v) in pairs {
            tree.upsert(k, v);
            oracle.insert(k, v);
        }

        for (k, v) in &oracle {
            prop_assert_eq!(tree.lookup(*k), Some(*v));
        }

        let shape = tree.check_invariants().unwrap();
        prop_assert_eq!(shape.keys, oracle.len());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// The final state does not depend on insertion order.
    #[test]
    fn insertion_order_independent(
        keys in prop::collection::hash_set(any::<u64>(), 0..=LEAF_CAPACITY * 4)
    ) {
        let forward: Vec<u64> = keys.into_iter().collect();
        let mut sorted = forward.clone();
        sorted.sort_unstable();

        let a = OlcBTree::new();
        let b = OlcBTree::new();
        for &k in &forward {
            a.upsert(k, k ^ 1);
        }
        for &k in sorted.iter().rev() {
            b.upsert(k, k ^ 1);
        }

        for &k in &forward {
            prop_assert_eq!(a.lookup(k), b.lookup(k));
        }
        prop_assert_eq!(a.len(), b.len());
    }
}
