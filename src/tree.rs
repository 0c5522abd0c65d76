//! Filepath: src/tree.rs
//! `OlcBTree` - a concurrent B+tree with optimistic lock coupling.
//!
//! This module provides the public tree type and its retry loops. The
//! protocol pieces live in submodules:
//! - `traverse`: root-to-leaf descent with lock coupling, point lookup
//! - `upsert`: leaf insert/update, split propagation
//! - `root`: root replacement
//! - `check`: quiescent structural verification

use std::fmt as StdFmt;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize};

use seize::{Collector, Guard, LocalGuard};

use crate::latch::Restart;
use crate::node::{LeafNode, NodePtr};
use crate::ordering::{READ_ORD, RELAXED};
use crate::reclaim::free_subtree;
use crate::stats::{StatCounters, TreeStats};
use crate::tracing_helpers::trace_log;

mod check;
mod root;
mod traverse;
mod upsert;

pub use check::{InvariantViolation, TreeShape};

// ============================================================================
//  OlcBTree
// ============================================================================

/// A concurrent ordered map from `u64` to `u64`.
///
/// All operations take `&self`; share the tree across threads with `Arc`.
/// Readers never block, writers only contend on the nodes they modify, and
/// no operation ever reports a conflict to the caller: conflicts restart the
/// operation internally.
///
/// # Example
///
/// ```rust
/// use olc_btree::OlcBTree;
///
/// let tree = OlcBTree::new();
/// tree.upsert(10, 100);
/// tree.upsert(10, 101);
///
/// assert_eq!(tree.lookup(10), Some(101));
/// assert_eq!(tree.lookup(11), None);
/// assert_eq!(tree.len(), 1);
/// ```
pub struct OlcBTree {
    /// Memory reclamation collector for retired roots.
    collector: Collector,

    /// Current root node (leaf or inner).
    ///
    /// Swapped only while the old root is write-locked.
    root: AtomicPtr<crate::node::NodeHeader>,

    /// Number of root replacements so far.
    height: AtomicU64,

    /// Number of distinct keys.
    len: AtomicUsize,

    /// Observational counters.
    stats: StatCounters,
}

impl StdFmt::Debug for OlcBTree {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("OlcBTree")
            .field("root", &self.root.load(RELAXED))
            .field("height", &self.height())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl OlcBTree {
    /// Create an empty tree whose root is a single empty leaf.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collector: Collector::new(),
            root: AtomicPtr::new(LeafNode::into_raw(LeafNode::new())),
            height: AtomicU64::new(0),
            len: AtomicUsize::new(0),
            stats: StatCounters::default(),
        }
    }

    /// Enter a protected region and return a guard.
    ///
    /// Nodes retired while the guard is alive are not freed until it drops.
    /// Pass it to the `*_with_guard` methods to amortize guard entry over
    /// many operations.
    #[must_use]
    #[inline(always)]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    // ========================================================================
    //  Lookup
    // ========================================================================

    /// Get the payload stored under `key`.
    ///
    /// A miss is `None`; it is a normal outcome, not an error.
    #[must_use]
    #[inline]
    pub fn lookup(&self, key: u64) -> Option<u64> {
        let guard = self.guard();
        self.lookup_with_guard(key, &guard)
    }

    /// Get the payload stored under `key` using an explicit guard.
    ///
    /// # Panics
    ///
    /// If `guard` did not come from this tree's [`guard()`](Self::guard).
    #[must_use]
    pub fn lookup_with_guard(&self, key: u64, guard: &LocalGuard<'_>) -> Option<u64> {
        self.assert_own_guard(guard);

        loop {
            match self.try_lookup(key, guard) {
                Ok(found) => return found,
                Err(restart) => self.note_restart(restart),
            }
        }
    }

    // ========================================================================
    //  Upsert
    // ========================================================================

    /// Insert `key` with `value`, or overwrite the value if `key` exists.
    #[inline]
    pub fn upsert(&self, key: u64, value: u64) {
        let guard = self.guard();
        self.upsert_with_guard(key, value, &guard);
    }

    /// Insert or overwrite using an explicit guard.
    ///
    /// # Panics
    ///
    /// If `guard` did not come from this tree's [`guard()`](Self::guard).
    pub fn upsert_with_guard(&self, key: u64, value: u64, guard: &LocalGuard<'_>) {
        self.assert_own_guard(guard);

        let mut path: traverse::DescentPath<'_> = traverse::DescentPath::new();

        loop {
            match self.try_upsert(key, value, &mut path, guard) {
                Ok(()) => return,
                Err(restart) => self.note_restart(restart),
            }
        }
    }

    // ========================================================================
    //  Accessors
    // ========================================================================

    /// Number of root replacements performed so far.
    ///
    /// Starts at 0 for a single-leaf tree. Advisory under concurrency.
    #[must_use]
    #[inline]
    pub fn height(&self) -> u64 {
        self.height.load(READ_ORD)
    }

    /// Number of distinct keys stored.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(RELAXED)
    }

    /// Check if no key has been stored.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the tree's restart and split counters.
    #[must_use]
    pub fn stats(&self) -> TreeStats {
        self.stats.snapshot()
    }

    // ========================================================================
    //  Internal Helpers
    // ========================================================================

    /// Load the root pointer.
    #[inline(always)]
    fn root_ptr(&self) -> NodePtr {
        self.root.load(READ_ORD)
    }

    /// A guard from another collector does not delay this tree's
    /// reclamation, so nodes it reaches could be freed under it.
    #[inline(always)]
    fn assert_own_guard(&self, guard: &LocalGuard<'_>) {
        assert!(
            guard.collector() == &self.collector,
            "guard belongs to a different tree"
        );
    }

    #[inline]
    fn note_restart(&self, restart: Restart) {
        self.stats.record_restart(restart.reason());
        trace_log!(reason = ?restart.reason(), "optimistic restart");
        std::hint::spin_loop();
    }
}

impl Default for OlcBTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OlcBTree {
    fn drop(&mut self) {
        // No concurrent access is possible here (Drop requires unique access).
        // Retired roots are owned by the collector and freed when it drops.
        let root: NodePtr = *self.root.get_mut();

        // SAFETY: Exclusive access; every reachable node came from into_raw
        // and is reachable exactly once.
        unsafe { free_subtree(root) };
    }
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
#[expect(clippy::cast_possible_truncation, reason = "reasonable in tests")]
mod tests {
    use super::*;
    use crate::node::{INNER_CAPACITY, LEAF_CAPACITY};

    fn _assert_send_sync()
    where
        OlcBTree: Send + Sync,
    {
    }

    #[test]
    fn test_new_tree_is_empty() {
        let tree = OlcBTree::new();

        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.lookup(0), None);
        assert_eq!(tree.lookup(u64::MAX), None);
    }

    #[test]
    fn test_default_trait() {
        let tree = OlcBTree::default();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_scenario() {
        let tree = OlcBTree::new();
        tree.upsert(10, 100);
        tree.upsert(20, 200);
        tree.upsert(15, 150);

        assert_eq!(tree.lookup(20), Some(200));
        assert_eq!(tree.lookup(15), Some(150));
        assert_eq!(tree.lookup(10), Some(100));

        tree.upsert(20, 250);
        assert_eq!(tree.lookup(20), Some(250));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_update_does_not_change_len() {
        let tree = OlcBTree::new();
        for round in 0..3 {
            for k in 0..100 {
                tree.upsert(k, k + round);
            }
        }

        assert_eq!(tree.len(), 100);
        assert_eq!(tree.lookup(42), Some(44));
    }

    #[test]
    fn test_extreme_keys() {
        let tree = OlcBTree::new();
        tree.upsert(0, 1);
        tree.upsert(u64::MAX, 2);

        assert_eq!(tree.lookup(0), Some(1));
        assert_eq!(tree.lookup(u64::MAX), Some(2));
        assert_eq!(tree.lookup(1), None);
    }

    #[test]
    fn test_first_leaf_split_grows_root() {
        let tree = OlcBTree::new();
        for k in 0..=LEAF_CAPACITY as u64 {
            tree.upsert(k, k);
        }

        assert_eq!(tree.height(), 1);
        let stats = tree.stats();
        assert_eq!(stats.leaf_splits, 1);
        assert_eq!(stats.root_replacements, 1);

        for k in 0..=LEAF_CAPACITY as u64 {
            assert_eq!(tree.lookup(k), Some(k));
        }
    }

    #[test]
    fn test_split_separator_routes_right() {
        let tree = OlcBTree::new();
        for k in 0..LEAF_CAPACITY as u64 {
            tree.upsert(k * 2, k);
        }
        // Overflow the root leaf; the separator is the first key moved.
        tree.upsert(1, 1);

        let separator = (LEAF_CAPACITY as u64 / 2) * 2;
        assert_eq!(tree.lookup(separator), Some(separator / 2));
        tree.upsert(separator, 7);
        assert_eq!(tree.lookup(separator), Some(7));
        assert_eq!(tree.len(), LEAF_CAPACITY + 1);
    }

    #[test]
    fn test_inner_split_height_two() {
        let mut tree = OlcBTree::new();
        let n = (LEAF_CAPACITY * INNER_CAPACITY + 1) as u64;
        for k in 0..n {
            tree.upsert(k, k ^ 0xABCD);
        }

        assert!(tree.height() >= 2);
        assert!(tree.stats().inner_splits >= 1);

        for k in 0..n {
            assert_eq!(tree.lookup(k), Some(k ^ 0xABCD));
        }

        let shape = tree.check_invariants().unwrap();
        assert_eq!(shape.keys, n as usize);
        assert_eq!(shape.levels as u64, tree.height() + 1);
    }

    #[test]
    fn test_guarded_api() {
        let tree = OlcBTree::new();
        let guard = tree.guard();

        for k in 0..1000 {
            tree.upsert_with_guard(k, k * 3, &guard);
        }
        for k in 0..1000 {
            assert_eq!(tree.lookup_with_guard(k, &guard), Some(k * 3));
        }
    }

    #[test]
    #[should_panic(expected = "guard belongs to a different tree")]
    fn test_upsert_rejects_other_trees_guard() {
        let tree = OlcBTree::new();
        let other = OlcBTree::new();
        let guard = other.guard();

        tree.upsert_with_guard(1, 1, &guard);
    }

    #[test]
    #[should_panic(expected = "guard belongs to a different tree")]
    fn test_lookup_rejects_other_trees_guard() {
        let tree = OlcBTree::new();
        tree.upsert(1, 1);
        let other = OlcBTree::new();
        let guard = other.guard();

        let _ = tree.lookup_with_guard(1, &guard);
    }

    #[test]
    fn test_foreign_guard_leaves_tree_untouched() {
        let tree = OlcBTree::new();
        let other = OlcBTree::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let guard = other.guard();
            for k in 0..=LEAF_CAPACITY as u64 {
                tree.upsert_with_guard(k, k, &guard);
            }
        }));

        assert!(result.is_err());
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
    }

    #[test]
    fn test_single_thread_never_restarts() {
        let tree = OlcBTree::new();
        for k in (0..10_000).rev() {
            tree.upsert(k, k);
        }
        for k in 0..10_000 {
            let _ = tree.lookup(k);
        }

        assert_eq!(tree.stats().restarts(), 0);
    }
}
