//! Filepath: src/tree/root.rs
//!
//! Root replacement.
//!
//! When the root itself splits, its lower half is relocated into a fresh
//! node so the old root can be unlinked completely:
//!
//! ```text
//!   before              after
//!   root*[a b c d]      new_root[c]
//!                       /         \
//!                  left[a b]    right[c d]
//!
//!   root* -> obsolete, retired through the collector
//! ```
//!
//! Readers still holding the old root see its version move (it stays locked
//! throughout) and then see it obsolete, so they restart and pick up the new
//! root.

use seize::{Guard, LocalGuard};

use crate::latch::WriteGuard;
use crate::node::{InnerNode, LeafNode, NodePtr, NodeRef};
use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, WRITE_ORD};
use crate::reclaim::reclaim_node;
use crate::tracing_helpers::info_log;

use super::OlcBTree;

impl OlcBTree {
    /// Install a new two-child root above the split `old_root`.
    ///
    /// `old_root` has already been split in place: it holds the lower half
    /// and `right` holds the upper half, divided at `separator`.
    ///
    /// # Panics
    ///
    /// Panics if the root pointer no longer refers to `old_root`. That cannot
    /// happen while `root_lock` is held, since every root replacement first
    /// locks the current root.
    pub(super) fn make_root<'g>(
        &self,
        separator: u64,
        old_root: NodeRef<'g>,
        root_lock: WriteGuard<'g>,
        right: NodePtr,
        guard: &'g LocalGuard<'_>,
    ) {
        let (expected, left): (NodePtr, NodePtr) = match old_root {
            NodeRef::Leaf(leaf) => (leaf.as_ptr(), LeafNode::into_raw(leaf.relocate())),
            NodeRef::Inner(inner) => (inner.as_ptr(), InnerNode::into_raw(inner.relocate())),
        };

        let new_root: NodePtr = InnerNode::into_raw(InnerNode::new_root(separator, left, right));

        if let Err(current) = self
            .root
            .compare_exchange(expected, new_root, CAS_SUCCESS, CAS_FAILURE)
        {
            panic!(
                "make_root: root CAS failed while holding the root lock. \
                 expected={expected:?}, current={current:?}"
            );
        }

        self.height.fetch_add(1, WRITE_ORD);
        self.stats.record_root_replacement();
        info_log!(height = self.height(), separator, new_root = ?new_root, "root replaced");

        root_lock.unlock_obsolete();

        // SAFETY: `expected` is unlinked (the root pointer moved on and no
        // inner node refers to a root), came from into_raw, and is retired
        // exactly once because only the holder of its lock gets here.
        unsafe { guard.defer_retire(expected, reclaim_node) };
    }
}
