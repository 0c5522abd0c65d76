//! Filepath: src/tree/upsert.rs
//!
//! Insert-or-update with split propagation.
//!
//! # Protocol
//!
//! ```text
//! 1. descend, recording (inner node, version) for every level
//! 2. upgrade the leaf's captured version to a write lock
//! 3. key present        -> overwrite payload, done
//!    leaf not full      -> sorted insert, done
//!    leaf full          -> lock phase, then split phase
//! 4. lock phase: upgrade ancestors bottom-up at their recorded versions,
//!    stopping after the first one with room (or at the root)
//! 5. split phase: split the leaf, push the separator up through the locked
//!    ancestors, replace the root if the top of the chain was full
//! ```
//!
//! Nothing is mutated until every lock the split needs is held, so a failed
//! upgrade in step 4 just drops the guards and restarts.

use seize::LocalGuard;
use smallvec::SmallVec;

use crate::latch::{Restart, WriteGuard};
use crate::node::{InnerNode, LeafNode, NodePtr, NodeRef};
use crate::ordering::RELAXED;
use crate::tracing_helpers::debug_log;

use super::traverse::{DescentPath, INLINE_DEPTH, PathEntry};
use super::OlcBTree;

/// A write-locked ancestor taking part in a split.
#[derive(Debug)]
pub(super) struct LockedInner<'g> {
    node: &'g InnerNode,
    lock: WriteGuard<'g>,
}

/// Locked ancestors of a splitting leaf, nearest first.
type LockedChain<'g> = SmallVec<[LockedInner<'g>; INLINE_DEPTH]>;

impl OlcBTree {
    /// One upsert attempt.
    ///
    /// `path` is scratch space reused across restarts.
    pub(super) fn try_upsert<'g>(
        &self,
        key: u64,
        value: u64,
        path: &mut DescentPath<'g>,
        guard: &'g LocalGuard<'_>,
    ) -> Result<(), Restart> {
        path.clear();

        let (leaf, version) = self.descend(key, guard, |entry| path.push(entry))?;
        let leaf_lock: WriteGuard<'g> = leaf.latch().upgrade_to_write(version)?;

        if let Some(slot) = leaf.find(key) {
            leaf.set_payload(slot, value);
            return Ok(());
        }

        if !leaf.is_full() {
            leaf.insert(key, value);
            self.len.fetch_add(1, RELAXED);
            return Ok(());
        }

        // Full leaf: on failure every guard taken so far drops here.
        let ancestors: LockedChain<'g> = Self::lock_split_path(path)?;

        self.split_and_insert(key, value, leaf, leaf_lock, ancestors, guard);
        self.len.fetch_add(1, RELAXED);

        Ok(())
    }

    /// Write-lock the ancestors a leaf split will touch.
    ///
    /// Returns the locked nodes nearest-first. The chain ends at the first
    /// node with room for one more separator; if it runs out instead, the
    /// last entry (or the leaf itself, for an empty path) is the root.
    fn lock_split_path<'g>(path: &[PathEntry<'g>]) -> Result<LockedChain<'g>, Restart> {
        let mut locked: LockedChain<'g> = LockedChain::new();

        for entry in path.iter().rev() {
            let lock: WriteGuard<'g> = entry.node.latch().upgrade_to_write(entry.version)?;
            let full: bool = entry.node.is_full();

            locked.push(LockedInner {
                node: entry.node,
                lock,
            });

            if !full {
                break;
            }
        }

        Ok(locked)
    }

    /// Split the locked full `leaf`, insert the pending entry and propagate
    /// the separator through `ancestors`.
    fn split_and_insert<'g>(
        &self,
        key: u64,
        value: u64,
        leaf: &'g LeafNode,
        leaf_lock: WriteGuard<'g>,
        ancestors: LockedChain<'g>,
        guard: &'g LocalGuard<'_>,
    ) {
        let (mut separator, right_leaf) = leaf.split();
        if key >= separator {
            right_leaf.insert(key, value);
        } else {
            leaf.insert(key, value);
        }

        self.stats.record_leaf_split();
        debug_log!(separator, left = leaf.count(), right = right_leaf.count(), "leaf split");

        let mut right: NodePtr = LeafNode::into_raw(right_leaf);
        let mut lower: NodeRef<'g> = NodeRef::Leaf(leaf);
        let mut lower_lock: WriteGuard<'g> = leaf_lock;

        for LockedInner { node, lock } in ancestors {
            if !node.is_full() {
                node.insert_child(separator, right);
                return;
            }

            let (promoted, right_inner) = node.split();
            if separator < promoted {
                node.insert_child(separator, right);
            } else {
                right_inner.insert_child(separator, right);
            }

            self.stats.record_inner_split();
            debug_log!(promoted, left = node.count(), right = right_inner.count(), "inner split");

            separator = promoted;
            right = InnerNode::into_raw(right_inner);
            lower = NodeRef::Inner(node);
            lower_lock = lock;
        }

        // The chain ran out: `lower` is the root and it has split.
        self.make_root(separator, lower, lower_lock, right, guard);
    }
}
