//! Filepath: src/tree/traverse.rs
//!
//! Root-to-leaf descent with optimistic lock coupling.
//!
//! A reader holds at most two unvalidated versions at a time: the current
//! node's and its child's. The parent is validated only after the child's
//! version has been captured, so a child pointer that was read from a
//! changing parent is never trusted.

use seize::LocalGuard;
use smallvec::SmallVec;

use crate::latch::{Restart, RestartReason};
use crate::node::{InnerNode, LeafNode, NodePtr, NodeRef};

use super::OlcBTree;

/// Inner levels kept inline before a descent path spills to the heap.
///
/// Fanout 255 reaches every `u64` key within 8 levels.
pub(super) const INLINE_DEPTH: usize = 8;

/// Inner nodes passed on the way down, root first.
pub(super) type DescentPath<'g> = SmallVec<[PathEntry<'g>; INLINE_DEPTH]>;

/// An inner node on the descent path and the version it was validated at.
#[derive(Debug, Clone, Copy)]
pub(super) struct PathEntry<'g> {
    pub(super) node: &'g InnerNode,
    pub(super) version: u64,
}

impl OlcBTree {
    /// Load the root and capture its version.
    ///
    /// The root pointer is re-read after the version load; if it moved, the
    /// version belongs to a node that is no longer the root.
    #[inline]
    pub(super) fn load_root<'g>(
        &self,
        _guard: &'g LocalGuard<'_>,
    ) -> Result<(NodeRef<'g>, u64), Restart> {
        let root: NodePtr = self.root_ptr();

        // SAFETY: The root pointer is never null and the guard keeps a
        // replaced root allocated until we leave the protected region.
        let node: NodeRef<'g> = unsafe { NodeRef::from_ptr(root) };
        let version: u64 = node.header().latch().read_or_restart()?;

        if self.root_ptr() != root {
            return Err(Restart::new(RestartReason::RootMoved));
        }

        Ok((node, version))
    }

    /// Walk from the root to the leaf whose range covers `key`.
    ///
    /// Every inner node passed through is handed to `visit` together with
    /// the version it was validated at. Returns the leaf and its captured
    /// (not yet validated) version.
    pub(super) fn descend<'g>(
        &self,
        key: u64,
        guard: &'g LocalGuard<'_>,
        mut visit: impl FnMut(PathEntry<'g>),
    ) -> Result<(&'g LeafNode, u64), Restart> {
        let (mut node, mut version) = self.load_root(guard)?;

        loop {
            let inner: &'g InnerNode = match node {
                NodeRef::Leaf(leaf) => return Ok((leaf, version)),
                NodeRef::Inner(inner) => inner,
            };

            let child_ptr: NodePtr = inner.child(inner.child_index(key));
            if child_ptr.is_null() {
                // Only possible with a torn view of a node being modified.
                return Err(Restart::new(RestartReason::VersionChanged));
            }

            // SAFETY: Non-null child pointers always reference live nodes;
            // the guard covers nodes retired while we hold the pointer.
            let child: NodeRef<'g> = unsafe { NodeRef::from_ptr(child_ptr) };
            let child_version: u64 = child.header().latch().read_or_restart()?;

            inner.latch().check_or_restart(version)?;
            visit(PathEntry { node: inner, version });

            node = child;
            version = child_version;
        }
    }

    /// One optimistic lookup attempt.
    pub(super) fn try_lookup(
        &self,
        key: u64,
        guard: &LocalGuard<'_>,
    ) -> Result<Option<u64>, Restart> {
        let (leaf, version) = self.descend(key, guard, |_| {})?;

        let found: Option<u64> = leaf.get(key);
        leaf.latch().check_or_restart(version)?;

        Ok(found)
    }
}
