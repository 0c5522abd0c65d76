//! Reclaim helpers for seize-based memory reclamation.
//!
//! This module provides:
//! - A single-node reclaimer for `guard.defer_retire()` (retired roots)
//! - Subtree teardown for tree drop

use seize::Collector;

use crate::node::{InnerNode, LeafNode, NodeKind, NodePtr};

/// Free one node, using its tag to pick the allocation layout.
///
/// # Safety
///
/// - `ptr` must come from [`LeafNode::into_raw`] or [`InnerNode::into_raw`].
/// - No other thread may still access the node.
pub(crate) unsafe fn free_node(ptr: NodePtr) {
    // SAFETY: Caller guarantees ptr is a live node from into_raw.
    let kind: NodeKind = unsafe { (*ptr).kind() };

    match kind {
        // SAFETY: Tag says LeafNode, allocated as Box<LeafNode>.
        NodeKind::Leaf => unsafe { drop(Box::from_raw(ptr.cast::<LeafNode>())) },
        // SAFETY: Tag says InnerNode, allocated as Box<InnerNode>.
        NodeKind::Inner => unsafe { drop(Box::from_raw(ptr.cast::<InnerNode>())) },
    }
}

/// Reclaim a retired node (seize callback).
///
/// Only the node itself is freed. Its children were relocated into the
/// node's replacement and remain reachable from the tree.
///
/// # Safety
///
/// - `ptr` must come from [`LeafNode::into_raw`] or [`InnerNode::into_raw`].
/// - Must only be called after seize determines no reader remains.
pub(crate) unsafe fn reclaim_node(ptr: NodePtr, _collector: &Collector) {
    // SAFETY: Caller guarantees ptr validity; seize guarantees exclusivity.
    unsafe { free_node(ptr) };
}

/// Free every node reachable from `root`.
///
/// Iterative DFS so deep trees cannot overflow the stack.
///
/// # Safety
///
/// - `root` must be null or a node reachable only through this subtree.
/// - No concurrent access to any node of the subtree.
pub(crate) unsafe fn free_subtree(root: NodePtr) {
    let mut stack: Vec<NodePtr> = Vec::with_capacity(64);
    stack.push(root);

    while let Some(node) = stack.pop() {
        if node.is_null() {
            continue;
        }

        // SAFETY: node was reached from the root through live child slots.
        if unsafe { (*node).kind() } == NodeKind::Inner {
            // SAFETY: Tag says InnerNode.
            let inner: &InnerNode = unsafe { &*node.cast::<InnerNode>() };

            // Collect children BEFORE dropping the inner node.
            stack.extend((0..=inner.count()).map(|i| inner.child(i)));
        }

        // SAFETY: node is unreachable from anywhere else now.
        unsafe { free_node(node) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeHeader;

    #[test]
    fn test_node_casts_keep_header_alignment() {
        // free_node and free_subtree cast header pointers to the concrete
        // node types without raising the alignment requirement.
        assert_eq!(align_of::<LeafNode>(), align_of::<NodeHeader>());
        assert_eq!(align_of::<InnerNode>(), align_of::<NodeHeader>());
    }

    #[test]
    fn test_reclaim_single_leaf() {
        let ptr: NodePtr = LeafNode::into_raw(LeafNode::new());

        // SAFETY: ptr was just created from into_raw.
        unsafe {
            let collector = Collector::new();
            reclaim_node(ptr, &collector);
        }
    }

    #[test]
    fn test_reclaim_single_inner() {
        let ptr: NodePtr = InnerNode::into_raw(InnerNode::new());

        // SAFETY: ptr was just created from into_raw.
        unsafe {
            let collector = Collector::new();
            reclaim_node(ptr, &collector);
        }
    }

    #[test]
    fn test_free_subtree_null_is_noop() {
        // SAFETY: Null is explicitly handled.
        unsafe { free_subtree(std::ptr::null_mut()) };
    }

    #[test]
    fn test_free_subtree_two_levels() {
        let left = LeafNode::new();
        left.insert(1, 1);
        let right = LeafNode::new();
        right.insert(5, 5);

        let root = InnerNode::new_root(5, LeafNode::into_raw(left), LeafNode::into_raw(right));

        // SAFETY: the three nodes form an isolated subtree.
        unsafe { free_subtree(InnerNode::into_raw(root)) };
    }
}
