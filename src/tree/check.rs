//! Filepath: src/tree/check.rs
//!
//! Quiescent structural verification.
//!
//! [`OlcBTree::check_invariants`] walks the whole tree and reports the first
//! broken structural rule. It takes `&mut self`, so no operation can run
//! concurrently and every node is read without validation.

use std::fmt as StdFmt;

use crate::node::{NodePtr, NodeRef};
use crate::ordering::READ_ORD;

use super::OlcBTree;

/// Summary of a tree that passed [`OlcBTree::check_invariants`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeShape {
    /// Number of node levels, leaves included. A single-leaf tree has 1.
    pub levels: usize,
    /// Number of inner nodes.
    pub inner_nodes: usize,
    /// Number of leaves.
    pub leaves: usize,
    /// Number of stored keys.
    pub keys: usize,
}

/// A structural rule the tree breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Keys inside a node are not strictly increasing.
    UnsortedKeys {
        /// Depth of the node (root is 0).
        depth: usize,
        /// Slot of the first out-of-order key.
        index: usize,
    },

    /// A key lies outside the range its parent separators allow.
    KeyOutOfRange {
        /// Depth of the node holding the key.
        depth: usize,
        /// The misplaced key.
        key: u64,
    },

    /// An inner node has no separators.
    EmptyInner {
        /// Depth of the node.
        depth: usize,
    },

    /// An inner node has a null child in its live range.
    NullChild {
        /// Depth of the parent.
        depth: usize,
        /// Child slot.
        index: usize,
    },

    /// Leaves were found at different depths.
    UnevenLeafDepth {
        /// Depth of the first leaf found.
        expected: usize,
        /// Depth of the offending leaf.
        found: usize,
    },

    /// A reachable node is locked or obsolete.
    DirtyLatch {
        /// Depth of the node.
        depth: usize,
        /// Raw latch word.
        version: u64,
    },

    /// The key count disagrees with [`OlcBTree::len`].
    LenMismatch {
        /// Keys found in the leaves.
        counted: usize,
        /// Value of the length counter.
        recorded: usize,
    },

    /// The level count disagrees with [`OlcBTree::height`].
    HeightMismatch {
        /// Levels found.
        levels: usize,
        /// Value of the height counter.
        height: u64,
    },
}

impl StdFmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::UnsortedKeys { depth, index } => {
                write!(f, "keys not strictly increasing at depth {depth}, slot {index}")
            }

            Self::KeyOutOfRange { depth, key } => {
                write!(f, "key {key} at depth {depth} outside its parent's range")
            }

            Self::EmptyInner { depth } => write!(f, "inner node without keys at depth {depth}"),

            Self::NullChild { depth, index } => {
                write!(f, "null child {index} under inner node at depth {depth}")
            }

            Self::UnevenLeafDepth { expected, found } => {
                write!(f, "leaf at depth {found}, expected all leaves at depth {expected}")
            }

            Self::DirtyLatch { depth, version } => {
                write!(f, "node at depth {depth} has latch word {version:#x}")
            }

            Self::LenMismatch { counted, recorded } => {
                write!(f, "found {counted} keys but len() is {recorded}")
            }

            Self::HeightMismatch { levels, height } => {
                write!(f, "found {levels} levels but height() is {height}")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

/// A pending subtree: node, depth, and the key range `[low, high)` it must
/// respect (`None` means unbounded).
struct Pending {
    node: NodePtr,
    depth: usize,
    low: Option<u64>,
    high: Option<u64>,
}

impl Pending {
    const fn admits(&self, key: u64) -> bool {
        let above: bool = match self.low {
            Some(low) => key >= low,
            None => true,
        };
        let below: bool = match self.high {
            Some(high) => key < high,
            None => true,
        };
        above && below
    }
}

impl OlcBTree {
    /// Verify the tree's structure.
    ///
    /// Checks that keys are sorted within every node, that every key lies in
    /// the range its ancestors' separators assign, that all leaves share one
    /// depth, that no reachable node is locked or obsolete, and that the
    /// `len()` and `height()` counters agree with what was found.
    ///
    /// # Errors
    ///
    /// The first [`InvariantViolation`] encountered.
    pub fn check_invariants(&mut self) -> Result<TreeShape, InvariantViolation> {
        let mut shape: TreeShape = TreeShape::default();
        let mut leaf_depth: Option<usize> = None;

        let mut stack: Vec<Pending> = vec![Pending {
            node: *self.root.get_mut(),
            depth: 0,
            low: None,
            high: None,
        }];

        while let Some(pending) = stack.pop() {
            // SAFETY: &mut self rules out concurrent writers, and every
            // pointer on the stack was a non-null child of a live node.
            let node: NodeRef<'_> = unsafe { NodeRef::from_ptr(pending.node) };
            let depth: usize = pending.depth;

            let version: u64 = node.header().latch().version();
            if node.header().latch().is_locked() || node.header().latch().is_obsolete() {
                return Err(InvariantViolation::DirtyLatch { depth, version });
            }

            match node {
                NodeRef::Leaf(leaf) => {
                    let expected: usize = *leaf_depth.get_or_insert(depth);
                    if expected != depth {
                        return Err(InvariantViolation::UnevenLeafDepth {
                            expected,
                            found: depth,
                        });
                    }

                    let keys: Vec<u64> = (0..leaf.count()).map(|i| leaf.key(i)).collect();
                    check_keys(&keys, &pending)?;

                    shape.leaves += 1;
                    shape.keys += keys.len();
                }

                NodeRef::Inner(inner) => {
                    let n: usize = inner.count();
                    if n == 0 {
                        return Err(InvariantViolation::EmptyInner { depth });
                    }

                    let keys: Vec<u64> = (0..n).map(|i| inner.key(i)).collect();
                    check_keys(&keys, &pending)?;

                    for index in 0..=n {
                        let child: NodePtr = inner.child(index);
                        if child.is_null() {
                            return Err(InvariantViolation::NullChild { depth, index });
                        }

                        let low: Option<u64> = match index {
                            0 => pending.low,
                            i => keys.get(i - 1).copied(),
                        };
                        let high: Option<u64> = match keys.get(index) {
                            Some(&key) => Some(key),
                            None => pending.high,
                        };

                        stack.push(Pending {
                            node: child,
                            depth: depth + 1,
                            low,
                            high,
                        });
                    }

                    shape.inner_nodes += 1;
                }
            }
        }

        shape.levels = leaf_depth.unwrap_or(0) + 1;

        let recorded: usize = self.len();
        if shape.keys != recorded {
            return Err(InvariantViolation::LenMismatch {
                counted: shape.keys,
                recorded,
            });
        }

        let height: u64 = self.height.load(READ_ORD);
        if shape.levels as u64 != height + 1 {
            return Err(InvariantViolation::HeightMismatch {
                levels: shape.levels,
                height,
            });
        }

        Ok(shape)
    }
}

fn check_keys(keys: &[u64], pending: &Pending) -> Result<(), InvariantViolation> {
    if let Some(index) = keys.windows(2).position(|pair| matches!(pair, [a, b] if a >= b)) {
        return Err(InvariantViolation::UnsortedKeys {
            depth: pending.depth,
            index: index + 1,
        });
    }

    match keys.iter().find(|&&key| !pending.admits(key)) {
        Some(&key) => Err(InvariantViolation::KeyOutOfRange {
            depth: pending.depth,
            key,
        }),
        None => Ok(()),
    }
}
