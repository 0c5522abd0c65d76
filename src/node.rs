//! Filepath: src/node.rs
//!
//! Page-sized tree nodes.
//!
//! Both node kinds start with the same `#[repr(C)]` [`NodeHeader`]: the
//! [`VersionedLatch`], a kind tag and the entry count. A raw `*mut NodeHeader`
//! can therefore point at either kind; [`NodeRef`] recovers the concrete type
//! by matching on the tag.
//!
//! # Memory Layout (PAGE_SIZE = 4096)
//!
//! ```text
//! LeafNode                              InnerNode
//! ┌──────────────────────────────┐      ┌──────────────────────────────┐
//! │ header (16 bytes)            │      │ header (16 bytes)            │
//! │   latch: u64, kind: u8,      │      │   latch: u64, kind: u8,      │
//! │   count: u16                 │      │   count: u16                 │
//! ├──────────────────────────────┤      ├──────────────────────────────┤
//! │ keys:     [u64; 255]         │      │ keys:     [u64; 255]         │
//! │ payloads: [u64; 255]         │      │ children: [*mut _; 255]      │
//! └──────────────────────────────┘      └──────────────────────────────┘
//! ```
//!
//! # B+Tree Routing Model
//!
//! ```text
//!         [K0 | K1 | K2]           <- InnerNode (3 keys, 4 children)
//!        /    |    |    \
//!    C0     C1    C2     C3
//!
//!    C0: keys < K0
//!    C1: keys >= K0 and < K1
//!    C2: keys >= K1 and < K2
//!    C3: keys >= K2
//! ```
//!
//! # Thread Safety
//!
//! Every field a reader may touch without the lock is an atomic, so an
//! optimistic read can observe stale values but never a torn one. Stale
//! values are harmless: the reader validates the latch afterwards and
//! discards everything on mismatch.
//!
//! Mutating methods (`insert`, `split`, `set_payload`, ...) require that the
//! caller holds the node's write lock, or that the node is not yet reachable
//! from the tree.

use std::fmt as StdFmt;
use std::mem::size_of;
use std::ptr as StdPtr;
use std::sync::atomic::{AtomicPtr, AtomicU16, AtomicU64};

use crate::latch::VersionedLatch;
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};

// ============================================================================
//  Geometry
// ============================================================================

/// Size of every node in bytes. Part of the storage-density contract.
pub const PAGE_SIZE: usize = 4 * 1024;

/// Bytes taken by the common header.
pub const HEADER_SIZE: usize = size_of::<NodeHeader>();

/// Maximum entries in a leaf.
pub const LEAF_CAPACITY: usize = (PAGE_SIZE - HEADER_SIZE) / (size_of::<u64>() * 2);

/// Key slots in an inner node. At most `INNER_CAPACITY - 1` are used so a
/// split always has room for the pending separator.
pub const INNER_CAPACITY: usize =
    (PAGE_SIZE - HEADER_SIZE) / (size_of::<u64>() + size_of::<NodePtr>());

/// Type-erased node pointer. Points at the header of a leaf or inner node.
pub type NodePtr = *mut NodeHeader;

const _: () = assert!(size_of::<LeafNode>() <= PAGE_SIZE, "leaf exceeds a page");
const _: () = assert!(size_of::<InnerNode>() <= PAGE_SIZE, "inner node exceeds a page");
const _: () = assert!(LEAF_CAPACITY >= 4, "leaf too small to split");
const _: () = assert!(INNER_CAPACITY >= 4, "inner node too small to split");
const _: () = assert!(LEAF_CAPACITY <= u16::MAX as usize);

// ============================================================================
//  NodeHeader
// ============================================================================

/// Node type tag. Fixed for the node's whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeKind {
    /// Routing node with keys and children.
    Inner = 1,
    /// Data node with keys and payloads.
    Leaf = 2,
}

/// Fields shared by both node kinds. Always the first field.
#[repr(C)]
pub struct NodeHeader {
    latch: VersionedLatch,
    kind: NodeKind,
    count: AtomicU16,
}

impl NodeHeader {
    const fn new(kind: NodeKind) -> Self {
        Self {
            latch: VersionedLatch::new(),
            kind,
            count: AtomicU16::new(0),
        }
    }

    /// The node's latch.
    #[must_use]
    #[inline(always)]
    pub const fn latch(&self) -> &VersionedLatch {
        &self.latch
    }

    /// The node's type tag.
    #[must_use]
    #[inline(always)]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Number of keys. May be stale under an optimistic read.
    #[must_use]
    #[inline(always)]
    pub fn count(&self) -> usize {
        self.count.load(READ_ORD) as usize
    }

    #[inline(always)]
    #[expect(clippy::cast_possible_truncation, reason = "n <= LEAF_CAPACITY < u16::MAX")]
    fn set_count(&self, n: usize) {
        self.count.store(n as u16, WRITE_ORD);
    }
}

impl StdFmt::Debug for NodeHeader {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("NodeHeader")
            .field("kind", &self.kind)
            .field("count", &self.count())
            .field("latch", &self.latch)
            .finish()
    }
}

// ============================================================================
//  NodeRef
// ============================================================================

/// Borrowed view of a node, dispatched on the header tag.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    /// An inner node.
    Inner(&'a InnerNode),
    /// A leaf node.
    Leaf(&'a LeafNode),
}

impl<'a> NodeRef<'a> {
    /// View a type-erased node pointer as its concrete kind.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live `LeafNode` or `InnerNode` allocated by this
    /// crate, and must stay allocated for `'a` (the caller's reclamation
    /// guard provides this for nodes reached through the tree).
    #[inline(always)]
    #[must_use]
    pub unsafe fn from_ptr(ptr: NodePtr) -> Self {
        // SAFETY: Caller guarantees ptr is a live node; the header is the
        // first field of both node structs.
        let header: &'a NodeHeader = unsafe { &*ptr };

        match header.kind() {
            // SAFETY: Tag says InnerNode; repr(C) puts the header at offset 0.
            NodeKind::Inner => Self::Inner(unsafe { &*ptr.cast::<InnerNode>() }),
            // SAFETY: Tag says LeafNode; repr(C) puts the header at offset 0.
            NodeKind::Leaf => Self::Leaf(unsafe { &*ptr.cast::<LeafNode>() }),
        }
    }

    /// The common header of the viewed node.
    #[must_use]
    #[inline(always)]
    pub const fn header(self) -> &'a NodeHeader {
        match self {
            Self::Inner(inner) => &inner.header,
            Self::Leaf(leaf) => &leaf.header,
        }
    }
}

// ============================================================================
//  LeafNode
// ============================================================================

/// A leaf holding up to [`LEAF_CAPACITY`] sorted `(key, payload)` pairs.
///
/// # Invariants
/// - `count <= LEAF_CAPACITY`
/// - `keys[0..count]` strictly increasing
#[repr(C)]
pub struct LeafNode {
    header: NodeHeader,
    keys: [AtomicU64; LEAF_CAPACITY],
    payloads: [AtomicU64; LEAF_CAPACITY],
}

impl StdFmt::Debug for LeafNode {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("LeafNode")
            .field("count", &self.count())
            .field("latch", self.latch())
            .finish_non_exhaustive()
    }
}

impl LeafNode {
    /// Create an empty leaf.
    #[must_use]
    pub fn new() -> Box<Self> {
        Box::new(Self {
            header: NodeHeader::new(NodeKind::Leaf),
            keys: std::array::from_fn(|_| AtomicU64::new(0)),
            payloads: std::array::from_fn(|_| AtomicU64::new(0)),
        })
    }

    /// Hand ownership to the tree as a type-erased pointer.
    #[must_use]
    #[inline]
    pub fn into_raw(node: Box<Self>) -> NodePtr {
        Box::into_raw(node).cast::<NodeHeader>()
    }

    /// Type-erased pointer to this node.
    #[must_use]
    #[inline(always)]
    pub fn as_ptr(&self) -> NodePtr {
        StdPtr::from_ref(self).cast_mut().cast::<NodeHeader>()
    }

    /// The node's latch.
    #[must_use]
    #[inline(always)]
    pub const fn latch(&self) -> &VersionedLatch {
        &self.header.latch
    }

    /// Number of entries, clamped to capacity.
    #[must_use]
    #[inline(always)]
    pub fn count(&self) -> usize {
        self.header.count().min(LEAF_CAPACITY)
    }

    /// Check if the leaf cannot take another entry without splitting.
    #[must_use]
    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.count() == LEAF_CAPACITY
    }

    /// Key at slot `i`.
    #[must_use]
    #[inline(always)]
    #[expect(clippy::indexing_slicing, reason = "bounds checked via debug_assert")]
    pub fn key(&self, i: usize) -> u64 {
        debug_assert!(i < LEAF_CAPACITY, "key: index out of bounds");
        self.keys[i].load(READ_ORD)
    }

    /// Payload at slot `i`.
    #[must_use]
    #[inline(always)]
    #[expect(clippy::indexing_slicing, reason = "bounds checked via debug_assert")]
    pub fn payload(&self, i: usize) -> u64 {
        debug_assert!(i < LEAF_CAPACITY, "payload: index out of bounds");
        self.payloads[i].load(READ_ORD)
    }

    /// Overwrite the payload at slot `i`. Never changes `count`.
    #[inline(always)]
    #[expect(clippy::indexing_slicing, reason = "bounds checked via debug_assert")]
    pub fn set_payload(&self, i: usize, payload: u64) {
        debug_assert!(i < self.count(), "set_payload: slot not occupied");
        self.payloads[i].store(payload, WRITE_ORD);
    }

    /// First slot whose key is `>= key` (`count` if none).
    #[must_use]
    #[inline]
    pub fn lower_bound(&self, key: u64) -> usize {
        let mut lo: usize = 0;
        let mut hi: usize = self.count();

        while lo < hi {
            let mid: usize = lo + (hi - lo) / 2;
            if self.key(mid) < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        lo
    }

    /// Slot holding exactly `key`, if any.
    #[must_use]
    #[inline]
    pub fn find(&self, key: u64) -> Option<usize> {
        let pos: usize = self.lower_bound(key);
        (pos < self.count() && self.key(pos) == key).then_some(pos)
    }

    /// Payload stored under `key`, if any.
    #[must_use]
    #[inline]
    pub fn get(&self, key: u64) -> Option<u64> {
        self.find(key).map(|slot| self.payload(slot))
    }

    /// Insert `(key, payload)` at sorted position `pos`, shifting right.
    ///
    /// # Panics
    /// Panics if the leaf is full.
    #[expect(
        clippy::indexing_slicing,
        reason = "n < LEAF_CAPACITY asserted; loop indices stay below n + 1"
    )]
    pub fn insert_at(&self, pos: usize, key: u64, payload: u64) {
        let n: usize = self.count();

        assert!(n < LEAF_CAPACITY, "insert_at: leaf is full");
        debug_assert!(pos <= n, "insert_at: position out of bounds");
        debug_assert!(pos == 0 || self.key(pos - 1) < key, "insert_at: order");
        debug_assert!(pos == n || self.key(pos) > key, "insert_at: order");

        for i in (pos..n).rev() {
            self.keys[i + 1].store(self.keys[i].load(RELAXED), WRITE_ORD);
            self.payloads[i + 1].store(self.payloads[i].load(RELAXED), WRITE_ORD);
        }

        self.keys[pos].store(key, WRITE_ORD);
        self.payloads[pos].store(payload, WRITE_ORD);
        self.header.set_count(n + 1);
    }

    /// Insert a key known to be absent. The leaf must not be full.
    #[inline]
    pub fn insert(&self, key: u64, payload: u64) {
        let pos: usize = self.lower_bound(key);
        self.insert_at(pos, key, payload);
    }

    /// Move the upper half (from `count / 2`) into a new right sibling.
    ///
    /// Returns the separator (the first moved key, so equal keys route
    /// right) and the new leaf. The new leaf is unpublished and unlocked.
    ///
    /// # Panics
    /// Panics if the leaf holds fewer than two entries.
    #[must_use]
    pub fn split(&self) -> (u64, Box<Self>) {
        let n: usize = self.count();
        assert!(n >= 2, "split: leaf below minimum occupancy ({n} entries)");

        let mid: usize = n / 2;
        let right: Box<Self> = Self::new();
        right.copy_from(self, mid..n);
        self.header.set_count(mid);

        (right.key(0), right)
    }

    /// Fresh copy of this leaf's live entries.
    #[must_use]
    pub fn relocate(&self) -> Box<Self> {
        let copy: Box<Self> = Self::new();
        copy.copy_from(self, 0..self.count());
        copy
    }

    #[expect(clippy::indexing_slicing, reason = "range lies within source count")]
    fn copy_from(&self, src: &Self, range: std::ops::Range<usize>) {
        let start: usize = range.start;
        for i in range.clone() {
            self.keys[i - start].store(src.keys[i].load(RELAXED), WRITE_ORD);
            self.payloads[i - start].store(src.payloads[i].load(RELAXED), WRITE_ORD);
        }
        self.header.set_count(range.len());
    }
}

// ============================================================================
//  InnerNode
// ============================================================================

/// A routing node with `count` separators and `count + 1` children.
///
/// # Invariants
/// - `count <= INNER_CAPACITY - 1`
/// - `keys[0..count]` strictly increasing
/// - `children[i]` holds keys in `[keys[i-1], keys[i])`
#[repr(C)]
pub struct InnerNode {
    header: NodeHeader,
    keys: [AtomicU64; INNER_CAPACITY],
    children: [AtomicPtr<NodeHeader>; INNER_CAPACITY],
}

impl StdFmt::Debug for InnerNode {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("InnerNode")
            .field("count", &self.count())
            .field("latch", self.latch())
            .finish_non_exhaustive()
    }
}

impl InnerNode {
    /// Create an inner node with no keys and null children.
    #[must_use]
    pub fn new() -> Box<Self> {
        Box::new(Self {
            header: NodeHeader::new(NodeKind::Inner),
            keys: std::array::from_fn(|_| AtomicU64::new(0)),
            children: std::array::from_fn(|_| AtomicPtr::new(StdPtr::null_mut())),
        })
    }

    /// Create a root with exactly two children split at `separator`.
    #[must_use]
    pub fn new_root(separator: u64, left: NodePtr, right: NodePtr) -> Box<Self> {
        let node: Box<Self> = Self::new();
        node.set_child(0, left);
        node.keys[0].store(separator, WRITE_ORD);
        node.set_child(1, right);
        node.header.set_count(1);
        node
    }

    /// Hand ownership to the tree as a type-erased pointer.
    #[must_use]
    #[inline]
    pub fn into_raw(node: Box<Self>) -> NodePtr {
        Box::into_raw(node).cast::<NodeHeader>()
    }

    /// Type-erased pointer to this node.
    #[must_use]
    #[inline(always)]
    pub fn as_ptr(&self) -> NodePtr {
        StdPtr::from_ref(self).cast_mut().cast::<NodeHeader>()
    }

    /// The node's latch.
    #[must_use]
    #[inline(always)]
    pub const fn latch(&self) -> &VersionedLatch {
        &self.header.latch
    }

    /// Number of separator keys, clamped to the usable maximum.
    #[must_use]
    #[inline(always)]
    pub fn count(&self) -> usize {
        self.header.count().min(INNER_CAPACITY - 1)
    }

    /// Check if one more separator would break the reserved-slot invariant.
    #[must_use]
    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.count() == INNER_CAPACITY - 1
    }

    /// Separator at slot `i`.
    #[must_use]
    #[inline(always)]
    #[expect(clippy::indexing_slicing, reason = "bounds checked via debug_assert")]
    pub fn key(&self, i: usize) -> u64 {
        debug_assert!(i < INNER_CAPACITY, "key: index out of bounds");
        self.keys[i].load(READ_ORD)
    }

    /// Child pointer at slot `i` (valid for `i <= count`).
    #[must_use]
    #[inline(always)]
    #[expect(clippy::indexing_slicing, reason = "bounds checked via debug_assert")]
    pub fn child(&self, i: usize) -> NodePtr {
        debug_assert!(i < INNER_CAPACITY, "child: index out of bounds");
        self.children[i].load(READ_ORD)
    }

    #[inline(always)]
    #[expect(clippy::indexing_slicing, reason = "bounds checked via debug_assert")]
    fn set_child(&self, i: usize, child: NodePtr) {
        debug_assert!(i < INNER_CAPACITY, "set_child: index out of bounds");
        self.children[i].store(child, WRITE_ORD);
    }

    /// Index of the child whose range covers `key`.
    ///
    /// Counts separators `<= key`, so a key equal to a separator routes to
    /// the right of it.
    #[must_use]
    #[inline]
    pub fn child_index(&self, key: u64) -> usize {
        let mut lo: usize = 0;
        let mut hi: usize = self.count();

        while lo < hi {
            let mid: usize = lo + (hi - lo) / 2;
            if self.key(mid) <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        lo
    }

    /// Insert `separator` with `right` as the child just to its right.
    ///
    /// Used when a child split pushes a new sibling up. The left child (the
    /// node that split) is already in place.
    ///
    /// # Panics
    /// Panics if the node is full.
    #[expect(
        clippy::indexing_slicing,
        reason = "n < INNER_CAPACITY - 1 asserted; indices stay below n + 2"
    )]
    pub fn insert_child(&self, separator: u64, right: NodePtr) {
        let n: usize = self.count();
        assert!(n < INNER_CAPACITY - 1, "insert_child: inner node is full");

        let pos: usize = self.child_index(separator);
        debug_assert!(
            pos == 0 || self.key(pos - 1) < separator,
            "insert_child: duplicate separator"
        );

        // Keys: keys[pos..n] -> keys[pos+1..n+1]
        // Children: children[pos+1..=n] -> children[pos+2..=n+1]
        for i in (pos..n).rev() {
            self.keys[i + 1].store(self.keys[i].load(RELAXED), WRITE_ORD);
            self.children[i + 2].store(self.children[i + 1].load(RELAXED), WRITE_ORD);
        }

        self.keys[pos].store(separator, WRITE_ORD);
        self.set_child(pos + 1, right);
        self.header.set_count(n + 1);
    }

    /// Split around the middle separator, which is promoted and kept in
    /// neither half.
    ///
    /// Left keeps `keys[0..mid]` and `children[0..=mid]`; the new right node
    /// gets `keys[mid+1..n]` and `children[mid+1..=n]`.
    ///
    /// # Panics
    /// Panics if fewer than three separators are present.
    #[must_use]
    #[expect(clippy::indexing_slicing, reason = "indices bounded by n <= INNER_CAPACITY - 1")]
    pub fn split(&self) -> (u64, Box<Self>) {
        let n: usize = self.count();
        assert!(n >= 3, "split: inner node below minimum occupancy ({n} keys)");

        let mid: usize = n / 2;
        let promoted: u64 = self.key(mid);
        let right: Box<Self> = Self::new();

        for i in (mid + 1)..n {
            right.keys[i - mid - 1].store(self.keys[i].load(RELAXED), WRITE_ORD);
        }
        for i in (mid + 1)..=n {
            right.set_child(i - mid - 1, self.children[i].load(RELAXED));
        }

        right.header.set_count(n - mid - 1);
        self.header.set_count(mid);

        (promoted, right)
    }

    /// Fresh copy of this node's separators and children.
    #[must_use]
    #[expect(clippy::indexing_slicing, reason = "indices bounded by count")]
    pub fn relocate(&self) -> Box<Self> {
        let n: usize = self.count();
        let copy: Box<Self> = Self::new();

        for i in 0..n {
            copy.keys[i].store(self.keys[i].load(RELAXED), WRITE_ORD);
        }
        for i in 0..=n {
            copy.set_child(i, self.children[i].load(RELAXED));
        }

        copy.header.set_count(n);
        copy
    }
}
