//! Memory orderings used by the latch, the nodes and the tree.
//!
//! The optimistic read protocol is a seqlock: a reader loads the latch word,
//! loads node fields, then loads the latch word again. Field loads are
//! Acquire so the second latch load cannot move above them; field stores are
//! Release so a reader that sees a new field value also sees the lock bit
//! (or a later version) that the writer set before storing it.

use std::sync::atomic::Ordering;

// ============================================================================
//  Node Fields
// ============================================================================

/// Optimistic loads of keys, payloads, children, counts and the root pointer.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Stores to node fields under a write lock, and to unpublished nodes.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Loads that need no ordering: source slots read by the lock holder, and
/// observational counters.
pub const RELAXED: Ordering = Ordering::Relaxed;

// ============================================================================
//  Latch Word
// ============================================================================

/// Loading the latch word, both before and after an optimistic read.
pub const VERSION_ORD: Ordering = Ordering::Acquire;

/// Write-unlock and unlock-obsolete (`fetch_add`).
pub const UNLOCK_ORD: Ordering = Ordering::Release;

// ============================================================================
//  Compare-and-Swap (latch upgrade, root replacement)
// ============================================================================

/// Successful upgrade or root swap: acquires the node's prior writes and
/// publishes the new state.
pub const CAS_SUCCESS: Ordering = Ordering::AcqRel;

/// Failed upgrade or root swap; the caller restarts (or panics, for the
/// root) and only needs the observed value.
pub const CAS_FAILURE: Ordering = Ordering::Acquire;
