//! # `OlcBTree`
//!
//! A concurrent in-memory B+tree index synchronized with optimistic lock
//! coupling (OLC).
//!
//! Keys and payloads are `u64`. Every node carries a versioned latch:
//! readers descend without writing shared memory and validate versions
//! afterwards, writers upgrade a version they have already read to a write
//! lock with a single compare-and-swap. Any conflict restarts the operation
//! from the root, so callers never see a conflict.
//!
//! ## Thread Safety
//!
//! `OlcBTree` is `Send + Sync` and all operations take `&self`:
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//!
//! use olc_btree::OlcBTree;
//!
//! let tree = Arc::new(OlcBTree::new());
//!
//! let handles: Vec<_> = (0..4u64)
//!     .map(|t| {
//!         let tree = Arc::clone(&tree);
//!         thread::spawn(move || {
//!             for k in (t * 1000)..((t + 1) * 1000) {
//!                 tree.upsert(k, k * 2);
//!             }
//!         })
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! assert_eq!(tree.len(), 4000);
//! assert_eq!(tree.lookup(1234), Some(2468));
//! ```
//!
//! For batches, enter a guard once and use the `*_with_guard` methods.
//!
//! ## Design
//!
//! - Nodes are 4 KiB pages: leaves hold 255 sorted `(key, payload)` pairs,
//!   inner nodes up to 254 separators and 255 children.
//! - Splits are eager on the way back up: a full leaf locks exactly the
//!   ancestors the split will touch before modifying anything.
//! - A root split installs a new root and retires the old one through
//!   [`seize`]; retired nodes are freed once no reader can still hold them.
//!
//! ## Non-goals
//!
//! Deletion, range scans and persistence are not provided.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// We use extensive benchmarking to verify #[inline(always)] placement is correct.
#![allow(clippy::inline_always)]

mod reclaim;
mod tracing_helpers;

pub mod latch;
pub mod node;
pub mod ordering;
pub mod stats;
pub mod tree;

// Re-export main types for convenience
pub use latch::{Restart, RestartReason};
pub use stats::TreeStats;
pub use tree::{InvariantViolation, OlcBTree, TreeShape};
