//! Filepath: src/latch.rs
//!
//! Versioned latch for optimistic lock coupling.
//!
//! [`VersionedLatch`] packs lock state, an obsolete flag and a version
//! counter into a single `u64`. Readers never block: they capture a version,
//! read the node, and validate that the version did not move. Writers upgrade
//! a captured version to a write lock with one compare-and-swap.
//!
//! # Concurrency Model
//! 1. Readers: `read_or_restart()` to capture, read fields, `check_or_restart()`.
//! 2. Writers: `upgrade_to_write(version)` to get a [`WriteGuard`], modify the
//!    node, let the guard drop (or call [`WriteGuard::unlock_obsolete`]).
//!
//! Every failure is reported as a [`Restart`]. Nothing in this module waits.
//!
//! ```rust
//! use olc_btree::latch::VersionedLatch;
//!
//! let latch = VersionedLatch::new();
//! let seen = latch.read_or_restart().unwrap();
//! {
//!     let _guard = latch.upgrade_to_write(seen).unwrap();
//!     // mutate the node here
//! }
//! assert!(!latch.validate(seen));
//! ```

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::sync::atomic::AtomicU64;

use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, UNLOCK_ORD, VERSION_ORD};

// ============================================================================
//  Bit Constants
// ============================================================================

/// Obsolete bit: the node was retired and must not be trusted.
pub(crate) const OBSOLETE_BIT: u64 = 0b01;

/// Lock bit: a writer holds the node.
pub(crate) const LOCK_BIT: u64 = 0b10;

/// Value of a freshly constructed latch: unlocked, live, version 1.
pub(crate) const INITIAL_VERSION: u64 = 0b100;

// ============================================================================
//  Restart
// ============================================================================

/// Why an optimistic operation has to start over from the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// The node was write-locked when its version was read.
    Locked,

    /// The node was retired by a root replacement.
    Obsolete,

    /// A previously captured version no longer matches.
    VersionChanged,

    /// Another writer won the compare-and-swap on the latch.
    UpgradeFailed,

    /// The tree root moved between loading it and reading its version.
    RootMoved,
}

/// Signal that the enclosing tree operation must restart from the root.
///
/// Never surfaced by the public tree API; the retry loops absorb it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restart {
    reason: RestartReason,
}

impl Restart {
    /// Create a restart signal.
    #[must_use]
    #[inline(always)]
    pub const fn new(reason: RestartReason) -> Self {
        Self { reason }
    }

    /// The condition that triggered the restart.
    #[must_use]
    #[inline(always)]
    pub const fn reason(&self) -> RestartReason {
        self.reason
    }
}

impl StdFmt::Display for Restart {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self.reason {
            RestartReason::Locked => write!(f, "node is write-locked"),

            RestartReason::Obsolete => write!(f, "node is obsolete"),

            RestartReason::VersionChanged => {
                write!(f, "node version changed since it was read")
            }

            RestartReason::UpgradeFailed => {
                write!(f, "write-lock upgrade lost to a concurrent writer")
            }

            RestartReason::RootMoved => write!(f, "tree root was replaced"),
        }
    }
}

impl std::error::Error for Restart {}

// ============================================================================
//  VersionedLatch
// ============================================================================

/// A versioned latch embedded in every tree node.
///
/// # Layout
/// Bits 2-63: version counter | Bit 1: `locked` | Bit 0: `obsolete`
///
/// Unlocking adds `0b10`: the lock bit is cleared and the carry bumps the
/// counter, so a completed write always produces a new version.
pub struct VersionedLatch {
    value: AtomicU64,
}

impl StdFmt::Debug for VersionedLatch {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let value: u64 = self.version();
        f.debug_struct("VersionedLatch")
            .field("version", &(value >> 2))
            .field("locked", &Self::locked_in(value))
            .field("obsolete", &Self::obsolete_in(value))
            .finish()
    }
}

// ============================================================================
//  WriteGuard (Type-State Pattern)
// ============================================================================

/// Proof that the write lock on a [`VersionedLatch`] is held.
///
/// Only obtainable through [`VersionedLatch::upgrade_to_write`] or
/// [`VersionedLatch::write_lock_or_restart`]. Dropping the guard performs
/// `write_unlock`, also during unwinding.
///
/// Guards are `!Send` and `!Sync` through `PhantomData<*mut ()>`.
#[must_use = "dropping the guard immediately releases the write lock"]
pub struct WriteGuard<'a> {
    latch: &'a VersionedLatch,
    _marker: PhantomData<*mut ()>,
}

impl StdFmt::Debug for WriteGuard<'_> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("WriteGuard")
            .field("latch", self.latch)
            .finish()
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.latch.value.fetch_add(LOCK_BIT, UNLOCK_ORD);
    }
}

impl WriteGuard<'_> {
    /// Release the lock and mark the node obsolete in one atomic step.
    ///
    /// From the locked state, adding `0b11` clears the lock bit, advances
    /// the counter and sets the obsolete bit.
    #[inline]
    pub fn unlock_obsolete(self) {
        self.latch
            .value
            .fetch_add(LOCK_BIT | OBSOLETE_BIT, UNLOCK_ORD);
        std::mem::forget(self);
    }
}

impl VersionedLatch {
    /// Create an unlocked, live latch at version 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(INITIAL_VERSION),
        }
    }

    #[inline(always)]
    const fn locked_in(value: u64) -> bool {
        value & LOCK_BIT == LOCK_BIT
    }

    #[inline(always)]
    const fn obsolete_in(value: u64) -> bool {
        value & OBSOLETE_BIT == OBSOLETE_BIT
    }

    // ========================================================================
    //  Inspection
    // ========================================================================

    /// Raw latch word.
    #[must_use]
    #[inline(always)]
    pub fn version(&self) -> u64 {
        self.value.load(VERSION_ORD)
    }

    /// Check if a writer currently holds the latch.
    #[must_use]
    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        Self::locked_in(self.version())
    }

    /// Check if the node has been retired.
    #[must_use]
    #[inline(always)]
    pub fn is_obsolete(&self) -> bool {
        Self::obsolete_in(self.version())
    }

    // ========================================================================
    //  Optimistic Reads
    // ========================================================================

    /// Capture a version for an optimistic read.
    ///
    /// # Errors
    /// [`RestartReason::Locked`] or [`RestartReason::Obsolete`] if the
    /// captured word is unusable as a read baseline.
    #[inline(always)]
    pub fn read_or_restart(&self) -> Result<u64, Restart> {
        let version: u64 = self.version();

        if Self::locked_in(version) {
            return Err(Restart::new(RestartReason::Locked));
        }
        if Self::obsolete_in(version) {
            return Err(Restart::new(RestartReason::Obsolete));
        }

        Ok(version)
    }

    /// Check whether the latch still holds `start`.
    #[must_use]
    #[inline(always)]
    pub fn validate(&self, start: u64) -> bool {
        self.version() == start
    }

    /// Validate `start`, converting a mismatch into a restart.
    ///
    /// # Errors
    /// [`RestartReason::VersionChanged`] if a writer intervened.
    #[inline(always)]
    pub fn check_or_restart(&self, start: u64) -> Result<(), Restart> {
        if self.validate(start) {
            Ok(())
        } else {
            Err(Restart::new(RestartReason::VersionChanged))
        }
    }

    // ========================================================================
    //  Write Locking
    // ========================================================================

    /// Upgrade a previously captured version to a write lock.
    ///
    /// A single compare-and-swap from `version` to `version + 0b10`. On
    /// failure the caller must restart; retrying on the same snapshot can
    /// never succeed.
    ///
    /// # Errors
    /// [`RestartReason::UpgradeFailed`] if the latch moved since `version`.
    #[inline]
    pub fn upgrade_to_write(&self, version: u64) -> Result<WriteGuard<'_>, Restart> {
        debug_assert!(
            !Self::locked_in(version) && !Self::obsolete_in(version),
            "upgrade_to_write: snapshot must come from read_or_restart"
        );

        match self
            .value
            .compare_exchange(version, version + LOCK_BIT, CAS_SUCCESS, CAS_FAILURE)
        {
            Ok(_) => Ok(WriteGuard {
                latch: self,
                _marker: PhantomData,
            }),
            Err(_) => Err(Restart::new(RestartReason::UpgradeFailed)),
        }
    }

    /// Read the current version and immediately upgrade it.
    ///
    /// # Errors
    /// Any restart reason from [`read_or_restart`](Self::read_or_restart)
    /// or [`upgrade_to_write`](Self::upgrade_to_write).
    #[inline]
    pub fn write_lock_or_restart(&self) -> Result<WriteGuard<'_>, Restart> {
        let version: u64 = self.read_or_restart()?;
        self.upgrade_to_write(version)
    }
}

impl Default for VersionedLatch {
    fn default() -> Self {
        Self::new()
    }
}
