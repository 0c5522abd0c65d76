//! Operation counters for [`OlcBTree`](crate::OlcBTree).
//!
//! Purely observational: counters use relaxed atomics and never influence
//! the protocol. Useful for spotting contention (high restart counts) and
//! for asserting structural events in tests.

use std::sync::atomic::AtomicU64;

use crate::latch::RestartReason;
use crate::ordering::RELAXED;

/// Snapshot of a tree's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Restarts caused by a locked node.
    pub restarts_locked: u64,
    /// Restarts caused by an obsolete node.
    pub restarts_obsolete: u64,
    /// Restarts caused by a failed validation.
    pub restarts_version_changed: u64,
    /// Restarts caused by a lost write-lock upgrade.
    pub restarts_upgrade_failed: u64,
    /// Restarts caused by a concurrent root replacement.
    pub restarts_root_moved: u64,
    /// Leaf splits performed.
    pub leaf_splits: u64,
    /// Inner node splits performed.
    pub inner_splits: u64,
    /// Root replacements performed.
    pub root_replacements: u64,
}

impl TreeStats {
    /// Total restarts across all reasons.
    #[must_use]
    pub const fn restarts(&self) -> u64 {
        self.restarts_locked
            + self.restarts_obsolete
            + self.restarts_version_changed
            + self.restarts_upgrade_failed
            + self.restarts_root_moved
    }
}

/// Live counters owned by a tree.
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    restarts: [AtomicU64; 5],
    leaf_splits: AtomicU64,
    inner_splits: AtomicU64,
    root_replacements: AtomicU64,
}

impl StatCounters {
    #[inline(always)]
    const fn slot(reason: RestartReason) -> usize {
        match reason {
            RestartReason::Locked => 0,
            RestartReason::Obsolete => 1,
            RestartReason::VersionChanged => 2,
            RestartReason::UpgradeFailed => 3,
            RestartReason::RootMoved => 4,
        }
    }

    #[inline]
    #[expect(clippy::indexing_slicing, reason = "slot() maps onto 0..5")]
    pub(crate) fn record_restart(&self, reason: RestartReason) {
        self.restarts[Self::slot(reason)].fetch_add(1, RELAXED);
    }

    #[inline]
    pub(crate) fn record_leaf_split(&self) {
        self.leaf_splits.fetch_add(1, RELAXED);
    }

    #[inline]
    pub(crate) fn record_inner_split(&self) {
        self.inner_splits.fetch_add(1, RELAXED);
    }

    #[inline]
    pub(crate) fn record_root_replacement(&self) {
        self.root_replacements.fetch_add(1, RELAXED);
    }

    pub(crate) fn snapshot(&self) -> TreeStats {
        let [locked, obsolete, version_changed, upgrade_failed, root_moved] =
            &self.restarts;

        TreeStats {
            restarts_locked: locked.load(RELAXED),
            restarts_obsolete: obsolete.load(RELAXED),
            restarts_version_changed: version_changed.load(RELAXED),
            restarts_upgrade_failed: upgrade_failed.load(RELAXED),
            restarts_root_moved: root_moved.load(RELAXED),
            leaf_splits: self.leaf_splits.load(RELAXED),
            inner_splits: self.inner_splits.load(RELAXED),
            root_replacements: self.root_replacements.load(RELAXED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_buckets() {
        let counters = StatCounters::default();
        counters.record_restart(RestartReason::Locked);
        counters.record_restart(RestartReason::Locked);
        counters.record_restart(RestartReason::RootMoved);

        let stats = counters.snapshot();
        assert_eq!(stats.restarts_locked, 2);
        assert_eq!(stats.restarts_root_moved, 1);
        assert_eq!(stats.restarts(), 3);
    }

    #[test]
    fn test_structural_counters() {
        let counters = StatCounters::default();
        counters.record_leaf_split();
        counters.record_inner_split();
        counters.record_root_replacement();

        let stats = counters.snapshot();
        assert_eq!(stats.leaf_splits, 1);
        assert_eq!(stats.inner_splits, 1);
        assert_eq!(stats.root_replacements, 1);
        assert_eq!(stats.restarts(), 0);
    }
}
