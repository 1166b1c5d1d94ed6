// src/watch/aggregator.rs

//! Debouncing of raw filesystem notifications.
//!
//! Editors rarely produce a single event per save: a write is often followed
//! by a metadata touch, and "atomic" saves show up as unlink + create of the
//! same file. The aggregator folds everything that arrives within one quiet
//! window into a single [`PendingChange`].
//!
//! The aggregator never looks at a clock itself; callers pass `now` in. The
//! async runtime sleeps until [`ChangeAggregator::deadline`] and then asks
//! whether the batch [`is_due`](ChangeAggregator::is_due).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

/// Default quiet period before a burst of changes turns into a rebuild.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Kind of a raw filesystem notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Change,
    Unlink,
}

impl ChangeKind {
    /// Fold a later notification for the same path into an earlier one.
    ///
    /// Unlink followed by add is an in-place replacement, i.e. a change.
    pub(crate) fn merge(self, later: ChangeKind) -> ChangeKind {
        match (self, later) {
            (ChangeKind::Unlink, ChangeKind::Add) => ChangeKind::Change,
            (_, later) => later,
        }
    }
}

/// A single raw notification as delivered by a watch backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl RawChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Distinct paths changed since the last rebuild was dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChange {
    paths: BTreeMap<PathBuf, ChangeKind>,
}

impl PendingChange {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn kind_of(&self, path: &Path) -> Option<ChangeKind> {
        self.paths.get(path).copied()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.keys().map(PathBuf::as_path)
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        self.paths.into_keys().collect()
    }

    fn mark(&mut self, path: PathBuf, kind: ChangeKind) {
        self.paths
            .entry(path)
            .and_modify(|existing| *existing = existing.merge(kind))
            .or_insert(kind);
    }
}

/// Collects changes and reports when a quiet window has elapsed.
#[derive(Debug)]
pub struct ChangeAggregator {
    delay: Duration,
    pending: PendingChange,
    deadline: Option<Instant>,
}

impl ChangeAggregator {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: PendingChange::default(),
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Mark `path` as pending and restart the quiet window.
    ///
    /// Returns the new deadline.
    pub fn record(&mut self, path: PathBuf, kind: ChangeKind, now: Instant) -> Instant {
        trace!(?path, ?kind, "change recorded");
        self.pending.mark(path, kind);
        let deadline = now + self.delay;
        self.deadline = Some(deadline);
        deadline
    }

    /// When the current window closes, if anything is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// True when something is pending and no change arrived for a full window.
    pub fn is_due(&self, now: Instant) -> bool {
        self.has_pending() && self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Stop the timer but keep the pending paths.
    ///
    /// Used when the window closes while a build is running: the batch is
    /// remembered and dispatched as soon as the build finishes.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Hand out everything pending and reset.
    pub fn take(&mut self) -> PendingChange {
        self.deadline = None;
        std::mem::take(&mut self.pending)
    }
}
