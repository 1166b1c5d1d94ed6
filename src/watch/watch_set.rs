// src/watch/watch_set.rs

//! The live set of watched paths and its reconciliation against build graphs.
//!
//! After a successful build the watch set becomes exactly the build's
//! dependency graph (minus whatever the [`PathFilter`] rejects, outputs
//! included). After a failed build the set is left alone, so edits to the
//! broken file keep being observed. A failed build additionally gets
//! *recovery* subscriptions: the file the engine could not resolve (if it
//! reported one) and the directory of every entry point. Those keep the
//! watcher useful even when the first build fails or the broken import
//! target was deleted; they are dropped on the next successful build.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::bundler::DependencyGraph;
use crate::watch::backend::{FsNotifier, SubscriptionHandle};
use crate::watch::filter::PathFilter;

/// Absolute path -> active subscription.
pub type WatchSet = BTreeMap<PathBuf, SubscriptionHandle>;

/// What the controller asks the manager to do after a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileRequest {
    /// Build succeeded; replace the watch set with this graph.
    Success { graph: DependencyGraph },
    /// Build failed; keep the watch set, add recovery subscriptions.
    Failure { failing_path: Option<PathBuf> },
}

/// Summary of the subscribe/unsubscribe calls made by one reconcile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub recovery: Vec<PathBuf>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.recovery.is_empty()
    }
}

pub struct WatchSetManager {
    notifier: Box<dyn FsNotifier>,
    filter: Arc<PathFilter>,
    entries: Vec<PathBuf>,
    active: WatchSet,
    recovery_files: WatchSet,
    recovery_dirs: WatchSet,
}

impl std::fmt::Debug for WatchSetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSetManager")
            .field("active", &self.active.len())
            .field("recovery_files", &self.recovery_files.len())
            .field("recovery_dirs", &self.recovery_dirs.len())
            .finish_non_exhaustive()
    }
}

impl WatchSetManager {
    pub fn new(notifier: Box<dyn FsNotifier>, filter: Arc<PathFilter>, entries: Vec<PathBuf>) -> Self {
        Self {
            notifier,
            filter,
            entries,
            active: WatchSet::new(),
            recovery_files: WatchSet::new(),
            recovery_dirs: WatchSet::new(),
        }
    }

    /// Subscribe the entry points ahead of the first build, so edits made
    /// while that build runs are not lost. The first reconcile replaces them.
    pub fn prime(&mut self) -> usize {
        let entries: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|entry| !self.active.contains_key(*entry) && self.filter.should_watch(entry))
            .cloned()
            .collect();
        let mut primed = 0;
        for entry in entries {
            if let Some(handle) = self.acquire(&entry) {
                self.active.insert(entry, handle);
                primed += 1;
            }
        }
        debug!(primed, "entry points subscribed before initial build");
        primed
    }

    /// Apply the outcome of a build to the set of subscriptions.
    pub fn reconcile(&mut self, request: &ReconcileRequest) -> ReconcileReport {
        match request {
            ReconcileRequest::Success { graph } => self.reconcile_success(graph),
            ReconcileRequest::Failure { failing_path } => {
                self.reconcile_failure(failing_path.as_deref())
            }
        }
    }

    /// Whether a raw notification for `path` concerns this watcher.
    pub fn tracks(&self, path: &Path) -> bool {
        if self.active.contains_key(path) || self.recovery_files.contains_key(path) {
            return true;
        }
        path.parent()
            .is_some_and(|parent| self.recovery_dirs.contains_key(parent))
    }

    /// Paths subscribed because the last good build read them.
    pub fn watched_paths(&self) -> impl Iterator<Item = &Path> {
        self.active.keys().map(PathBuf::as_path)
    }

    /// Paths subscribed only until the next successful build.
    pub fn recovery_paths(&self) -> impl Iterator<Item = &Path> {
        self.recovery_files
            .keys()
            .chain(self.recovery_dirs.keys())
            .map(PathBuf::as_path)
    }

    pub fn is_recovering(&self) -> bool {
        !self.recovery_files.is_empty() || !self.recovery_dirs.is_empty()
    }

    /// Drop every subscription (used on close).
    pub fn clear(&mut self) -> usize {
        let mut released = 0;
        for set in [
            std::mem::take(&mut self.active),
            std::mem::take(&mut self.recovery_files),
            std::mem::take(&mut self.recovery_dirs),
        ] {
            for (_, handle) in set {
                self.release(handle);
                released += 1;
            }
        }
        debug!(released, "released all subscriptions");
        released
    }

    fn reconcile_success(&mut self, graph: &DependencyGraph) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let wanted: Vec<&PathBuf> = graph
            .iter()
            .filter(|path| {
                let keep = self.filter.should_watch(path);
                if !keep {
                    debug!(path = ?path, "not watching filtered dependency");
                }
                keep
            })
            .collect();

        // Subscribe before unsubscribing so a directory shared by an added and a
        // removed file is never briefly unwatched.
        for path in &wanted {
            if self.active.contains_key(*path) {
                continue;
            }
            if let Some(handle) = self.acquire(path) {
                self.active.insert((*path).clone(), handle);
                report.added.push((*path).clone());
            }
        }

        let stale: Vec<PathBuf> = self
            .active
            .keys()
            .filter(|path| !wanted.contains(path))
            .cloned()
            .collect();
        for path in stale {
            if let Some(handle) = self.active.remove(&path) {
                self.release(handle);
                report.removed.push(path);
            }
        }

        for set in [
            std::mem::take(&mut self.recovery_files),
            std::mem::take(&mut self.recovery_dirs),
        ] {
            for (_, handle) in set {
                self.release(handle);
            }
        }

        debug!(
            added = report.added.len(),
            removed = report.removed.len(),
            watched = self.active.len(),
            "watch set reconciled after successful build"
        );
        report
    }

    fn reconcile_failure(&mut self, failing_path: Option<&Path>) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        if let Some(path) = failing_path {
            let wanted = !self.active.contains_key(path)
                && !self.recovery_files.contains_key(path)
                && self.filter.should_watch(path);
            if wanted {
                if let Some(handle) = self.acquire(path) {
                    self.recovery_files.insert(path.to_path_buf(), handle);
                    report.recovery.push(path.to_path_buf());
                }
            }
        }

        let entry_dirs: Vec<PathBuf> = self
            .entries
            .iter()
            .filter_map(|entry| entry.parent().map(Path::to_path_buf))
            .collect();
        for dir in entry_dirs {
            if self.recovery_dirs.contains_key(&dir) {
                continue;
            }
            if let Some(handle) = self.acquire(&dir) {
                self.recovery_dirs.insert(dir.clone(), handle);
                report.recovery.push(dir);
            }
        }

        debug!(
            watched = self.active.len(),
            recovery = report.recovery.len(),
            "watch set kept after failed build"
        );
        report
    }

    fn acquire(&mut self, path: &Path) -> Option<SubscriptionHandle> {
        match self.notifier.subscribe(path) {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(path = ?path, error = %err, "failed to subscribe path");
                None
            }
        }
    }

    fn release(&mut self, handle: SubscriptionHandle) {
        let path = handle.path().to_path_buf();
        if let Err(err) = self.notifier.unsubscribe(handle) {
            warn!(path = ?path, error = %err, "failed to unsubscribe path");
        }
    }
}
