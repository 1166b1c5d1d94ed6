// src/watch/backend.rs

//! Pluggable filesystem notification backends.
//!
//! The watch set manager only ever talks to an [`FsNotifier`]: subscribe a
//! path, unsubscribe a handle. Raw notifications flow the other way over the
//! `mpsc` channel handed to the backend at construction time.
//!
//! [`NotifyBackend`] is the production implementation. It wraps either
//! `notify::RecommendedWatcher` ([`Backend::Native`]) or `notify::PollWatcher`
//! ([`Backend::Poll`]); both are driven identically.
//!
//! Files are watched through their parent directory, non-recursively and
//! reference counted. A watch placed on the file itself would die with the
//! inode when an editor saves by unlink + create, and the replacement would
//! go unnoticed. Events for unrelated siblings are filtered later against the
//! watch set.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::{Result, WatchbuildError};
use crate::types::Backend;
use crate::watch::aggregator::{ChangeKind, RawChange};

/// Opaque token for one active subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    path: PathBuf,
}

impl SubscriptionHandle {
    pub fn new(id: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The path that was subscribed.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Capability to subscribe/unsubscribe paths for change notification.
///
/// Implementations must be cheap to call repeatedly for the same directory;
/// the watch set manager subscribes one handle per file.
pub trait FsNotifier: Send {
    fn subscribe(&mut self, path: &Path) -> Result<SubscriptionHandle>;
    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<()>;
}

/// `notify`-backed implementation of [`FsNotifier`].
pub struct NotifyBackend {
    kind: Backend,
    watcher: Box<dyn Watcher + Send>,
    /// Directory -> number of live subscriptions that need it.
    dirs: HashMap<PathBuf, usize>,
    /// Subscription id -> directory it holds a reference on.
    handles: HashMap<u64, PathBuf>,
    next_id: u64,
}

impl fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyBackend")
            .field("kind", &self.kind)
            .field("dirs", &self.dirs)
            .finish_non_exhaustive()
    }
}

impl NotifyBackend {
    /// Start a watcher of the given kind.
    ///
    /// Fails if the OS refuses to hand out a watcher (e.g. inotify instance
    /// limit reached); the caller reports that as a fatal setup error.
    pub fn new(
        kind: Backend,
        poll_interval: Duration,
        tx: mpsc::UnboundedSender<RawChange>,
    ) -> Result<Self> {
        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in translate_event(&event) {
                    // Receiver gone means the watcher is shutting down.
                    let _ = tx.send(change);
                }
            }
            Err(err) => {
                warn!(error = %err, "file watch error");
            }
        };

        let watcher: Box<dyn Watcher + Send> = match kind {
            Backend::Native => Box::new(RecommendedWatcher::new(handler, Config::default())?),
            Backend::Poll => Box::new(PollWatcher::new(
                handler,
                Config::default()
                    .with_poll_interval(poll_interval)
                    .with_compare_contents(true),
            )?),
        };

        info!(backend = %kind, "filesystem watcher started");

        Ok(Self {
            kind,
            watcher,
            dirs: HashMap::new(),
            handles: HashMap::new(),
            next_id: 0,
        })
    }

    pub fn kind(&self) -> Backend {
        self.kind
    }

    /// Number of directories currently registered with the OS watcher.
    pub fn watched_dir_count(&self) -> usize {
        self.dirs.len()
    }
}

impl FsNotifier for NotifyBackend {
    fn subscribe(&mut self, path: &Path) -> Result<SubscriptionHandle> {
        let dir = watch_target(path)?;

        let count = self.dirs.entry(dir.clone()).or_insert(0);
        if *count == 0 {
            if let Err(err) = self.watcher.watch(&dir, RecursiveMode::NonRecursive) {
                self.dirs.remove(&dir);
                return Err(err.into());
            }
            debug!(dir = ?dir, "watching directory");
        }
        *count += 1;

        let id = self.next_id;
        self.next_id += 1;
        self.handles.insert(id, dir);

        Ok(SubscriptionHandle::new(id, path))
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<()> {
        let Some(dir) = self.handles.remove(&handle.id()) else {
            return Ok(());
        };

        let remaining = match self.dirs.get_mut(&dir) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => return Ok(()),
        };

        if remaining == 0 {
            self.dirs.remove(&dir);
            debug!(dir = ?dir, "no longer watching directory");
            // The directory itself may already be gone, which also ends the watch.
            if let Err(err) = self.watcher.unwatch(&dir) {
                debug!(dir = ?dir, error = %err, "unwatch failed");
            }
        }

        Ok(())
    }
}

/// Directory that has to be registered with the OS watcher for `path`.
fn watch_target(path: &Path) -> Result<PathBuf> {
    if path.is_dir() {
        return Ok(path.to_path_buf());
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
        _ => Err(WatchbuildError::ConfigError(format!(
            "cannot determine a directory to watch for {path:?}"
        ))),
    }
}

/// Map a `notify` event onto zero or more raw changes.
fn translate_event(event: &Event) -> Vec<RawChange> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Add,
        EventKind::Remove(_) => ChangeKind::Unlink,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Unlink,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Add,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths = [from, to]
            let mut changes = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                changes.push(RawChange::new(from.clone(), ChangeKind::Unlink));
            }
            if let Some(to) = event.paths.get(1) {
                changes.push(RawChange::new(to.clone(), ChangeKind::Add));
            }
            return changes;
        }
        EventKind::Modify(_) | EventKind::Any => ChangeKind::Change,
        EventKind::Access(_) | EventKind::Other => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|p| RawChange::new(p.clone(), kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut ev = Event::new(kind);
        for p in paths {
            ev = ev.add_path(PathBuf::from(p));
        }
        ev
    }

    #[test]
    fn create_modify_remove_map_to_add_change_unlink() {
        let add = translate_event(&event(EventKind::Create(CreateKind::File), &["/p/a.js"]));
        assert_eq!(add, vec![RawChange::new("/p/a.js", ChangeKind::Add)]);

        let change = translate_event(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/p/a.js"],
        ));
        assert_eq!(change, vec![RawChange::new("/p/a.js", ChangeKind::Change)]);

        let unlink = translate_event(&event(EventKind::Remove(RemoveKind::File), &["/p/a.js"]));
        assert_eq!(unlink, vec![RawChange::new("/p/a.js", ChangeKind::Unlink)]);
    }

    #[test]
    fn rename_both_yields_unlink_and_add() {
        let changes = translate_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/p/a.js.tmp", "/p/a.js"],
        ));
        assert_eq!(
            changes,
            vec![
                RawChange::new("/p/a.js.tmp", ChangeKind::Unlink),
                RawChange::new("/p/a.js", ChangeKind::Add),
            ]
        );
    }

    #[test]
    fn access_events_are_ignored() {
        let changes = translate_event(&event(EventKind::Access(AccessKind::Any), &["/p/a.js"]));
        assert!(changes.is_empty());
    }

    #[test]
    fn subscriptions_share_the_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.js");
        let b = dir.path().join("b.js");
        std::fs::write(&a, "export default 1;").unwrap();
        std::fs::write(&b, "export default 2;").unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut backend =
            NotifyBackend::new(Backend::Poll, Duration::from_millis(50), tx).unwrap();

        assert_eq!(backend.kind(), Backend::Poll);

        let ha = backend.subscribe(&a).unwrap();
        let hb = backend.subscribe(&b).unwrap();
        assert_eq!(backend.watched_dir_count(), 1);

        backend.unsubscribe(ha).unwrap();
        assert_eq!(backend.watched_dir_count(), 1);
        backend.unsubscribe(hb).unwrap();
        assert_eq!(backend.watched_dir_count(), 0);
    }
}
