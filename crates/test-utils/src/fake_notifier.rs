use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use watchbuild::errors::{Result, WatchbuildError};
use watchbuild::watch::{ChangeKind, FsNotifier, RawChange, SubscriptionHandle};

#[derive(Default)]
struct State {
    tx: Option<mpsc::UnboundedSender<RawChange>>,
    live: BTreeMap<u64, PathBuf>,
    next_id: u64,
    subscribe_calls: Vec<PathBuf>,
    unsubscribe_calls: Vec<PathBuf>,
    refuse: BTreeSet<PathBuf>,
}

/// In-memory `FsNotifier`: records subscriptions, never touches the OS.
pub struct FakeNotifier {
    state: Arc<Mutex<State>>,
}

/// Test-side view of a [`FakeNotifier`]: inspect subscriptions and inject
/// raw changes as if the OS had reported them.
#[derive(Clone, Default)]
pub struct FakeNotifierHandle {
    state: Arc<Mutex<State>>,
}

impl FakeNotifierHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the notifier half, delivering raw changes on `tx`.
    pub fn notifier(&self, tx: mpsc::UnboundedSender<RawChange>) -> FakeNotifier {
        self.state.lock().unwrap().tx = Some(tx);
        FakeNotifier {
            state: Arc::clone(&self.state),
        }
    }

    /// Paths with at least one live subscription.
    pub fn subscribed(&self) -> BTreeSet<PathBuf> {
        self.state.lock().unwrap().live.values().cloned().collect()
    }

    pub fn is_subscribed(&self, path: &Path) -> bool {
        self.state
            .lock()
            .unwrap()
            .live
            .values()
            .any(|p| p == path)
    }

    pub fn subscribe_calls(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().subscribe_calls.clone()
    }

    pub fn unsubscribe_calls(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().unsubscribe_calls.clone()
    }

    /// Make future `subscribe(path)` calls fail.
    pub fn refuse(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().refuse.insert(path.into());
    }

    /// Deliver a raw change. Returns false once disconnected.
    pub fn emit(&self, path: impl Into<PathBuf>, kind: ChangeKind) -> bool {
        let state = self.state.lock().unwrap();
        match &state.tx {
            Some(tx) => tx.send(RawChange::new(path, kind)).is_ok(),
            None => false,
        }
    }

    pub fn change(&self, path: impl Into<PathBuf>) -> bool {
        self.emit(path, ChangeKind::Change)
    }

    /// Simulate the backend dying: the raw event stream ends.
    pub fn disconnect(&self) {
        self.state.lock().unwrap().tx = None;
    }
}

impl FsNotifier for FakeNotifier {
    fn subscribe(&mut self, path: &Path) -> Result<SubscriptionHandle> {
        let mut state = self.state.lock().unwrap();
        if state.refuse.contains(path) {
            return Err(WatchbuildError::ConfigError(format!(
                "refusing to watch {}",
                path.display()
            )));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.live.insert(id, path.to_path_buf());
        state.subscribe_calls.push(path.to_path_buf());
        Ok(SubscriptionHandle::new(id, path))
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.live.remove(&handle.id());
        state.unsubscribe_calls.push(handle.path().to_path_buf());
        Ok(())
    }
}
