// src/watcher.rs

//! Public handle for a running watcher.
//!
//! ```no_run
//! # async fn demo(options: watchbuild::config::WatchOptions) -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use watchbuild::bundler::ScriptBundler;
//! use watchbuild::watcher::Watcher;
//!
//! let (watcher, mut events) = Watcher::spawn(options, Arc::new(ScriptBundler::new()?));
//! while let Some(event) = events.recv().await {
//!     println!("{event}");
//! }
//! watcher.closed().await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::bundler::Bundler;
use crate::config::WatchOptions;
use crate::emitter::{EventEmitter, EventStream};
use crate::engine::core::CoreController;
use crate::engine::runtime::{report_setup_failure, Runtime, RuntimeParts};
use crate::engine::ControlMessage;
use crate::errors::Result;
use crate::watch::aggregator::RawChange;
use crate::watch::backend::{FsNotifier, NotifyBackend};
use crate::watch::watch_set::WatchSetManager;

/// Handle to one independent watcher instance.
///
/// Dropping the handle closes the watcher.
pub struct Watcher {
    emitter: EventEmitter,
    control_tx: mpsc::UnboundedSender<ControlMessage>,
    task: Option<JoinHandle<()>>,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("emitter", &self.emitter)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Start watching with the `notify` backend selected in `options`.
    ///
    /// Must be called from within a Tokio runtime. The returned stream is
    /// subscribed before the initial build starts, so it sees every event.
    pub fn spawn(options: WatchOptions, bundler: Arc<dyn Bundler>) -> (Self, EventStream) {
        let backend = options.backend;
        let poll_interval = options.poll_interval;
        Self::spawn_with_notifier(options, bundler, move |tx| {
            let notifier = NotifyBackend::new(backend, poll_interval, tx)?;
            Ok(Box::new(notifier) as Box<dyn FsNotifier>)
        })
    }

    /// Start watching with a caller-supplied notifier.
    ///
    /// `make_notifier` receives the sender raw changes must be delivered on.
    /// If it fails, the stream receives a single `FATAL` and then ends.
    pub fn spawn_with_notifier<F>(
        options: WatchOptions,
        bundler: Arc<dyn Bundler>,
        make_notifier: F,
    ) -> (Self, EventStream)
    where
        F: FnOnce(mpsc::UnboundedSender<RawChange>) -> Result<Box<dyn FsNotifier>>,
    {
        let emitter = EventEmitter::new();
        let events = emitter.subscribe();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        let notifier = match make_notifier(raw_tx) {
            Ok(notifier) => notifier,
            Err(err) => {
                error!(error = %err, "failed to start filesystem watcher");
                report_setup_failure(&emitter, format!("failed to start watcher: {err}"));
                bundler.close();
                let watcher = Self {
                    emitter,
                    control_tx,
                    task: None,
                };
                return (watcher, events);
            }
        };

        let watch_set = WatchSetManager::new(
            notifier,
            Arc::clone(&options.filter),
            options.entries.clone(),
        );
        let parts = RuntimeParts {
            core: CoreController::new(options.debounce),
            watch_set,
            filter: Arc::clone(&options.filter),
            bundler,
            emitter: emitter.clone(),
            entries: options.entries,
            format: options.format,
        };
        let runtime = Runtime::new(parts, raw_rx, control_rx);
        let task = tokio::spawn(runtime.run());

        let watcher = Self {
            emitter,
            control_tx,
            task: Some(task),
        };
        (watcher, events)
    }

    /// Add another subscriber. It sees events emitted from now on.
    pub fn subscribe(&self) -> EventStream {
        self.emitter.subscribe()
    }

    pub fn unsubscribe(&self, stream: &EventStream) -> bool {
        self.emitter.unsubscribe(stream.id())
    }

    /// Ask the watcher to stop. Safe to call any number of times.
    pub fn close(&self) {
        if self.control_tx.send(ControlMessage::Close).is_err() {
            debug!("watcher already stopped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.emitter.is_closed()
    }

    /// Wait until the runtime task has exited (after `close` or `FATAL`).
    pub async fn closed(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                error!(error = %err, "watcher task ended abnormally");
            }
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        let _ = self.control_tx.send(ControlMessage::Close);
    }
}
