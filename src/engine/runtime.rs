// src/engine/runtime.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::bundler::{BuildError, BuildRequest, Bundler};
use crate::emitter::{EventEmitter, LifecycleEvent};
use crate::engine::build::{run_build, BuildSuccess};
use crate::engine::core::CoreController;
use crate::engine::{BuildCycleState, CoreCommand, CoreEvent, CoreStep, ControlMessage};
use crate::types::BundleFormat;
use crate::watch::aggregator::{ChangeKind, RawChange};
use crate::watch::filter::PathFilter;
use crate::watch::watch_set::WatchSetManager;

type BuildResult = Result<BuildSuccess, BuildError>;

/// What woke the event loop.
enum Wake {
    Control(Option<ControlMessage>),
    Build(BuildResult),
    Raw(Option<RawChange>),
    Debounce,
}

/// Drives the build cycle controller in response to filesystem, timer and
/// build events, and delegates actual building to a [`Bundler`].
///
/// This is a pure IO shell around [`CoreController`], which contains all the
/// watcher semantics. This struct owns the channels, the debounce timer, the
/// watch set and the build jobs.
pub struct Runtime {
    core: CoreController,
    watch_set: WatchSetManager,
    filter: Arc<PathFilter>,
    bundler: Arc<dyn Bundler>,
    emitter: EventEmitter,
    entries: Vec<PathBuf>,
    format: BundleFormat,
    raw_rx: mpsc::UnboundedReceiver<RawChange>,
    control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    build_tx: mpsc::UnboundedSender<BuildResult>,
    build_rx: mpsc::UnboundedReceiver<BuildResult>,
    debounce: Option<Instant>,
    /// Admissible changes to untracked paths seen while a build runs. Replayed
    /// once the build's graph is known, if they turned out to be part of it.
    unseen: BTreeMap<PathBuf, ChangeKind>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("watch_set", &self.watch_set)
            .finish_non_exhaustive()
    }
}

/// Everything the runtime needs besides its channels.
pub struct RuntimeParts {
    pub core: CoreController,
    pub watch_set: WatchSetManager,
    pub filter: Arc<PathFilter>,
    pub bundler: Arc<dyn Bundler>,
    pub emitter: EventEmitter,
    pub entries: Vec<PathBuf>,
    pub format: BundleFormat,
}

impl Runtime {
    pub fn new(
        parts: RuntimeParts,
        raw_rx: mpsc::UnboundedReceiver<RawChange>,
        control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    ) -> Self {
        let (build_tx, build_rx) = mpsc::unbounded_channel();
        Self {
            core: parts.core,
            watch_set: parts.watch_set,
            filter: parts.filter,
            bundler: parts.bundler,
            emitter: parts.emitter,
            entries: parts.entries,
            format: parts.format,
            raw_rx,
            control_rx,
            build_tx,
            build_rx,
            debounce: None,
            unseen: BTreeMap::new(),
        }
    }

    /// Main event loop.
    ///
    /// - Runs the initial build.
    /// - Feeds control, build, filesystem and timer events into the core.
    /// - Executes the commands returned by the core.
    pub async fn run(mut self) {
        info!("watchbuild runtime started");

        self.watch_set.prime();
        let step = self.core.step(CoreEvent::Started);
        if !self.apply(step) {
            return;
        }

        loop {
            let deadline = self.debounce;
            let wake = tokio::select! {
                biased;
                msg = self.control_rx.recv() => Wake::Control(msg),
                Some(result) = self.build_rx.recv() => Wake::Build(result),
                raw = self.raw_rx.recv() => Wake::Raw(raw),
                _ = sleep_until(deadline) => Wake::Debounce,
            };

            let event = match wake {
                Wake::Control(Some(ControlMessage::Close)) | Wake::Control(None) => {
                    CoreEvent::CloseRequested
                }
                Wake::Build(result) => CoreEvent::BuildFinished(result),
                Wake::Raw(Some(change)) => {
                    if !self.is_relevant(&change.path) {
                        self.hold_unseen(change);
                        continue;
                    }
                    debug!(path = ?change.path, kind = ?change.kind, "relevant change");
                    CoreEvent::FileChanged {
                        change,
                        at: Instant::now(),
                    }
                }
                Wake::Raw(None) => CoreEvent::BackendFailed {
                    message: "filesystem event stream closed unexpectedly".to_string(),
                },
                Wake::Debounce => {
                    self.debounce = None;
                    CoreEvent::DebounceElapsed { at: Instant::now() }
                }
            };

            let finished = matches!(event, CoreEvent::BuildFinished(_));
            let step = self.core.step(event);
            if !self.apply(step) || (finished && !self.replay_unseen()) {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
    }

    /// A raw change matters if its path is subscribed (or covered by a
    /// recovery subscription) and the filter admits it.
    fn is_relevant(&self, path: &Path) -> bool {
        self.watch_set.tracks(path) && self.filter.should_watch(path)
    }

    fn hold_unseen(&mut self, change: RawChange) {
        if self.core.state() == BuildCycleState::Building && self.filter.should_watch(&change.path) {
            trace!(path = ?change.path, "holding change to untracked path until build ends");
            self.unseen
                .entry(change.path)
                .and_modify(|existing| *existing = existing.merge(change.kind))
                .or_insert(change.kind);
        } else {
            trace!(path = ?change.path, "ignoring change to unwatched path");
        }
    }

    /// Feed held changes whose paths the finished build started tracking.
    fn replay_unseen(&mut self) -> bool {
        for (path, kind) in std::mem::take(&mut self.unseen) {
            if !self.watch_set.tracks(&path) {
                continue;
            }
            debug!(path = ?path, ?kind, "replaying change made during build");
            let step = self.core.step(CoreEvent::FileChanged {
                change: RawChange::new(path, kind),
                at: Instant::now(),
            });
            if !self.apply(step) {
                return false;
            }
        }
        true
    }

    /// Execute the commands of one step; returns `keep_running`.
    fn apply(&mut self, step: CoreStep) -> bool {
        for command in step.commands {
            self.execute_command(command);
        }
        step.keep_running
    }

    fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::Emit(event) => {
                log_event(&event);
                self.emitter.emit(event);
            }
            CoreCommand::StartBuild { build, changed } => self.spawn_build(build, changed),
            CoreCommand::Reconcile(request) => {
                let report = self.watch_set.reconcile(&request);
                debug!(
                    added = report.added.len(),
                    removed = report.removed.len(),
                    recovery = report.recovery.len(),
                    "reconciled watch set"
                );
            }
            CoreCommand::ArmDebounce(deadline) => self.debounce = Some(deadline),
            CoreCommand::CancelDebounce => self.debounce = None,
            CoreCommand::Shutdown => {
                self.watch_set.clear();
                self.bundler.close();
                self.emitter.close();
            }
        }
    }

    fn spawn_build(&self, build: u64, changed: Vec<PathBuf>) {
        let request = BuildRequest {
            entries: self.entries.clone(),
            format: self.format,
            changed,
        };
        let bundler = Arc::clone(&self.bundler);
        let filter = Arc::clone(&self.filter);
        let tx = self.build_tx.clone();

        debug!(build, "spawning build job");
        tokio::spawn(async move {
            let result = run_build(bundler.as_ref(), &request, &filter).await;
            // The runtime may already have closed.
            let _ = tx.send(result);
        });
    }
}

/// Emit FATAL for a watcher whose backend never came up, then close.
pub(crate) fn report_setup_failure(emitter: &EventEmitter, message: String) {
    let mut core = CoreController::new(crate::watch::aggregator::DEFAULT_DEBOUNCE);
    let step = core.step(CoreEvent::SetupFailed { message });
    for command in step.commands {
        match command {
            CoreCommand::Emit(event) => {
                log_event(&event);
                emitter.emit(event);
            }
            CoreCommand::Shutdown => emitter.close(),
            _ => {}
        }
    }
}

fn log_event(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::BuildStart { build } => info!(build, "build started"),
        LifecycleEvent::BuildEnd {
            build, duration, ..
        } => info!(build, duration_ms = duration.as_millis() as u64, "build finished"),
        LifecycleEvent::Error { build, error } => {
            warn!(build, kind = %error.kind, error = %error, "build failed")
        }
        LifecycleEvent::Fatal { error } => error!(error = %error, "watcher failed"),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
