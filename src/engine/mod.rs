// src/engine/mod.rs

//! Build orchestration engine for watchbuild.
//!
//! This module ties together:
//! - the build cycle state machine (one build in flight at most)
//! - the debounce aggregator feeding it
//! - the main runtime event loop that reacts to:
//!   - filesystem notifications
//!   - debounce deadlines
//!   - build completions
//!   - close requests
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]; a single build job is [`build::run_build`].

use std::path::PathBuf;

use tokio::time::Instant;

use crate::bundler::BuildError;
use crate::emitter::LifecycleEvent;
use crate::watch::aggregator::RawChange;
use crate::watch::watch_set::ReconcileRequest;

pub mod build;
pub mod core;
pub mod runtime;

pub use self::build::{run_build, ArtifactSummary, BuildSuccess};
pub use self::core::CoreController;
pub use self::runtime::Runtime;

/// Lifecycle state of the build cycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildCycleState {
    #[default]
    Idle,
    Building,
    /// Terminal.
    Closed,
}

/// Events flowing into the core from the runtime shell.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// The watcher came up; run the initial build.
    Started,
    /// A relevant path changed on disk.
    FileChanged { change: RawChange, at: Instant },
    /// The debounce timer fired.
    DebounceElapsed { at: Instant },
    /// The in-flight build job finished.
    BuildFinished(Result<BuildSuccess, BuildError>),
    /// The watch backend could not be started.
    SetupFailed { message: String },
    /// The watch backend stopped delivering events.
    BackendFailed { message: String },
    /// The owner asked the watcher to stop.
    CloseRequested,
}

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Publish to subscribers.
    Emit(LifecycleEvent),
    /// Spawn build job number `build`.
    StartBuild { build: u64, changed: Vec<PathBuf> },
    /// Update subscriptions after a build.
    Reconcile(ReconcileRequest),
    /// (Re)arm the debounce timer.
    ArmDebounce(Instant),
    CancelDebounce,
    /// Release subscriptions, close the engine and the emitter.
    Shutdown,
}

/// Decision returned by the core after handling a single [`CoreEvent`].
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Messages from the [`crate::watcher::Watcher`] handle to its runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Close,
}
