// src/engine/core.rs

//! Pure build cycle state machine.
//!
//! This module contains a synchronous, deterministic controller that
//! consumes [`CoreEvent`]s and produces:
//! - an updated state (`Idle`, `Building`, `Closed` plus the errored flag)
//! - a list of [`CoreCommand`]s describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for reading
//! channels, sleeping until debounce deadlines, spawning build jobs and
//! talking to the watch backend.
//!
//! Ordering guarantees encoded here:
//! - `BUILD_START` is always followed by exactly one `BUILD_END` or `ERROR`
//!   before the next `BUILD_START`.
//! - The watch set is reconciled before the build's outcome is emitted.
//! - Nothing is emitted after `Closed` except through a fresh controller.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use crate::bundler::BuildError;
use crate::emitter::LifecycleEvent;
use crate::engine::{BuildCycleState, BuildSuccess, CoreCommand, CoreEvent, CoreStep};
use crate::errors::FatalError;
use crate::watch::aggregator::ChangeAggregator;
use crate::watch::watch_set::ReconcileRequest;

/// Pure controller state.
///
/// It has **no** channels, no Tokio tasks, and does not perform any IO.
#[derive(Debug)]
pub struct CoreController {
    state: BuildCycleState,
    aggregator: ChangeAggregator,
    errored: bool,
    /// The debounce window closed while a build was running.
    rebuild_deferred: bool,
    builds_started: u64,
}

impl CoreController {
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: BuildCycleState::Idle,
            aggregator: ChangeAggregator::new(debounce),
            errored: false,
            rebuild_deferred: false,
            builds_started: 0,
        }
    }

    pub fn state(&self) -> BuildCycleState {
        self.state
    }

    /// Whether the most recent completed build failed.
    pub fn is_errored(&self) -> bool {
        self.errored
    }

    pub fn builds_started(&self) -> u64 {
        self.builds_started
    }

    pub fn has_pending(&self) -> bool {
        self.aggregator.has_pending()
    }

    /// Handle a single event, updating state and returning the resulting
    /// commands for the IO shell.
    pub fn step(&mut self, event: CoreEvent) -> CoreStep {
        if self.state == BuildCycleState::Closed {
            debug!(?event, "controller closed; event ignored");
            return self.finish(Vec::new());
        }

        let commands = match event {
            CoreEvent::Started => self.on_started(),
            CoreEvent::FileChanged { change, at } => {
                let deadline = self.aggregator.record(change.path, change.kind, at);
                vec![CoreCommand::ArmDebounce(deadline)]
            }
            CoreEvent::DebounceElapsed { at } => self.on_debounce(at),
            CoreEvent::BuildFinished(result) => self.on_build_finished(result),
            CoreEvent::SetupFailed { message } | CoreEvent::BackendFailed { message } => {
                self.on_fatal(message)
            }
            CoreEvent::CloseRequested => {
                info!("close requested");
                self.shutdown()
            }
        };

        self.finish(commands)
    }

    fn on_started(&mut self) -> Vec<CoreCommand> {
        if self.builds_started > 0 {
            return Vec::new();
        }
        self.begin_build(Vec::new())
    }

    fn on_debounce(&mut self, at: tokio::time::Instant) -> Vec<CoreCommand> {
        if !self.aggregator.is_due(at) {
            // Timer raced with a newer change; wait for the new deadline.
            return match self.aggregator.deadline() {
                Some(deadline) if self.aggregator.has_pending() => {
                    vec![CoreCommand::ArmDebounce(deadline)]
                }
                _ => Vec::new(),
            };
        }

        match self.state {
            BuildCycleState::Building => {
                debug!("changes settled during build; rebuild deferred");
                self.aggregator.disarm();
                self.rebuild_deferred = true;
                Vec::new()
            }
            _ => {
                let changed = self.aggregator.take().into_paths();
                self.begin_build(changed)
            }
        }
    }

    fn on_build_finished(
        &mut self,
        result: Result<BuildSuccess, BuildError>,
    ) -> Vec<CoreCommand> {
        if self.state != BuildCycleState::Building {
            debug!("stale build result discarded");
            return Vec::new();
        }

        let build = self.builds_started;
        let mut commands = match result {
            Ok(success) => {
                self.errored = false;
                vec![
                    CoreCommand::Reconcile(ReconcileRequest::Success {
                        graph: success.graph,
                    }),
                    CoreCommand::Emit(LifecycleEvent::build_end(
                        build,
                        success.duration,
                        success.summary,
                    )),
                ]
            }
            Err(error) => {
                self.errored = true;
                vec![
                    CoreCommand::Reconcile(ReconcileRequest::Failure {
                        failing_path: error.path.clone(),
                    }),
                    CoreCommand::Emit(LifecycleEvent::error(build, error)),
                ]
            }
        };
        self.state = BuildCycleState::Idle;

        if self.rebuild_deferred {
            self.rebuild_deferred = false;
            let changed = self.aggregator.take().into_paths();
            commands.extend(self.begin_build(changed));
        }

        commands
    }

    fn on_fatal(&mut self, message: String) -> Vec<CoreCommand> {
        let mut commands = vec![CoreCommand::Emit(LifecycleEvent::fatal(FatalError::new(
            message,
        )))];
        commands.extend(self.shutdown());
        commands
    }

    fn shutdown(&mut self) -> Vec<CoreCommand> {
        self.state = BuildCycleState::Closed;
        self.rebuild_deferred = false;
        self.aggregator.take();
        vec![CoreCommand::CancelDebounce, CoreCommand::Shutdown]
    }

    fn begin_build(&mut self, changed: Vec<PathBuf>) -> Vec<CoreCommand> {
        self.builds_started += 1;
        self.state = BuildCycleState::Building;
        let build = self.builds_started;
        info!(build, changed = changed.len(), "build requested");
        vec![
            CoreCommand::CancelDebounce,
            CoreCommand::Emit(LifecycleEvent::build_start(build)),
            CoreCommand::StartBuild { build, changed },
        ]
    }

    fn finish(&self, commands: Vec<CoreCommand>) -> CoreStep {
        CoreStep {
            commands,
            keep_running: self.state != BuildCycleState::Closed,
        }
    }
}
