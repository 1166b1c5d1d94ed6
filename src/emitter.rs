// src/emitter.rs

//! Ordered, multi-subscriber lifecycle event channel.
//!
//! Each subscriber owns an unbounded `mpsc` receiver, so a slow consumer
//! never blocks the runtime and every subscriber sees every event emitted
//! after it subscribed, in emission order. Closing the emitter drops all
//! senders: pending events are still delivered, then `recv` yields `None`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::trace;

use crate::bundler::BuildError;
use crate::engine::build::ArtifactSummary;
use crate::errors::FatalError;

/// Event published by the watcher.
///
/// `build` is the 1-based sequence number of the build the event belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    #[non_exhaustive]
    BuildStart { build: u64 },
    #[non_exhaustive]
    BuildEnd {
        build: u64,
        duration: Duration,
        output: ArtifactSummary,
    },
    #[non_exhaustive]
    Error { build: u64, error: BuildError },
    #[non_exhaustive]
    Fatal { error: FatalError },
}

/// Wire-level name of a [`LifecycleEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCode {
    BuildStart,
    BuildEnd,
    Error,
    Fatal,
}

impl EventCode {
    pub fn as_str(self) -> &'static str {
        match self {
            EventCode::BuildStart => "BUILD_START",
            EventCode::BuildEnd => "BUILD_END",
            EventCode::Error => "ERROR",
            EventCode::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LifecycleEvent {
    pub fn code(&self) -> EventCode {
        match self {
            LifecycleEvent::BuildStart { .. } => EventCode::BuildStart,
            LifecycleEvent::BuildEnd { .. } => EventCode::BuildEnd,
            LifecycleEvent::Error { .. } => EventCode::Error,
            LifecycleEvent::Fatal { .. } => EventCode::Fatal,
        }
    }

    pub(crate) fn build_start(build: u64) -> Self {
        LifecycleEvent::BuildStart { build }
    }

    pub(crate) fn build_end(build: u64, duration: Duration, output: ArtifactSummary) -> Self {
        LifecycleEvent::BuildEnd {
            build,
            duration,
            output,
        }
    }

    pub(crate) fn error(build: u64, error: BuildError) -> Self {
        LifecycleEvent::Error { build, error }
    }

    pub(crate) fn fatal(error: FatalError) -> Self {
        LifecycleEvent::Fatal { error }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::BuildStart { build } => write!(f, "BUILD_START #{build}"),
            LifecycleEvent::BuildEnd {
                build,
                duration,
                output,
            } => write!(
                f,
                "BUILD_END #{build} in {}ms ({} modules, {} bytes)",
                duration.as_millis(),
                output.modules,
                output.bytes
            ),
            LifecycleEvent::Error { build, error } => write!(f, "ERROR #{build}: {error}"),
            LifecycleEvent::Fatal { error } => write!(f, "FATAL: {error}"),
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    closed: bool,
    senders: BTreeMap<u64, mpsc::UnboundedSender<LifecycleEvent>>,
}

/// Fan-out of lifecycle events to every current subscriber.
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    inner: Arc<Mutex<Registry>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. After close the stream is already ended.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut reg = self.lock();
        let id = reg.next_id;
        reg.next_id += 1;
        if !reg.closed {
            reg.senders.insert(id, tx);
        }
        EventStream { id, rx }
    }

    /// Stop delivering to subscriber `id`. Returns false if it was unknown.
    pub fn unsubscribe(&self, id: u64) -> bool {
        self.lock().senders.remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().senders.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub(crate) fn emit(&self, event: LifecycleEvent) {
        let mut reg = self.lock();
        if reg.closed {
            trace!(code = %event.code(), "emitter closed; event dropped");
            return;
        }
        trace!(code = %event.code(), subscribers = reg.senders.len(), "emitting event");
        reg.senders.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn close(&self) {
        let mut reg = self.lock();
        reg.closed = true;
        reg.senders.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receiving half handed to one subscriber.
#[derive(Debug)]
pub struct EventStream {
    id: u64,
    rx: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl EventStream {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the watcher is closed and drained.
    pub async fn recv(&mut self) -> Option<LifecycleEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LifecycleEvent> {
        self.rx.try_recv().ok()
    }
}
