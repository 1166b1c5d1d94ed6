use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use watchbuild::bundler::{
    Artifact, BuildError, BuildFuture, BuildOutput, BuildRequest, Bundler, DependencyGraph,
};

/// A fake bundling engine that:
/// - records every request it receives
/// - answers with scripted results, falling back to a fixed graph
/// - optionally takes a while, so tests can overlap changes with builds
/// - tracks how many builds ran concurrently
pub struct FakeBundler {
    default_graph: DependencyGraph,
    scripted: Mutex<VecDeque<Result<DependencyGraph, BuildError>>>,
    requests: Mutex<Vec<BuildRequest>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    closed: AtomicBool,
}

impl FakeBundler {
    pub fn new(default_graph: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            default_graph: default_graph.into_iter().collect(),
            scripted: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a successful build reporting `graph`.
    pub fn push_ok(&self, graph: impl IntoIterator<Item = PathBuf>) {
        self.scripted
            .lock()
            .unwrap()
            .push_back(Ok(graph.into_iter().collect()));
    }

    /// Queue a failed build.
    pub fn push_err(&self, error: BuildError) {
        self.scripted.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<BuildRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn build_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Bundler for FakeBundler {
    fn build<'a>(&'a self, request: &'a BuildRequest) -> BuildFuture<'a> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let scripted = self.scripted.lock().unwrap().pop_front();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let graph = scripted.unwrap_or_else(|| Ok(self.default_graph.clone()))?;
            Ok(BuildOutput {
                artifact: Artifact {
                    code: format!("// fake bundle of {} modules\n", graph.len()),
                    modules: graph.len(),
                },
                graph,
            })
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
