pub mod builders;
pub mod fake_bundler;
pub mod fake_notifier;

use std::sync::{Arc, Once};
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};
use watchbuild::bundler::Bundler;
use watchbuild::config::WatchOptions;
use watchbuild::emitter::{EventCode, EventStream, LifecycleEvent};
use watchbuild::watch::FsNotifier;
use watchbuild::watcher::Watcher;

pub use builders::{TestProject, WatchConfigBuilder};
pub use fake_bundler::FakeBundler;
pub use fake_notifier::{FakeNotifier, FakeNotifierHandle};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Start a watcher whose filesystem notifications are driven by the test.
pub fn spawn_with_fake_notifier(
    options: WatchOptions,
    bundler: Arc<dyn Bundler>,
) -> (Watcher, EventStream, FakeNotifierHandle) {
    let handle = FakeNotifierHandle::new();
    let for_watcher = handle.clone();
    let (watcher, events) = Watcher::spawn_with_notifier(options, bundler, move |tx| {
        Ok(Box::new(for_watcher.notifier(tx)) as Box<dyn FsNotifier>)
    });
    (watcher, events, handle)
}

/// Next event, failing the test if none arrives in time or the stream ended.
pub async fn next_event(events: &mut EventStream) -> LifecycleEvent {
    with_timeout(events.recv())
        .await
        .expect("event stream ended unexpectedly")
}

/// Collect events up to and including the first one with `code`.
pub async fn events_until(events: &mut EventStream, code: EventCode) -> Vec<LifecycleEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let done = event.code() == code;
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Event codes of `events`, for compact assertions.
pub fn codes(events: &[LifecycleEvent]) -> Vec<EventCode> {
    events.iter().map(LifecycleEvent::code).collect()
}
