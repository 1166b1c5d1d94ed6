mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use watchbuild::bundler::{BuildError, BuildErrorKind, Bundler};
use watchbuild::emitter::{EventCode, LifecycleEvent};
use watchbuild::errors::WatchbuildError;
use watchbuild::watcher::Watcher;

fn fake(project: &TestProject, delay_ms: u64) -> Arc<FakeBundler> {
    Arc::new(
        FakeBundler::new([project.path("src/main.js")])
            .with_delay(Duration::from_millis(delay_ms)),
    )
}

#[tokio::test]
async fn burst_of_changes_yields_one_build() {
    init_tracing();
    let project = TestProject::new();
    let main = project.path("src/main.js");
    let bundler = fake(&project, 0);

    let (watcher, mut events, fs) = spawn_with_fake_notifier(
        project.options().build(),
        Arc::clone(&bundler) as Arc<dyn Bundler>,
    );
    events_until(&mut events, EventCode::BuildEnd).await;

    for _ in 0..10 {
        fs.change(&main);
    }
    let batch = events_until(&mut events, EventCode::BuildEnd).await;
    assert_eq!(codes(&batch), vec![EventCode::BuildStart, EventCode::BuildEnd]);

    settle().await;
    assert!(events.try_recv().is_none());
    assert_eq!(bundler.build_count(), 2);
    assert_eq!(bundler.requests()[1].changed, vec![main.clone()]);
    assert!(bundler.requests()[0].changed.is_empty());

    watcher.close();
    watcher.closed().await;
}

#[tokio::test]
async fn changes_during_a_build_are_deferred_not_concurrent() {
    init_tracing();
    let project = TestProject::new();
    let main = project.path("src/main.js");
    let bundler = fake(&project, 200);

    let (watcher, mut events, fs) = spawn_with_fake_notifier(
        project.options().build(),
        Arc::clone(&bundler) as Arc<dyn Bundler>,
    );
    events_until(&mut events, EventCode::BuildEnd).await;

    fs.change(&main);
    assert_eq!(next_event(&mut events).await.code(), EventCode::BuildStart);
    // Build #2 is in flight for 200ms; this settles while it runs.
    fs.change(&main);

    let rest = events_until(&mut events, EventCode::BuildEnd).await;
    assert_eq!(codes(&rest), vec![EventCode::BuildEnd]);
    let rest = events_until(&mut events, EventCode::BuildEnd).await;
    assert_eq!(codes(&rest), vec![EventCode::BuildStart, EventCode::BuildEnd]);

    assert_eq!(bundler.build_count(), 3);
    assert_eq!(bundler.max_concurrent(), 1);

    watcher.close();
    watcher.closed().await;
}

#[tokio::test]
async fn entry_edited_during_initial_build_is_rebuilt() {
    init_tracing();
    let project = TestProject::new();
    let main = project.path("src/main.js");
    let bundler = fake(&project, 200);

    let (watcher, mut events, fs) = spawn_with_fake_notifier(
        project.options().build(),
        Arc::clone(&bundler) as Arc<dyn Bundler>,
    );
    assert_eq!(next_event(&mut events).await.code(), EventCode::BuildStart);
    assert!(fs.is_subscribed(&main));
    fs.change(&main);

    let first = events_until(&mut events, EventCode::BuildEnd).await;
    assert_eq!(codes(&first), vec![EventCode::BuildEnd]);
    let second = events_until(&mut events, EventCode::BuildEnd).await;
    assert_eq!(codes(&second), vec![EventCode::BuildStart, EventCode::BuildEnd]);

    assert_eq!(bundler.build_count(), 2);
    assert_eq!(bundler.requests()[1].changed, vec![main.clone()]);
    assert_eq!(bundler.max_concurrent(), 1);

    watcher.close();
    watcher.closed().await;
}

#[tokio::test]
async fn new_dependency_edited_before_its_build_ends_is_rebuilt() {
    init_tracing();
    let project = TestProject::new();
    let main = project.path("src/main.js");
    let helper = project.path("src/helper.js");
    let bundler = fake(&project, 200);
    bundler.push_ok([main.clone(), helper.clone()]);
    bundler.push_ok([main.clone(), helper.clone()]);

    let (watcher, mut events, fs) = spawn_with_fake_notifier(
        project.options().build(),
        Arc::clone(&bundler) as Arc<dyn Bundler>,
    );
    assert_eq!(next_event(&mut events).await.code(), EventCode::BuildStart);
    // Not tracked yet: the graph containing it is still being built.
    fs.change(&helper);

    events_until(&mut events, EventCode::BuildEnd).await;
    assert!(fs.is_subscribed(&helper));
    let second = events_until(&mut events, EventCode::BuildEnd).await;
    assert_eq!(codes(&second), vec![EventCode::BuildStart, EventCode::BuildEnd]);
    assert_eq!(bundler.requests()[1].changed, vec![helper.clone()]);

    watcher.close();
    watcher.closed().await;
}

#[tokio::test]
async fn unrelated_change_during_a_build_is_not_replayed() {
    init_tracing();
    let project = TestProject::new();
    let bundler = fake(&project, 200);

    let (watcher, mut events, fs) = spawn_with_fake_notifier(
        project.options().build(),
        Arc::clone(&bundler) as Arc<dyn Bundler>,
    );
    assert_eq!(next_event(&mut events).await.code(), EventCode::BuildStart);
    fs.change(project.path("notes/todo.js"));

    events_until(&mut events, EventCode::BuildEnd).await;
    settle().await;
    assert!(events.try_recv().is_none());
    assert_eq!(bundler.build_count(), 1);

    watcher.close();
    watcher.closed().await;
}

#[tokio::test]
async fn build_numbers_increase() {
    init_tracing();
    let project = TestProject::new();
    let main = project.path("src/main.js");
    let bundler = fake(&project, 0);

    let (watcher, mut events, fs) = spawn_with_fake_notifier(
        project.options().build(),
        Arc::clone(&bundler) as Arc<dyn Bundler>,
    );
    events_until(&mut events, EventCode::BuildEnd).await;
    fs.change(&main);

    match next_event(&mut events).await {
        LifecycleEvent::BuildStart { build, .. } => assert_eq!(build, 2),
        other => panic!("unexpected event {other:?}"),
    }
    match next_event(&mut events).await {
        LifecycleEvent::BuildEnd { build, output, .. } => {
            assert_eq!(build, 2);
            assert_eq!(output.outputs, vec![project.path("dist/bundle.js")]);
        }
        other => panic!("unexpected event {other:?}"),
    }

    watcher.close();
    watcher.closed().await;
}

#[tokio::test]
async fn failed_build_keeps_previous_watch_set() {
    init_tracing();
    let project = TestProject::new();
    let main = project.path("src/main.js");
    let helper = project.path("src/helper.js");
    let bundler = fake(&project, 0);
    bundler.push_ok([main.clone(), helper.clone()]);
    bundler.push_err(BuildError::new(BuildErrorKind::Engine, "engine exploded"));

    let (watcher, mut events, fs) = spawn_with_fake_notifier(
        project.options().build(),
        Arc::clone(&bundler) as Arc<dyn Bundler>,
    );
    events_until(&mut events, EventCode::BuildEnd).await;
    assert!(fs.is_subscribed(&helper));

    fs.change(&helper);
    let failed = events_until(&mut events, EventCode::Error).await;
    assert_eq!(build_error(failed.last().unwrap()).message, "engine exploded");
    assert!(fs.is_subscribed(&main) && fs.is_subscribed(&helper));

    // Next build falls back to the default graph, dropping `helper`.
    fs.change(&helper);
    events_until(&mut events, EventCode::BuildEnd).await;
    assert!(!fs.is_subscribed(&helper));

    watcher.close();
    watcher.closed().await;
}

#[tokio::test]
async fn backend_that_fails_to_start_is_fatal() {
    init_tracing();
    let project = TestProject::new();
    let bundler = fake(&project, 0);

    let (watcher, mut events) = Watcher::spawn_with_notifier(
        project.options().build(),
        Arc::clone(&bundler) as Arc<dyn Bundler>,
        |_tx| Err(WatchbuildError::ConfigError("no watches left".to_string())),
    );

    let event = next_event(&mut events).await;
    assert_eq!(event.code(), EventCode::Fatal);
    assert!(event.to_string().contains("no watches left"));
    assert!(with_timeout(events.recv()).await.is_none());

    assert!(watcher.is_closed());
    assert!(bundler.is_closed());
    assert_eq!(bundler.build_count(), 0);
    watcher.closed().await;
}

#[tokio::test]
async fn backend_that_dies_is_fatal() {
    init_tracing();
    let project = TestProject::new();
    let bundler = fake(&project, 0);

    let (watcher, mut events, fs) = spawn_with_fake_notifier(
        project.options().build(),
        Arc::clone(&bundler) as Arc<dyn Bundler>,
    );
    events_until(&mut events, EventCode::BuildEnd).await;

    fs.disconnect();
    assert_eq!(next_event(&mut events).await.code(), EventCode::Fatal);
    assert!(with_timeout(events.recv()).await.is_none());
    assert!(fs.subscribed().is_empty());

    watcher.closed().await;
}

#[tokio::test]
async fn close_is_idempotent_and_releases_everything() {
    init_tracing();
    let project = TestProject::new();
    let bundler = fake(&project, 0);

    let (watcher, mut events, fs) = spawn_with_fake_notifier(
        project.options().build(),
        Arc::clone(&bundler) as Arc<dyn Bundler>,
    );
    events_until(&mut events, EventCode::BuildEnd).await;
    assert!(!fs.subscribed().is_empty());

    watcher.close();
    watcher.close();
    assert!(with_timeout(events.recv()).await.is_none());

    assert!(fs.subscribed().is_empty());
    assert!(bundler.is_closed());
    assert!(watcher.is_closed());
    watcher.close();
    watcher.closed().await;
}

#[tokio::test]
async fn close_during_a_build_discards_its_result() {
    init_tracing();
    let project = TestProject::new();
    let bundler = fake(&project, 200);

    let (watcher, mut events, _fs) = spawn_with_fake_notifier(
        project.options().build(),
        Arc::clone(&bundler) as Arc<dyn Bundler>,
    );
    assert_eq!(next_event(&mut events).await.code(), EventCode::BuildStart);

    watcher.close();
    assert!(with_timeout(events.recv()).await.is_none());
    watcher.closed().await;
}

#[tokio::test]
async fn late_subscribers_see_later_events() {
    init_tracing();
    let project = TestProject::new();
    let main = project.path("src/main.js");
    let bundler = fake(&project, 0);

    let (watcher, mut events, fs) = spawn_with_fake_notifier(
        project.options().build(),
        Arc::clone(&bundler) as Arc<dyn Bundler>,
    );
    events_until(&mut events, EventCode::BuildEnd).await;

    let mut late = watcher.subscribe();
    fs.change(&main);

    let a = events_until(&mut events, EventCode::BuildEnd).await;
    let b = events_until(&mut late, EventCode::BuildEnd).await;
    assert_eq!(a, b);

    assert!(watcher.unsubscribe(&late));
    watcher.close();
    watcher.closed().await;
}
