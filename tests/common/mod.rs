#![allow(dead_code)]

use std::sync::Arc;

use watchbuild::bundler::{Bundler, ScriptBundler};
use watchbuild::emitter::LifecycleEvent;
use watchbuild::engine::ArtifactSummary;
use watchbuild::BuildError;

pub use watchbuild_test_utils::{
    codes, events_until, init_tracing, next_event, spawn_with_fake_notifier, with_timeout,
    FakeBundler, FakeNotifierHandle, TestProject,
};

pub fn script_bundler() -> Arc<dyn Bundler> {
    Arc::new(ScriptBundler::new().expect("compile bundler patterns"))
}

pub fn build_output(event: &LifecycleEvent) -> &ArtifactSummary {
    match event {
        LifecycleEvent::BuildEnd { output, .. } => output,
        other => panic!("expected BUILD_END, got {other:?}"),
    }
}

pub fn build_error(event: &LifecycleEvent) -> &BuildError {
    match event {
        LifecycleEvent::Error { error, .. } => error,
        other => panic!("expected ERROR, got {other:?}"),
    }
}

/// Give the runtime time to (not) react, for negative assertions.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
}
