use std::path::{Path, PathBuf};
use std::time::Duration;

use proptest::prelude::*;
use tokio::time::Instant;
use watchbuild::emitter::EventCode;
use watchbuild::engine::{ArtifactSummary, BuildSuccess, CoreCommand, CoreController, CoreEvent};
use watchbuild::watch::{ChangeKind, PathFilter, RawChange};

const DELAY: Duration = Duration::from_millis(100);

fn emitted(commands: &[CoreCommand]) -> Vec<EventCode> {
    commands
        .iter()
        .filter_map(|c| match c {
            CoreCommand::Emit(ev) => Some(ev.code()),
            _ => None,
        })
        .collect()
}

fn ok_build() -> CoreEvent {
    CoreEvent::BuildFinished(Ok(BuildSuccess {
        graph: [PathBuf::from("/p/src/main.js")].into_iter().collect(),
        summary: ArtifactSummary {
            outputs: vec![PathBuf::from("/p/dist/bundle.js")],
            bytes: 1,
            modules: 1,
            hash: String::new(),
        },
        duration: Duration::ZERO,
    }))
}

fn kind_strategy() -> impl Strategy<Value = ChangeKind> {
    prop_oneof![
        Just(ChangeKind::Add),
        Just(ChangeKind::Change),
        Just(ChangeKind::Unlink),
    ]
}

proptest! {
    /// However a burst is shaped, as long as every gap is shorter than the
    /// debounce window it produces exactly one BUILD_START.
    #[test]
    fn burst_within_window_starts_one_build(
        gaps in proptest::collection::vec(0u64..99, 1..40),
        files in proptest::collection::vec((0usize..5, kind_strategy()), 1..40),
    ) {
        let mut core = CoreController::new(DELAY);
        core.step(CoreEvent::Started);
        core.step(ok_build());

        let mut now = Instant::now();
        let mut starts = 0;
        for (i, gap) in gaps.iter().enumerate() {
            now += Duration::from_millis(*gap);
            let (file, kind) = files[i % files.len()];
            let step = core.step(CoreEvent::FileChanged {
                change: RawChange::new(format!("/p/src/f{file}.js"), kind),
                at: now,
            });
            starts += emitted(&step.commands).iter().filter(|c| **c == EventCode::BuildStart).count();
            // A timer firing early must not start a build.
            let early = core.step(CoreEvent::DebounceElapsed { at: now + Duration::from_millis(1) });
            starts += emitted(&early.commands).iter().filter(|c| **c == EventCode::BuildStart).count();
        }
        prop_assert_eq!(starts, 0);

        let step = core.step(CoreEvent::DebounceElapsed { at: now + DELAY });
        prop_assert_eq!(emitted(&step.commands), vec![EventCode::BuildStart]);
        prop_assert!(!core.has_pending());
    }

    /// Output paths are never watchable, whatever the include patterns say.
    #[test]
    fn outputs_are_never_watched(
        name in "[a-z]{1,8}",
        include_all in any::<bool>(),
    ) {
        let include = if include_all { vec!["**".to_string()] } else { Vec::new() };
        let filter = PathFilter::new(
            "/p",
            &[PathBuf::from("/p/dist")],
            &include,
            &[],
        ).unwrap();

        let output_file = format!("/p/dist/{name}.js");
        let source_file = format!("/p/src/{name}.js");
        prop_assert!(!filter.should_watch(Path::new(&output_file)));
        prop_assert!(filter.should_watch(Path::new(&source_file)));
    }
}
