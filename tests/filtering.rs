mod common;

use common::*;
use watchbuild::emitter::EventCode;

const MAIN: &str = "import foo from './foo';\nimport bar from './bar';\nexport default foo + bar;";

#[tokio::test]
async fn include_limits_what_triggers_a_rebuild() {
    init_tracing();
    let project = TestProject::new();
    let main = project.write("src/main.js", MAIN);
    let foo = project.write("src/foo.js", "export default 1;");
    let bar = project.write("src/bar.js", "export default 2;");

    let options = project.options().include("src/{main,foo}.js").build();
    let (watcher, mut events, fs) = spawn_with_fake_notifier(options, script_bundler());
    let first = events_until(&mut events, EventCode::BuildEnd).await;

    // bar is still bundled, just not watched.
    assert_eq!(build_output(first.last().unwrap()).modules, 3);
    assert!(fs.is_subscribed(&main) && fs.is_subscribed(&foo));
    assert!(!fs.is_subscribed(&bar));

    fs.change(&bar);
    settle().await;
    assert!(events.try_recv().is_none());

    fs.change(&foo);
    let next = events_until(&mut events, EventCode::BuildEnd).await;
    assert_eq!(codes(&next), vec![EventCode::BuildStart, EventCode::BuildEnd]);

    watcher.close();
    watcher.closed().await;
}

#[tokio::test]
async fn exclude_wins_over_the_graph() {
    init_tracing();
    let project = TestProject::new();
    project.write("src/main.js", MAIN);
    let foo = project.write("src/foo.js", "export default 1;");
    let bar = project.write("src/bar.js", "export default 2;");

    let options = project.options().exclude("**/bar.js").build();
    let (watcher, mut events, fs) = spawn_with_fake_notifier(options, script_bundler());
    events_until(&mut events, EventCode::BuildEnd).await;

    assert!(fs.is_subscribed(&foo));
    assert!(!fs.is_subscribed(&bar));

    fs.change(&bar);
    settle().await;
    assert!(events.try_recv().is_none());

    watcher.close();
    watcher.closed().await;
}

#[tokio::test]
async fn unrelated_files_in_a_watched_directory_are_ignored() {
    init_tracing();
    let project = TestProject::new();
    project.write("src/main.js", "export default 1;");
    let notes = project.write("src/notes.txt", "hello");

    let (watcher, mut events, fs) =
        spawn_with_fake_notifier(project.options().build(), script_bundler());
    events_until(&mut events, EventCode::BuildEnd).await;

    fs.change(&notes);
    fs.change(project.path("dist/bundle.js"));
    settle().await;
    assert!(events.try_recv().is_none());

    watcher.close();
    watcher.closed().await;
}
