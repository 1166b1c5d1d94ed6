// src/lib.rs

pub mod bundler;
pub mod cli;
pub mod config;
pub mod emitter;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod types;
pub mod watch;
pub mod watcher;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{debug, info};

use crate::bundler::{BuildRequest, ScriptBundler};
use crate::cli::CliArgs;
use crate::config::{load_and_validate, WatchOptions};
use crate::emitter::LifecycleEvent;
use crate::engine::run_build;
use crate::watcher::Watcher;

pub use crate::bundler::{BuildError, BuildErrorKind, Bundler, DependencyGraph};
pub use crate::emitter::{EventCode, EventStream};
pub use crate::errors::{FatalError, WatchbuildError};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the built-in bundler
/// - the watcher (or a single build with `--once`)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut options = load_and_validate(&config_path)?;
    if let Some(backend) = args.backend {
        options.backend = backend;
    }

    if args.dry_run {
        print_dry_run(&options);
        return Ok(());
    }

    let bundler = Arc::new(ScriptBundler::new()?);

    if args.once {
        return build_once(&options, &bundler).await;
    }

    let (watcher, mut events) = Watcher::spawn(options, bundler);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut closing = false;
    let mut fatal = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    println!("{event}");
                    if let LifecycleEvent::Fatal { error } = event {
                        fatal = Some(error);
                    }
                }
                None => break,
            },
            res = &mut ctrl_c, if !closing => {
                if let Err(err) = res {
                    eprintln!("failed to listen for Ctrl+C: {err}");
                }
                info!("shutting down");
                closing = true;
                watcher.close();
            }
        }
    }

    watcher.closed().await;

    match fatal {
        Some(error) => Err(anyhow!("watcher stopped: {error}")),
        None => Ok(()),
    }
}

/// Single build without watching (`--once`).
async fn build_once(options: &WatchOptions, bundler: &ScriptBundler) -> Result<()> {
    let request = BuildRequest {
        entries: options.entries.clone(),
        format: options.format,
        changed: Vec::new(),
    };
    match run_build(bundler, &request, &options.filter).await {
        Ok(success) => {
            println!(
                "built {} modules ({} bytes, {}) in {}ms",
                success.summary.modules,
                success.summary.bytes,
                success.summary.hash,
                success.duration.as_millis()
            );
            Ok(())
        }
        Err(err) => Err(anyhow!("build failed ({}): {err}", err.kind)),
    }
}

/// Simple dry-run output: print the resolved configuration.
fn print_dry_run(options: &WatchOptions) {
    println!("watchbuild dry-run");
    println!("  root = {}", options.root.display());
    println!("  format = {}", options.format);
    println!("  backend = {}", options.backend);
    println!("  debounce = {}ms", options.debounce.as_millis());
    println!();

    println!("entries ({}):", options.entries.len());
    for entry in &options.entries {
        println!("  - {}", entry.display());
    }
    println!("outputs ({}):", options.outputs.len());
    for output in &options.outputs {
        println!("  - {}", output.display());
    }
    if !options.include.is_empty() {
        println!("include: {:?}", options.include);
    }
    if !options.exclude.is_empty() {
        println!("exclude: {:?}", options.exclude);
    }

    debug!("dry-run complete (no build)");
}
