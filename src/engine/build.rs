// src/engine/build.rs

//! One build job: run the engine, vet its graph, write the artifact.
//!
//! This runs inside a spawned task; its result is fed back into the core as
//! `CoreEvent::BuildFinished`. Every failure is turned into a [`BuildError`]
//! value, never propagated as a crate error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::bundler::{BuildError, BuildErrorKind, BuildRequest, Bundler, DependencyGraph};
use crate::watch::filter::PathFilter;

/// What was written by a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSummary {
    pub outputs: Vec<PathBuf>,
    /// Size of the generated code in bytes.
    pub bytes: usize,
    pub modules: usize,
    /// blake3 hex digest of the generated code.
    pub hash: String,
}

/// A build that passed every check and whose outputs are on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSuccess {
    pub graph: DependencyGraph,
    pub summary: ArtifactSummary,
    pub duration: Duration,
}

/// Run `request` through `bundler` and write the result to every output.
pub async fn run_build(
    bundler: &dyn Bundler,
    request: &BuildRequest,
    filter: &PathFilter,
) -> Result<BuildSuccess, BuildError> {
    let started = Instant::now();
    debug!(entries = ?request.entries, changed = request.changed.len(), "build starting");

    let output = bundler.build(request).await?;
    check_self_import(&output.graph, filter)?;

    let code = output.artifact.code;
    for out in filter.outputs() {
        write_output(out, code.as_bytes()).await?;
    }

    let summary = ArtifactSummary {
        outputs: filter.outputs().to_vec(),
        bytes: code.len(),
        modules: output.artifact.modules,
        hash: blake3::hash(code.as_bytes()).to_hex().to_string(),
    };
    let duration = started.elapsed();

    info!(
        modules = summary.modules,
        bytes = summary.bytes,
        duration_ms = duration.as_millis() as u64,
        "bundle written"
    );

    Ok(BuildSuccess {
        graph: output.graph,
        summary,
        duration,
    })
}

/// Reject graphs that read one of the build's own outputs.
///
/// Checked before anything is written so a bad build never clobbers the
/// previous artifact.
pub fn check_self_import(graph: &DependencyGraph, filter: &PathFilter) -> Result<(), BuildError> {
    match graph.iter().find(|path| filter.is_output(path)) {
        Some(path) => Err(BuildError::self_import(path.clone())),
        None => Ok(()),
    }
}

async fn write_output(path: &Path, contents: &[u8]) -> Result<(), BuildError> {
    let write_error = |err: std::io::Error| {
        BuildError::new(
            BuildErrorKind::Write,
            format!("Could not write {}: {err}", path.display()),
        )
        .with_path(path)
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
    }
    tokio::fs::write(path, contents).await.map_err(write_error)
}
