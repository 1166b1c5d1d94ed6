// src/bundler/mod.rs

//! The bundling engine seam.
//!
//! The watcher never analyses sources itself. It hands a [`BuildRequest`] to
//! a [`Bundler`] and gets back either the set of files the build read plus
//! the generated code, or a structured [`BuildError`]. Whatever graph the
//! engine reports is trusted as-is for watching.
//!
//! [`script::ScriptBundler`] is the built-in engine used by the CLI.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use thiserror::Error;

use crate::types::BundleFormat;

pub mod script;

pub use script::ScriptBundler;

/// Absolute paths of every source file a build read.
pub type DependencyGraph = BTreeSet<PathBuf>;

/// Message used when a build graph reaches into the build's own output.
pub const SELF_IMPORT_MESSAGE: &str = "Cannot import the generated bundle";

/// One invocation of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub entries: Vec<PathBuf>,
    pub format: BundleFormat,
    /// Paths whose change triggered this build; empty for the initial build.
    pub changed: Vec<PathBuf>,
}

/// Generated code, not yet written anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub code: String,
    /// Number of modules folded into `code`.
    pub modules: usize,
}

/// Successful engine result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub graph: DependencyGraph,
    pub artifact: Artifact,
}

/// Coarse classification of a failed build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildErrorKind {
    /// A module could not be parsed.
    Syntax,
    /// An import could not be resolved to a file.
    Unresolved,
    /// Modules import each other in a loop.
    Cycle,
    /// The build graph contains one of the build's own outputs.
    SelfImport,
    /// The artifact could not be written.
    Write,
    /// Anything else the engine reported.
    Engine,
}

impl fmt::Display for BuildErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildErrorKind::Syntax => "syntax",
            BuildErrorKind::Unresolved => "unresolved",
            BuildErrorKind::Cycle => "cycle",
            BuildErrorKind::SelfImport => "self-import",
            BuildErrorKind::Write => "write",
            BuildErrorKind::Engine => "engine",
        };
        f.write_str(s)
    }
}

/// A recoverable build failure. Travels to subscribers inside `ERROR` events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BuildError {
    pub kind: BuildErrorKind,
    pub message: String,
    /// The file the failure is about, when the engine knows it.
    pub path: Option<PathBuf>,
}

impl BuildError {
    pub fn new(kind: BuildErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn self_import(path: impl Into<PathBuf>) -> Self {
        Self::new(BuildErrorKind::SelfImport, SELF_IMPORT_MESSAGE).with_path(path)
    }
}

/// Future returned by [`Bundler::build`].
pub type BuildFuture<'a> =
    Pin<Box<dyn Future<Output = Result<BuildOutput, BuildError>> + Send + 'a>>;

/// Abstraction over the bundling engine.
///
/// This lets us swap in a scripted fake in tests while production code uses
/// [`ScriptBundler`].
pub trait Bundler: Send + Sync {
    /// Run one build. Must not write outputs; the watcher does that once the
    /// graph has been checked.
    fn build<'a>(&'a self, request: &'a BuildRequest) -> BuildFuture<'a>;

    /// Release engine resources. Called once when the watcher closes.
    fn close(&self) {}
}
