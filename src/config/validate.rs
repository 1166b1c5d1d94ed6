// src/config/validate.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::model::RawConfigFile;
use crate::errors::{Result, WatchbuildError};
use crate::types::{Backend, BundleFormat};
use crate::watch::filter::PathFilter;
use crate::watch::path_utils::absolutize;

/// Immutable, validated watcher configuration.
///
/// All paths are absolute. The compiled [`PathFilter`] is shared with the
/// runtime, so output paths are excluded from watching by construction.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub root: PathBuf,
    pub entries: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    pub format: BundleFormat,
    pub backend: Backend,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub debounce: Duration,
    pub poll_interval: Duration,
    pub filter: Arc<PathFilter>,
}

impl WatchOptions {
    /// Validate `raw` and resolve its relative paths against `root`.
    pub fn resolve(raw: RawConfigFile, root: impl AsRef<Path>) -> Result<Self> {
        let root = absolutize(root.as_ref());

        let entries = resolve_paths(&root, raw.build.entry.into_vec());
        let outputs = resolve_paths(&root, raw.build.output.into_vec());

        ensure_non_empty(&entries, "[build].entry")?;
        ensure_non_empty(&outputs, "[build].output")?;
        ensure_positive(raw.watch.debounce_ms, "[watch].debounce_ms")?;
        ensure_positive(raw.watch.poll_interval_ms, "[watch].poll_interval_ms")?;
        ensure_entries_outside_outputs(&entries, &outputs)?;

        let filter = PathFilter::new(&root, &outputs, &raw.watch.include, &raw.watch.exclude)?;

        Ok(Self {
            root,
            entries,
            outputs,
            format: raw.build.format,
            backend: raw.watch.backend,
            include: raw.watch.include,
            exclude: raw.watch.exclude,
            debounce: Duration::from_millis(raw.watch.debounce_ms),
            poll_interval: Duration::from_millis(raw.watch.poll_interval_ms),
            filter: Arc::new(filter),
        })
    }
}

impl TryFrom<RawConfigFile> for WatchOptions {
    type Error = WatchbuildError;

    /// Resolve against the current working directory.
    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let cwd = std::env::current_dir()?;
        WatchOptions::resolve(raw, cwd)
    }
}

fn resolve_paths(root: &Path, raw: Vec<String>) -> Vec<PathBuf> {
    raw.into_iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| absolutize(&root.join(s)))
        .collect()
}

fn ensure_non_empty(paths: &[PathBuf], field: &str) -> Result<()> {
    if paths.is_empty() {
        return Err(WatchbuildError::ConfigError(format!(
            "{field} must name at least one path"
        )));
    }
    Ok(())
}

fn ensure_positive(value: u64, field: &str) -> Result<()> {
    if value == 0 {
        return Err(WatchbuildError::ConfigError(format!(
            "{field} must be >= 1 (got 0)"
        )));
    }
    Ok(())
}

fn ensure_entries_outside_outputs(entries: &[PathBuf], outputs: &[PathBuf]) -> Result<()> {
    for entry in entries {
        if let Some(out) = outputs.iter().find(|out| entry.starts_with(out)) {
            return Err(WatchbuildError::ConfigError(format!(
                "entry {} lies inside output {}",
                entry.display(),
                out.display()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::OneOrMany;

    fn raw(entry: &str, output: &str) -> RawConfigFile {
        let mut cfg = RawConfigFile::default();
        cfg.build.entry = OneOrMany::from(entry);
        cfg.build.output = OneOrMany::from(output);
        cfg
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        let dir = tempfile::tempdir().unwrap();
        let opts = WatchOptions::resolve(raw("src/main.js", "dist/bundle.js"), dir.path()).unwrap();
        let root = dir.path().canonicalize().unwrap();

        assert_eq!(opts.root, root);
        assert_eq!(opts.entries, vec![root.join("src/main.js")]);
        assert_eq!(opts.outputs, vec![root.join("dist/bundle.js")]);
        assert_eq!(opts.debounce, Duration::from_millis(100));
        assert!(!opts.filter.should_watch(&root.join("dist/bundle.js")));
    }

    #[test]
    fn missing_entry_or_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = raw("main.js", "out.js");
        cfg.build.entry = OneOrMany::default();
        assert!(WatchOptions::resolve(cfg, dir.path()).is_err());

        let mut cfg = raw("main.js", "out.js");
        cfg.build.output = OneOrMany::Many(vec![" ".to_string()]);
        assert!(WatchOptions::resolve(cfg, dir.path()).is_err());
    }

    #[test]
    fn zero_debounce_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = raw("main.js", "out.js");
        cfg.watch.debounce_ms = 0;
        let err = WatchOptions::resolve(cfg, dir.path()).unwrap_err();
        assert!(err.to_string().contains("debounce_ms"));
    }

    #[test]
    fn entry_inside_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = WatchOptions::resolve(raw("dist/main.js", "dist"), dir.path()).unwrap_err();
        assert!(matches!(err, WatchbuildError::ConfigError(_)));
    }

    #[test]
    fn bad_glob_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = raw("main.js", "out.js");
        cfg.watch.exclude = vec!["src/[".to_string()];
        let err = WatchOptions::resolve(cfg, dir.path()).unwrap_err();
        assert!(matches!(err, WatchbuildError::GlobError(_)));
    }
}
