// src/watch/filter.rs

//! Decides whether a path may trigger (or be subscribed for) a rebuild.
//!
//! Rules, in evaluation order:
//!
//! 1. Anything equal to or below a declared output path is rejected. Watching
//!    the bundle would make every build retrigger itself.
//! 2. If `include` globs are configured, the path must match one of them.
//! 3. If `exclude` globs are configured, a match rejects the path, even when
//!    it was also included.
//!
//! With neither list configured every non-output path is watchable.

use std::fmt;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::Result;
use crate::watch::path_utils::{absolutize, relative_str};

/// Compiled include/exclude globs plus the output paths of the build.
///
/// Patterns are evaluated against the path relative to `root` (e.g.
/// `"src/foo.js"`). Absolute patterns also work, since the absolute form of
/// the path is tried as well.
#[derive(Clone)]
pub struct PathFilter {
    root: PathBuf,
    outputs: Vec<PathBuf>,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl fmt::Debug for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathFilter")
            .field("root", &self.root)
            .field("outputs", &self.outputs)
            .field("include", &self.include.is_some())
            .field("exclude", &self.exclude.is_some())
            .finish()
    }
}

impl PathFilter {
    /// Build a filter. Empty pattern lists mean "not configured".
    pub fn new(
        root: impl AsRef<Path>,
        outputs: &[PathBuf],
        include: &[String],
        exclude: &[String],
    ) -> Result<Self> {
        Ok(Self {
            root: absolutize(root.as_ref()),
            outputs: outputs.iter().map(|p| absolutize(p)).collect(),
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    /// Project root the glob patterns are relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Declared output paths, in absolute form.
    pub fn outputs(&self) -> &[PathBuf] {
        &self.outputs
    }

    /// True if `path` is, or lives under, one of the output paths.
    pub fn is_output(&self, path: &Path) -> bool {
        if self.outputs.iter().any(|out| path.starts_with(out)) {
            return true;
        }
        let abs = absolutize(path);
        self.outputs.iter().any(|out| abs.starts_with(out))
    }

    /// Whether a change to `path` may trigger a rebuild.
    pub fn should_watch(&self, path: &Path) -> bool {
        if self.is_output(path) {
            return false;
        }

        let candidates = self.candidates(path);

        if let Some(include) = &self.include {
            if !candidates.iter().any(|c| include.is_match(c)) {
                return false;
            }
        }

        if let Some(exclude) = &self.exclude {
            if candidates.iter().any(|c| exclude.is_match(c)) {
                return false;
            }
        }

        true
    }

    fn candidates(&self, path: &Path) -> Vec<String> {
        let mut out = Vec::with_capacity(2);
        if let Some(rel) = relative_str(&self.root, path) {
            out.push(rel);
        }
        out.push(path.to_string_lossy().replace('\\', "/"));
        out
    }
}

/// Build a GlobSet from simple string patterns; `None` if there are none.
fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(Glob::new(pat)?);
    }
    Ok(Some(builder.build()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(include: &[&str], exclude: &[&str]) -> PathFilter {
        let include: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
        PathFilter::new(
            "/project",
            &[PathBuf::from("/project/dist/bundle.js")],
            &include,
            &exclude,
        )
        .unwrap()
    }

    #[test]
    fn everything_but_output_is_watchable_by_default() {
        let f = filter(&[], &[]);
        assert!(f.should_watch(Path::new("/project/src/main.js")));
        assert!(f.should_watch(Path::new("/elsewhere/lib.js")));
        assert!(!f.should_watch(Path::new("/project/dist/bundle.js")));
    }

    #[test]
    fn output_rule_beats_include() {
        let f = filter(&["**/*.js"], &[]);
        assert!(!f.should_watch(Path::new("/project/dist/bundle.js")));
    }

    #[test]
    fn output_directory_covers_its_contents() {
        let f = PathFilter::new("/project", &[PathBuf::from("/project/dist")], &[], &[]).unwrap();
        assert!(f.is_output(Path::new("/project/dist/chunks/a.js")));
        assert!(!f.is_output(Path::new("/project/distribution/a.js")));
    }

    #[test]
    fn include_restricts_to_matching_paths() {
        let f = filter(&["src/{main,foo}.js"], &[]);
        assert!(f.should_watch(Path::new("/project/src/main.js")));
        assert!(f.should_watch(Path::new("/project/src/foo.js")));
        assert!(!f.should_watch(Path::new("/project/src/bar.js")));
    }

    #[test]
    fn exclude_wins_over_include() {
        let f = filter(&["src/**/*.js"], &["src/bar.js"]);
        assert!(f.should_watch(Path::new("/project/src/foo.js")));
        assert!(!f.should_watch(Path::new("/project/src/bar.js")));
    }

    #[test]
    fn absolute_patterns_match_absolute_paths() {
        let f = filter(&[], &["/vendor/**"]);
        assert!(!f.should_watch(Path::new("/vendor/lib/x.js")));
        assert!(f.should_watch(Path::new("/project/src/x.js")));
    }

    #[test]
    fn invalid_glob_is_rejected() {
        let err = PathFilter::new("/project", &[], &["src/[".to_string()], &[]);
        assert!(err.is_err());
    }
}
