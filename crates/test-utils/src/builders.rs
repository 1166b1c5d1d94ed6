#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use watchbuild::config::{OneOrMany, RawConfigFile, WatchOptions};
use watchbuild::types::{Backend, BundleFormat};

/// Builder for `WatchOptions` to simplify test setup.
pub struct WatchConfigBuilder {
    root: PathBuf,
    config: RawConfigFile,
}

impl WatchConfigBuilder {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let mut config = RawConfigFile::default();
        config.build.entry = OneOrMany::from("src/main.js");
        config.build.output = OneOrMany::from("dist/bundle.js");
        config.watch.debounce_ms = 20;
        Self {
            root: root.as_ref().to_path_buf(),
            config,
        }
    }

    pub fn entry(mut self, entry: &str) -> Self {
        self.config.build.entry = OneOrMany::from(entry);
        self
    }

    pub fn entries(mut self, entries: &[&str]) -> Self {
        self.config.build.entry =
            OneOrMany::Many(entries.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn output(mut self, output: &str) -> Self {
        self.config.build.output = OneOrMany::from(output);
        self
    }

    pub fn outputs(mut self, outputs: &[&str]) -> Self {
        self.config.build.output =
            OneOrMany::Many(outputs.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn format(mut self, format: BundleFormat) -> Self {
        self.config.build.format = format;
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.watch.backend = backend;
        self
    }

    pub fn include(mut self, pattern: &str) -> Self {
        self.config.watch.include.push(pattern.to_string());
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.config.watch.exclude.push(pattern.to_string());
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.watch.debounce_ms = ms;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.watch.poll_interval_ms = ms;
        self
    }

    pub fn build(self) -> WatchOptions {
        WatchOptions::resolve(self.config, &self.root)
            .expect("Failed to build valid options from builder")
    }
}

/// A throwaway source tree on disk.
///
/// `root` is canonical, so paths handed out here compare equal to the paths
/// the bundler reports.
pub struct TestProject {
    _dir: TempDir,
    root: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path().canonicalize().expect("canonicalize temp dir");
        Self { _dir: dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(&path, contents).expect("write source file");
        path
    }

    pub fn remove(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        std::fs::remove_file(&path).expect("remove source file");
        path
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).expect("read file")
    }

    pub fn options(&self) -> WatchConfigBuilder {
        WatchConfigBuilder::new(&self.root)
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
