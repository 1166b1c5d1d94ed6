// src/config/model.rs

use serde::Deserialize;

use crate::types::{Backend, BundleFormat};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [build]
/// entry = "src/main.js"
/// output = "dist/bundle.js"
/// format = "cjs"
///
/// [watch]
/// backend = "native"
/// include = ["src/**/*.js"]
/// exclude = ["src/**/*.tmp.js"]
/// debounce_ms = 100
/// ```
///
/// Nothing here is checked beyond TOML syntax and enum names; see
/// [`crate::config::WatchOptions`] for the validated form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub watch: WatchSection,
}

/// `[build]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildSection {
    /// Entry module(s), relative to the config file's directory.
    #[serde(default)]
    pub entry: OneOrMany,

    /// Output file(s); every output receives the same artifact.
    #[serde(default)]
    pub output: OneOrMany,

    #[serde(default)]
    pub format: BundleFormat,
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// `"native"` (default) or `"poll"` (alias `"chokidar"`).
    #[serde(default)]
    pub backend: Backend,

    /// Only paths matching one of these globs may trigger a rebuild.
    #[serde(default)]
    pub include: Vec<String>,

    /// Paths matching one of these globs never trigger a rebuild.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Quiet period before a burst of changes becomes a rebuild.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Only used by the poll backend.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            include: Vec::new(),
            exclude: Vec::new(),
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// A single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

impl From<&str> for OneOrMany {
    fn from(s: &str) -> Self {
        OneOrMany::One(s.to_string())
    }
}

impl From<Vec<String>> for OneOrMany {
    fn from(v: Vec<String>) -> Self {
        OneOrMany::Many(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg: RawConfigFile = toml::from_str(
            r#"
            [build]
            entry = "src/main.js"
            output = "dist/bundle.js"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.build.entry, OneOrMany::from("src/main.js"));
        assert_eq!(cfg.build.format, BundleFormat::Cjs);
        assert_eq!(cfg.watch.backend, Backend::Native);
        assert_eq!(cfg.watch.debounce_ms, 100);
        assert_eq!(cfg.watch.poll_interval_ms, 250);
    }

    #[test]
    fn lists_and_aliases_parse() {
        let cfg: RawConfigFile = toml::from_str(
            r#"
            [build]
            entry = ["a.js", "b.js"]
            output = ["out/a.js"]
            format = "esm"

            [watch]
            backend = "chokidar"
            include = ["src/**"]
            "#,
        )
        .unwrap();

        assert_eq!(cfg.build.entry.into_vec(), vec!["a.js", "b.js"]);
        assert_eq!(cfg.build.format, BundleFormat::Esm);
        assert_eq!(cfg.watch.backend, Backend::Poll);
        assert_eq!(cfg.watch.include, vec!["src/**"]);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let res: Result<RawConfigFile, _> = toml::from_str(
            r#"
            [watch]
            backend = "fsevents2"
            "#,
        );
        assert!(res.is_err());
    }
}
