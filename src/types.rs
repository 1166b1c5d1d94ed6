// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Which filesystem notification primitive backs the watcher.
///
/// - `Native`: the platform's recommended watcher (inotify, FSEvents, ...).
/// - `Poll`: a stat-polling watcher; slower but works on network mounts and
///   inside containers where native events are unreliable. `chokidar` is
///   accepted as an alias for configs written for JavaScript tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Native,
    #[serde(alias = "chokidar")]
    Poll,
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Native
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "native" => Ok(Backend::Native),
            "poll" | "chokidar" => Ok(Backend::Poll),
            other => Err(format!(
                "invalid watch backend: {other} (expected \"native\" or \"poll\")"
            )),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Native => f.write_str("native"),
            Backend::Poll => f.write_str("poll"),
        }
    }
}

/// Module format of the generated bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleFormat {
    /// `module.exports = ...`
    Cjs,
    /// `export default ...`
    Esm,
}

impl Default for BundleFormat {
    fn default() -> Self {
        BundleFormat::Cjs
    }
}

impl FromStr for BundleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cjs" | "commonjs" => Ok(BundleFormat::Cjs),
            "esm" | "es" => Ok(BundleFormat::Esm),
            other => Err(format!(
                "invalid bundle format: {other} (expected \"cjs\" or \"esm\")"
            )),
        }
    }
}

impl fmt::Display for BundleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleFormat::Cjs => f.write_str("cjs"),
            BundleFormat::Esm => f.write_str("esm"),
        }
    }
}
