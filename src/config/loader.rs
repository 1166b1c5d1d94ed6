// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::RawConfigFile;
use crate::config::validate::WatchOptions;
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** resolve paths or
/// perform semantic validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// Relative paths inside the file are resolved against the directory the
/// file lives in.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WatchOptions> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    WatchOptions::resolve(raw, config_root_dir(path))
}

/// Helper to resolve a default config path.
///
/// Currently this just returns `Watchbuild.toml` in the current working
/// directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Watchbuild.toml")
}

/// Directory relative paths in `config_path` are resolved against.
///
/// A bare filename like `Watchbuild.toml` (parent = "") means the current
/// working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
