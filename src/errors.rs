// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Setup-time problems (bad config, invalid globs, a watch backend that will
//! not start) are [`WatchbuildError`]s. Build failures are *not* errors in
//! this sense: they travel through the event stream as
//! [`crate::bundler::BuildError`] values.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchbuildError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid glob pattern: {0}")]
    GlobError(#[from] globset::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Watch backend error: {0}")]
    BackendError(#[from] notify::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Unrecoverable watcher failure, carried by `FATAL` events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct FatalError {
    pub message: String,
}

impl FatalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WatchbuildError>;
