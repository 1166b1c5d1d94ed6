// src/config/mod.rs

//! Configuration loading and validation for watchbuild.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Resolve and validate it into immutable [`WatchOptions`] (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{BuildSection, OneOrMany, RawConfigFile, WatchSection};
pub use validate::WatchOptions;
