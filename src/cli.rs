// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::Backend;

/// Command-line arguments for `watchbuild`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "watchbuild",
    version,
    about = "Rebuild a script bundle whenever one of its sources changes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Watchbuild.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Watchbuild.toml")]
    pub config: String,

    /// Build once and exit, no watching.
    #[arg(long)]
    pub once: bool,

    /// Override `[watch].backend` from the config file.
    #[arg(long, value_parser = parse_backend, value_name = "BACKEND")]
    pub backend: Option<Backend>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WATCHBUILD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the resolved configuration, but don't build.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_backend(s: &str) -> Result<Backend, String> {
    s.parse()
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
