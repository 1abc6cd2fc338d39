//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads `kmbridge.toml` from the command-line path
//! or the platform config directory, writes it back, and supplies defaults
//! on first run when no file exists yet.

pub mod config;
