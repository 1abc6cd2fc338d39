//! TOML-based configuration persistence for the kmbridge host.
//!
//! Reads and writes [`HostConfig`] to `kmbridge.toml`, either at a path given
//! on the command line or in the platform-appropriate directory:
//! - Windows:  `%APPDATA%\kmbridge\kmbridge.toml`
//! - Linux:    `~/.config/kmbridge/kmbridge.toml`
//! - macOS:    `~/Library/Application Support/kmbridge/kmbridge.toml`
//!
//! # What is TOML? (for beginners)
//!
//! TOML is a small configuration format that reads like an INI file with
//! real data types.  A typical kmbridge file:
//!
//! ```toml
//! [device]
//! backend = "makv2"
//! auto_connect = true
//!
//! [makv2]
//! port = "COM5"
//! baud = 4000000
//!
//! [movement_lock]
//! main_x = true
//! ```
//!
//! Each backend's section is the matching field of [`BackendSettings`], so
//! the same structs are used on disk and at connect time.
//!
//! # Serde default values
//!
//! Every field has a `#[serde(default)]`, so an empty file is valid and an
//! older file missing newer keys still loads.

use std::path::{Path, PathBuf};

use kmbridge_core::{AxisLockConfig, BackendKind, ButtonMaskConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::settings::BackendSettings;

/// File name used inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "kmbridge.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    #[serde(default)]
    pub device: DeviceSection,
    /// `[serial]`, `[makv2]`, `[dhz]` … one table per backend.
    #[serde(flatten)]
    pub backends: BackendSettings,
    #[serde(default)]
    pub movement_lock: AxisLockConfig,
    #[serde(default)]
    pub button_mask: ButtonMaskConfig,
}

/// Backend selection and host behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Backend name; any alias accepted by [`BackendKind::from_name`].
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Connect on startup.
    #[serde(default = "default_true")]
    pub auto_connect: bool,
    /// Raise a MAKCU link from 115 200 to 4 Mbaud after connecting.
    #[serde(default)]
    pub serial_auto_switch_4m: bool,
    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl DeviceSection {
    pub fn backend_kind(&self) -> BackendKind {
        BackendKind::from_name(&self.backend)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_backend() -> String {
    "serial".to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            auto_connect: default_true(),
            serial_auto_switch_4m: false,
            log_level: default_log_level(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Loads the config from the default path.
///
/// # Errors
///
/// As [`load_config_from`], plus [`ConfigError::NoPlatformConfigDir`].
pub fn load_config() -> Result<HostConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `HostConfig` from `path`, returning the default config if the file
/// does not exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<HostConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HostConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the default path.
///
/// # Errors
///
/// As [`save_config_to`], plus [`ConfigError::NoPlatformConfigDir`].
pub fn save_config(config: &HostConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &HostConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `kmbridge` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("kmbridge"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("kmbridge"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("kmbridge"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
