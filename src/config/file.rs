//! TOML configuration file loading
//!
//! Supports `~/.config/plugin-host/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HostConfigFile {
    /// Directory layout
    #[serde(default)]
    pub paths: PathsFileConfig,

    /// Renderer page addressing
    #[serde(default)]
    pub pages: PagesFileConfig,
}

/// Directory overrides
#[derive(Debug, Default, Deserialize)]
pub struct PathsFileConfig {
    /// Application root
    pub app_path: Option<PathBuf>,

    /// User-writable data root
    pub user_data: Option<PathBuf>,

    /// Application-bundled plugins directory
    pub bundled_plugins: Option<PathBuf>,

    /// User plugins directory
    pub user_plugins: Option<PathBuf>,
}

/// Renderer page configuration
#[derive(Debug, Default, Deserialize)]
pub struct PagesFileConfig {
    /// URL scheme plugin pages are served under
    pub scheme: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `HostConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> HostConfigFile {
    config_file_path().map_or_else(HostConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from an explicit path, falling back to defaults
#[must_use]
pub fn load_config_from(path: &Path) -> HostConfigFile {
    if !path.exists() {
        return HostConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                HostConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HostConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/plugin-host/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("plugin-host").join("config.toml"))
}
