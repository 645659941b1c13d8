//! Configuration for the plugin host
//!
//! Precedence is env > TOML file > defaults.

pub mod file;

use std::path::{Path, PathBuf};

use crate::plugins::discovery::SearchRoots;
use crate::plugins::pages::DEFAULT_PAGE_SCHEME;
use crate::{Error, Result};

use file::HostConfigFile;

/// Plugin host configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Application root (exposed to plugins as `appPath`)
    pub app_path: PathBuf,

    /// User-writable data root (exposed to plugins as `userData`)
    pub user_data: PathBuf,

    /// Plugins shipped with the application
    pub bundled_plugins_dir: PathBuf,

    /// Plugins installed by the user
    pub user_plugins_dir: PathBuf,

    /// Scheme renderer pages are addressed under
    pub page_scheme: String,
}

impl HostConfig {
    /// Build a config from the two roots, deriving plugin directories
    ///
    /// Bundled plugins live in `<app_path>/plugins`, user plugins in
    /// `<user_data>/plugins`.
    #[must_use]
    pub fn new(app_path: impl Into<PathBuf>, user_data: impl Into<PathBuf>) -> Self {
        let app_path = app_path.into();
        let user_data = user_data.into();
        Self {
            bundled_plugins_dir: app_path.join("plugins"),
            user_plugins_dir: user_data.join("plugins"),
            app_path,
            user_data,
            page_scheme: DEFAULT_PAGE_SCHEME.to_string(),
        }
    }

    /// Load configuration from the environment and the standard config file
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load() -> Result<Self> {
        Self::from_sources(&file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Load configuration with an explicit config file
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::from_sources(&file::load_config_from(path), |key| std::env::var(key).ok())
    }

    /// Merge env (via `env`), file, and defaults
    fn from_sources(fc: &HostConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_path = |key: &str| env(key).filter(|v| !v.is_empty()).map(PathBuf::from);

        let app_path = env_path("PLUGIN_HOST_APP_PATH")
            .or_else(|| fc.paths.app_path.clone())
            .unwrap_or_else(default_app_path);
        let user_data = env_path("PLUGIN_HOST_USER_DATA")
            .or_else(|| fc.paths.user_data.clone())
            .unwrap_or_else(default_user_data);

        let mut config = Self::new(app_path, user_data);
        if let Some(dir) = env_path("PLUGIN_HOST_BUNDLED_DIR").or_else(|| fc.paths.bundled_plugins.clone()) {
            config.bundled_plugins_dir = dir;
        }
        if let Some(dir) =
            env_path("PLUGIN_HOST_USER_PLUGINS_DIR").or_else(|| fc.paths.user_plugins.clone())
        {
            config.user_plugins_dir = dir;
        }
        if let Some(scheme) = env("PLUGIN_HOST_PAGE_SCHEME").or_else(|| fc.pages.scheme.clone()) {
            config.page_scheme = scheme;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the page scheme is a usable URL scheme
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty or malformed scheme
    pub fn validate(&self) -> Result<()> {
        let mut chars = self.page_scheme.chars();
        let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !valid {
            return Err(Error::Config(format!(
                "invalid page scheme: {:?}",
                self.page_scheme
            )));
        }
        Ok(())
    }

    /// Search roots in scan order
    #[must_use]
    pub fn search_roots(&self) -> SearchRoots {
        SearchRoots {
            bundled: self.bundled_plugins_dir.clone(),
            user: self.user_plugins_dir.clone(),
        }
    }
}

/// Directory containing the running executable
fn default_app_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `~/.local/share/plugin-host` on Linux
fn default_user_data() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".local/share/plugin-host"),
        |d| d.data_dir().join("plugin-host"),
    )
}
