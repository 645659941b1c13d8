//! Error types for the plugin host

use thiserror::Error;

use crate::plugins::loader::LoadError;

/// Result type alias for plugin host operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can surface from the plugin host
///
/// Only user-driven operations (configuration, enable/disable) return these.
/// Discovery, load, and activation failures are logged and isolated instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No plugin with this id is known to the registry
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// Manifest exists but cannot be rewritten
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Plugin module could not be loaded
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
