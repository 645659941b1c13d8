//! Loadable plugin units
//!
//! Plugin code is compiled into the host and registered by entry name. A
//! manifest's `main` points at an entry file inside the plugin directory; the
//! file stem selects the registered factory and the file must exist on disk.
//! Instantiated modules are cached per path until invalidated, so a reload of
//! one plugin re-runs its factory while untouched plugins keep their instance.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use super::context::PluginContext;
use crate::isolation::{Fault, run_isolated};

/// Activation entry point exported by a plugin module
pub type ActivateFn = Arc<dyn Fn(&PluginContext) -> anyhow::Result<()> + Send + Sync>;

/// Factory that instantiates a plugin module
pub type ModuleFactory = Arc<dyn Fn() -> anyhow::Result<PluginModule> + Send + Sync>;

/// Why a plugin module could not be loaded
#[derive(Debug, Error)]
pub enum LoadError {
    /// Entry file does not exist
    #[error("entry file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// No factory is registered under the entry name
    #[error("no module registered for entry `{0}`")]
    Unregistered(String),

    /// Factory returned an error
    #[error("module `{entry}` failed to initialize: {reason}")]
    Failed { entry: String, reason: String },

    /// Factory panicked
    #[error("module `{entry}` panicked during initialization: {reason}")]
    Panicked { entry: String, reason: String },

    /// Entry path could not be resolved
    #[error("cannot resolve entry path {}: {source}", path.display())]
    Resolve {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What a loaded module exposes, decided once at load time
#[derive(Clone)]
pub enum ModuleExports {
    /// Module exports a named `activate` entry point
    Activate(ActivateFn),
    /// Module itself is invocable with the context
    Callable(ActivateFn),
    /// Module exposes nothing to call; it loads but never activates
    Inert,
}

impl fmt::Debug for ModuleExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Activate(_) => "Activate",
            Self::Callable(_) => "Callable",
            Self::Inert => "Inert",
        })
    }
}

/// Handle to an instantiated plugin module
#[derive(Debug, Clone)]
pub struct PluginModule {
    exports: ModuleExports,
}

impl PluginModule {
    /// Module with a named `activate` entry point
    pub fn with_activate(
        activate: impl Fn(&PluginContext) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            exports: ModuleExports::Activate(Arc::new(activate)),
        }
    }

    /// Module that is itself the activation function
    pub fn callable(
        call: impl Fn(&PluginContext) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            exports: ModuleExports::Callable(Arc::new(call)),
        }
    }

    /// Module with no activation surface
    #[must_use]
    pub const fn inert() -> Self {
        Self {
            exports: ModuleExports::Inert,
        }
    }

    /// Exported activation surface
    #[must_use]
    pub const fn exports(&self) -> &ModuleExports {
        &self.exports
    }

    /// Entry point to invoke, if any
    #[must_use]
    pub fn entry_point(&self) -> Option<&ActivateFn> {
        match &self.exports {
            ModuleExports::Activate(f) | ModuleExports::Callable(f) => Some(f),
            ModuleExports::Inert => None,
        }
    }
}

/// Capability to turn a resolved entry path into a plugin module
pub trait ModuleLoader: Send + Sync {
    /// Load (or fetch from cache) the module at `path`
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] if the module cannot be obtained
    fn load(&self, path: &Path) -> Result<Arc<PluginModule>, LoadError>;

    /// Drop the cached module at `path`, returning whether one was cached
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] if the path cannot be resolved
    fn invalidate(&self, path: &Path) -> Result<bool, LoadError>;
}

/// Loader backed by factories registered under entry names
#[derive(Default)]
pub struct FactoryLoader {
    factories: HashMap<String, ModuleFactory>,
    cache: Mutex<HashMap<PathBuf, Arc<PluginModule>>>,
}

impl FactoryLoader {
    /// Create a loader with no registered factories
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for entry files named `<entry>.*`
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register(
        &mut self,
        entry: impl Into<String>,
        factory: impl Fn() -> anyhow::Result<PluginModule> + Send + Sync + 'static,
    ) -> &mut Self {
        self.factories.insert(entry.into(), Arc::new(factory));
        self
    }

    /// Builder-style [`register`](Self::register)
    #[must_use]
    pub fn with(
        mut self,
        entry: impl Into<String>,
        factory: impl Fn() -> anyhow::Result<PluginModule> + Send + Sync + 'static,
    ) -> Self {
        self.register(entry, factory);
        self
    }

    /// Registered entry names, sorted
    #[must_use]
    pub fn entries(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of cached module instances
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn resolve(path: &Path) -> Result<PathBuf, LoadError> {
        std::fs::canonicalize(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LoadError::NotFound(path.to_path_buf())
            } else {
                LoadError::Resolve {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
    }
}

/// Entry name for a path: its file stem
fn entry_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl ModuleLoader for FactoryLoader {
    fn load(&self, path: &Path) -> Result<Arc<PluginModule>, LoadError> {
        let resolved = Self::resolve(path)?;
        if !resolved.is_file() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(module) = cache.get(&resolved) {
            return Ok(Arc::clone(module));
        }

        let entry = entry_name(&resolved);
        let factory = self
            .factories
            .get(&entry)
            .ok_or_else(|| LoadError::Unregistered(entry.clone()))?;

        let module = match run_isolated(|| factory()) {
            Ok(module) => Arc::new(module),
            Err(Fault::Error(e)) => {
                return Err(LoadError::Failed {
                    entry,
                    reason: format!("{e:#}"),
                });
            }
            Err(Fault::Panic(reason)) => return Err(LoadError::Panicked { entry, reason }),
        };

        tracing::debug!(
            entry = %entry,
            path = %resolved.display(),
            exports = ?module.exports(),
            "instantiated plugin module"
        );
        cache.insert(resolved, Arc::clone(&module));
        Ok(module)
    }

    fn invalidate(&self, path: &Path) -> Result<bool, LoadError> {
        let resolved = Self::resolve(path)?;
        let removed = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&resolved);
        Ok(removed.is_some())
    }
}
