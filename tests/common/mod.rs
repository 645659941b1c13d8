//! Shared test utilities

use std::path::{Path, PathBuf};
use std::sync::Arc;

use plugin_host::{FactoryLoader, HostConfig, HostHandle, PluginRegistry};
use tempfile::TempDir;

/// Application and user-data roots in a temporary directory
pub struct Fixture {
    _dir: TempDir,
    pub config: HostConfig,
}

impl Fixture {
    #[must_use]
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let config = HostConfig::new(dir.path().join("app"), dir.path().join("data"));
        Self { _dir: dir, config }
    }

    /// Write a bundled plugin; `files` are created empty next to the manifest
    pub fn bundled(&self, name: &str, manifest: &str, files: &[&str]) -> PathBuf {
        write_plugin(&self.config.bundled_plugins_dir, name, manifest, files)
    }

    /// Write a user plugin; `files` are created empty next to the manifest
    pub fn user(&self, name: &str, manifest: &str, files: &[&str]) -> PathBuf {
        write_plugin(&self.config.user_plugins_dir, name, manifest, files)
    }

    /// Registry over this fixture's roots
    #[must_use]
    pub fn registry(&self, loader: FactoryLoader) -> PluginRegistry {
        self.registry_with_host(loader, HostHandle::default())
    }

    /// Registry over this fixture's roots, bound to `host`
    #[must_use]
    pub fn registry_with_host(&self, loader: FactoryLoader, host: HostHandle) -> PluginRegistry {
        PluginRegistry::new(self.config.clone(), Arc::new(loader), host)
    }
}

fn write_plugin(root: &Path, name: &str, manifest: &str, files: &[&str]) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).expect("failed to create plugin dir");
    std::fs::write(dir.join(plugin_host::plugins::MANIFEST_FILE), manifest)
        .expect("failed to write manifest");
    for file in files {
        std::fs::write(dir.join(file), "").expect("failed to write plugin file");
    }
    dir
}
