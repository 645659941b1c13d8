//! Plugin discovery - scan search roots for `plugin.json` manifests

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::manifest::{PluginManifest, read_manifest};

/// Which search root a plugin was found under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginOrigin {
    /// Shipped alongside the application
    Bundled,
    /// Installed into the user-writable data directory
    User,
}

/// The two directories plugins are discovered from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRoots {
    /// Application-bundled plugins (scanned first)
    pub bundled: PathBuf,
    /// User-writable plugins (scanned second, created if absent)
    pub user: PathBuf,
}

impl SearchRoots {
    /// Roots in scan order, tagged with their origin
    #[must_use]
    pub fn ordered(&self) -> [(PluginOrigin, &Path); 2] {
        [
            (PluginOrigin::Bundled, self.bundled.as_path()),
            (PluginOrigin::User, self.user.as_path()),
        ]
    }

    /// Create the user root if it does not exist yet
    ///
    /// Failure is logged; a missing user root simply yields no candidates.
    pub fn ensure_user_root(&self) {
        if let Err(e) = std::fs::create_dir_all(&self.user) {
            tracing::warn!(
                path = %self.user.display(),
                error = %e,
                "failed to create user plugin directory"
            );
        }
    }
}

/// A plugin directory with a readable manifest
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Root the plugin came from
    pub origin: PluginOrigin,
    /// Absolute plugin directory
    pub directory: PathBuf,
    /// Normalized manifest
    pub manifest: PluginManifest,
}

/// Read-only view of a discovered plugin for management surfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub categories: Vec<String>,
    pub authors: Vec<String>,
    pub enabled: bool,
    pub has_main: bool,
    pub has_preload: bool,
    pub directory: PathBuf,
    pub origin: PluginOrigin,
}

impl From<&Candidate> for PluginDescriptor {
    fn from(candidate: &Candidate) -> Self {
        let m = &candidate.manifest;
        Self {
            id: m.id.clone(),
            name: m.name.clone(),
            version: m.version.clone(),
            description: m.description.clone(),
            categories: m.categories.clone(),
            authors: m.authors.clone(),
            enabled: m.enabled,
            has_main: m.main.is_some(),
            has_preload: m.renderer_preload.is_some(),
            directory: candidate.directory.clone(),
            origin: candidate.origin,
        }
    }
}

/// Scan both roots for plugin candidates
///
/// Bundled root first, then user root. Within a root, subdirectories are
/// visited in file-name order. Directories without a usable manifest are
/// skipped. No plugin code is executed.
#[must_use]
pub fn scan(roots: &SearchRoots) -> Vec<Candidate> {
    let mut results = Vec::new();

    for (origin, dir) in roots.ordered() {
        for directory in plugin_dirs(dir) {
            if let Some(manifest) = read_manifest(&directory) {
                tracing::debug!(
                    plugin_id = %manifest.id,
                    path = %directory.display(),
                    ?origin,
                    "discovered plugin"
                );
                results.push(Candidate {
                    origin,
                    directory,
                    manifest,
                });
            }
        }
    }

    results
}

/// List the immediate subdirectories of a root, sorted by name
fn plugin_dirs(root: &Path) -> Vec<PathBuf> {
    if !root.is_dir() {
        tracing::debug!(path = %root.display(), "plugin directory does not exist, skipping");
        return Vec::new();
    }

    let Ok(entries) = std::fs::read_dir(root) else {
        tracing::warn!(path = %root.display(), "failed to read plugin directory");
        return Vec::new();
    };

    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .map(|path| std::path::absolute(&path).unwrap_or(path))
        .collect();
    dirs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    dirs
}

/// Discover plugins for display, including disabled ones
#[must_use]
pub fn discover_plugins(roots: &SearchRoots) -> Vec<PluginDescriptor> {
    scan(roots).iter().map(PluginDescriptor::from).collect()
}
