//! Plugin registry and lifecycle
//!
//! The registry owns every record, the preload list, page registrations, and
//! the contribution stores. `load_all` rebuilds all of them from scratch:
//! scan both roots, load entry modules of enabled plugins, then run one
//! activation pass in discovery order. A plugin that fails at any stage is
//! logged and left inert; the pass always finishes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use super::context::{PluginContext, PluginPaths, Sinks};
use super::discovery::{self, Candidate, PluginDescriptor, PluginOrigin, SearchRoots};
use super::loader::{ModuleLoader, PluginModule};
use super::manifest::PluginManifest;
use super::pages::{self, RendererPage};
use super::persistence;
use crate::config::HostConfig;
use crate::contributions::{
    ContextMenuParams, ContextMenuRegistry, MenuItem, NetworkSession, SurfaceRef,
    WebRequestRegistry,
};
use crate::events::{EventBus, names};
use crate::host::HostHandle;
use crate::isolation::run_isolated;
use crate::{Error, Result};

/// Where a record ended up after the last load pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    /// Manifest says `enabled: false`
    Disabled,
    /// Enabled, but declares no entry module
    NoEntry,
    /// Entry module could not be loaded
    LoadFailed,
    /// Module loaded but exports nothing to activate
    Loaded,
    /// Activation ran to completion
    Active,
    /// Activation returned an error or panicked
    ActivationFailed,
}

/// Runtime state of one discovered plugin
#[derive(Debug, Clone)]
pub struct PluginRecord {
    pub id: String,
    pub directory: PathBuf,
    pub origin: PluginOrigin,
    pub manifest: PluginManifest,
    pub enabled: bool,
    /// Present only when the entry module loaded successfully
    pub module: Option<Arc<PluginModule>>,
    /// Absolute path of the entry module, kept for cache invalidation
    pub main_path: Option<PathBuf>,
    pub status: PluginStatus,
}

/// Counts from one load pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub discovered: usize,
    pub loaded: usize,
    pub load_failed: usize,
    pub activated: usize,
    pub activation_failed: usize,
}

/// Discovers, loads, and activates plugins, and owns their contributions
pub struct PluginRegistry {
    config: HostConfig,
    roots: SearchRoots,
    loader: Arc<dyn ModuleLoader>,
    host: HostHandle,
    records: Vec<PluginRecord>,
    preloads: Vec<PathBuf>,
    sinks: Sinks,
    loaded_once: bool,
}

impl PluginRegistry {
    /// Create a registry; nothing is scanned until [`load_all`](Self::load_all)
    #[must_use]
    pub fn new(config: HostConfig, loader: Arc<dyn ModuleLoader>, host: HostHandle) -> Self {
        Self {
            roots: config.search_roots(),
            config,
            loader,
            host,
            records: Vec::new(),
            preloads: Vec::new(),
            sinks: Sinks::default(),
            loaded_once: false,
        }
    }

    /// Host configuration
    #[must_use]
    pub const fn config(&self) -> &HostConfig {
        &self.config
    }

    /// List every plugin on disk without executing any plugin code
    ///
    /// Includes disabled plugins so a management surface can toggle them.
    #[must_use]
    pub fn discover_plugins(&self) -> Vec<PluginDescriptor> {
        self.roots.ensure_user_root();
        discovery::discover_plugins(&self.roots)
    }

    /// Discard all state, then discover, load, and activate every plugin
    pub fn load_all(&mut self) -> LoadSummary {
        self.reset();
        self.roots.ensure_user_root();

        let mut summary = LoadSummary::default();
        for candidate in discovery::scan(&self.roots) {
            let record = self.load_candidate(candidate, &mut summary);
            self.records.push(record);
        }
        summary.discovered = self.records.len();

        self.activate_all(&mut summary);
        self.loaded_once = true;

        tracing::info!(
            discovered = summary.discovered,
            loaded = summary.loaded,
            load_failed = summary.load_failed,
            activated = summary.activated,
            activation_failed = summary.activation_failed,
            preloads = self.preloads.len(),
            "plugin load pass complete"
        );
        self.sinks
            .events
            .emit(names::PLUGINS_LOADED, &[json!(summary.activated)]);
        summary
    }

    fn reset(&mut self) {
        self.records.clear();
        self.preloads.clear();
        self.sinks.pages.clear();
        self.sinks.web_requests.clear();
        self.sinks.context_menus.clear();
        self.sinks.events.clear_plugin_listeners();
        for channel in self.sinks.take_ipc_channels() {
            if !self.host.ipc().remove(&channel) {
                tracing::debug!(channel = %channel, "ipc channel already unbound");
            }
        }
    }

    /// Build a record, loading the entry module and preload of enabled plugins
    fn load_candidate(&mut self, candidate: Candidate, summary: &mut LoadSummary) -> PluginRecord {
        let Candidate {
            origin,
            directory,
            manifest,
        } = candidate;

        let mut record = PluginRecord {
            id: manifest.id.clone(),
            enabled: manifest.enabled,
            status: PluginStatus::Disabled,
            module: None,
            main_path: None,
            origin,
            directory,
            manifest,
        };

        if !record.enabled {
            tracing::debug!(plugin_id = %record.id, "plugin disabled, not loading");
            return record;
        }

        record.status = PluginStatus::NoEntry;
        if let Some(main) = &record.manifest.main {
            let main_path = record.directory.join(main);
            match self.loader.load(&main_path) {
                Ok(module) => {
                    tracing::info!(
                        plugin_id = %record.id,
                        version = %record.manifest.version,
                        ?origin,
                        "loaded plugin"
                    );
                    record.module = Some(module);
                    record.status = PluginStatus::Loaded;
                    summary.loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        plugin_id = %record.id,
                        path = %main_path.display(),
                        error = %e,
                        "failed to load plugin module"
                    );
                    record.status = PluginStatus::LoadFailed;
                    summary.load_failed += 1;
                }
            }
            record.main_path = Some(main_path);
        }

        if let Some(preload) = &record.manifest.renderer_preload {
            let preload_path = record.directory.join(preload);
            match preload_path.try_exists() {
                Ok(true) => self.preloads.push(preload_path),
                Ok(false) => tracing::debug!(
                    plugin_id = %record.id,
                    path = %preload_path.display(),
                    "renderer preload missing, skipping"
                ),
                Err(e) => tracing::debug!(
                    plugin_id = %record.id,
                    error = %e,
                    "cannot check renderer preload, skipping"
                ),
            }
        }

        record
    }

    /// Activate every enabled record with a module, in discovery order
    fn activate_all(&mut self, summary: &mut LoadSummary) {
        for index in 0..self.records.len() {
            let record = &self.records[index];
            if !record.enabled {
                continue;
            }
            let Some(module) = record.module.clone() else {
                continue;
            };

            let Some(entry) = module.entry_point().cloned() else {
                tracing::debug!(plugin_id = %record.id, "module has no activation entry point");
                continue;
            };

            let ctx = self.context_for(record);
            let status = match run_isolated(|| entry(&ctx)) {
                Ok(()) => {
                    tracing::debug!(plugin_id = %record.id, "activated plugin");
                    summary.activated += 1;
                    PluginStatus::Active
                }
                Err(fault) => {
                    tracing::error!(
                        plugin_id = %record.id,
                        error = %fault,
                        "plugin activation failed"
                    );
                    summary.activation_failed += 1;
                    PluginStatus::ActivationFailed
                }
            };
            self.records[index].status = status;
        }
    }

    fn context_for(&self, record: &PluginRecord) -> PluginContext {
        let paths = PluginPaths {
            app_path: self.config.app_path.clone(),
            user_data: self.config.user_data.clone(),
            plugin_dir: record.directory.clone(),
        };
        PluginContext::new(&record.id, self.host.clone(), paths, self.sinks.clone())
    }

    /// Invalidate cached modules, then run a full [`load_all`](Self::load_all)
    ///
    /// With an id, only that plugin's modules are invalidated; without, every
    /// tracked module is. Invalidation failures are ignored.
    pub fn reload(&mut self, id: Option<&str>) -> LoadSummary {
        let targets: Vec<&Path> = self
            .records
            .iter()
            .filter(|r| id.is_none_or(|id| r.id == id))
            .filter_map(|r| r.main_path.as_deref())
            .collect();

        for path in targets {
            match self.loader.invalidate(path) {
                Ok(dropped) => tracing::debug!(path = %path.display(), dropped, "invalidated plugin module"),
                Err(e) => tracing::debug!(
                    path = %path.display(),
                    error = %e,
                    "failed to invalidate plugin module"
                ),
            }
        }

        tracing::info!(plugin_id = id.unwrap_or("*"), "reloading plugins");
        self.load_all()
    }

    /// Persist a plugin's enabled flag to its manifest
    ///
    /// Takes effect on the next load pass. When several directories share the
    /// id, every one of them is updated, or none is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PluginNotFound`] for an unknown id, or the I/O or
    /// parse error from rewriting a manifest
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let dirs: Vec<PathBuf> = if self.loaded_once {
            self.records
                .iter()
                .filter(|r| r.id == id)
                .map(|r| r.directory.clone())
                .collect()
        } else {
            discovery::scan(&self.roots)
                .into_iter()
                .filter(|c| c.manifest.id == id)
                .map(|c| c.directory)
                .collect()
        };

        if dirs.is_empty() {
            return Err(Error::PluginNotFound(id.to_string()));
        }
        persistence::write_enabled_all(&dirs, enabled).await
    }

    /// All records from the last load pass, in discovery order
    #[must_use]
    pub fn records(&self) -> &[PluginRecord] {
        &self.records
    }

    /// First record with `id`
    #[must_use]
    pub fn record(&self, id: &str) -> Option<&PluginRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Absolute paths of existing renderer preload scripts
    #[must_use]
    pub fn preload_scripts(&self) -> Vec<PathBuf> {
        self.preloads.clone()
    }

    /// Copy of every renderer page registration
    #[must_use]
    pub fn renderer_pages(&self) -> Vec<RendererPage> {
        self.sinks.pages.all()
    }

    /// Page registration by id
    #[must_use]
    pub fn renderer_page(&self, id: &str) -> Option<RendererPage> {
        self.sinks.pages.get(id)
    }

    /// Special URL for a registered page
    #[must_use]
    pub fn page_url(&self, id: &str) -> String {
        pages::page_url(&self.config.page_scheme, id)
    }

    /// Resolve `<scheme>://<id>` to the page's `file://` URL
    #[must_use]
    pub fn resolve_page_url(&self, url: &str) -> Option<String> {
        let id = pages::page_id_from_url(&self.config.page_scheme, url)?;
        self.sinks.pages.get(id).map(|page| page.file_url)
    }

    /// The event bus plugins subscribe to
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.sinks.events
    }

    /// Collected web-request contributions
    #[must_use]
    pub const fn web_requests(&self) -> &WebRequestRegistry {
        &self.sinks.web_requests
    }

    /// Collected context-menu contributors
    #[must_use]
    pub const fn context_menus(&self) -> &ContextMenuRegistry {
        &self.sinks.context_menus
    }

    #[must_use]
    pub fn web_request_count(&self) -> usize {
        self.sinks.web_requests.len()
    }

    #[must_use]
    pub fn context_menu_count(&self) -> usize {
        self.sinks.context_menus.len()
    }

    /// Attach every collected web-request rule to `session`
    pub fn apply_web_requests(&self, session: &dyn NetworkSession) -> usize {
        self.sinks.web_requests.apply(session)
    }

    /// Let every contributor extend a context menu
    pub fn apply_context_menu(
        &self,
        template: &mut Vec<MenuItem>,
        params: &ContextMenuParams,
        surface: &SurfaceRef,
    ) -> usize {
        self.sinks.context_menus.apply(template, params, surface)
    }
}
