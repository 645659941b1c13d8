//! Plugin system
//!
//! Plugins are discovered from `plugin.json` manifests in a bundled and a
//! user directory. Enabled plugins have their entry module loaded and
//! activated with a [`PluginContext`] through which they contribute event
//! listeners, IPC handlers, web-request rules, context-menu items, renderer
//! preloads, and renderer pages.

pub mod context;
pub mod discovery;
pub mod loader;
pub mod manifest;
pub mod pages;
pub mod persistence;
pub mod registry;

pub use context::{PluginContext, PluginPaths};
pub use discovery::{PluginDescriptor, PluginOrigin, SearchRoots, discover_plugins};
pub use loader::{FactoryLoader, LoadError, ModuleExports, ModuleLoader, PluginModule};
pub use manifest::{MANIFEST_FILE, PluginManifest};
pub use pages::{RendererPage, RendererPageSpec};
pub use registry::{LoadSummary, PluginRecord, PluginRegistry, PluginStatus};
