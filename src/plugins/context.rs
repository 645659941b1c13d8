//! Capability-scoped context handed to each plugin's activation entry point
//!
//! A plugin never sees the registry or its collections. It gets forwarded host
//! primitives, its own paths, prefixed logging, and append-only registration
//! calls. Registration calls are best-effort: anything that goes wrong inside
//! one is logged against the plugin and the registration is dropped.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;

use super::pages::{PageRegistry, RendererPage, RendererPageSpec};
use crate::contributions::{
    ContextMenuParams, ContextMenuRegistry, MenuItem, RequestDetails, SurfaceRef,
    WebRequestFilter, WebRequestRegistry,
};
use crate::events::EventBus;
use crate::host::{HostHandle, IpcHandler};
use crate::isolation::run_isolated;

/// Filesystem locations exposed to a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginPaths {
    /// Application root
    pub app_path: PathBuf,
    /// User-writable data root
    pub user_data: PathBuf,
    /// This plugin's own directory
    pub plugin_dir: PathBuf,
}

/// Shared stores the context appends into
#[derive(Debug, Clone, Default)]
pub(crate) struct Sinks {
    pub events: EventBus,
    pub web_requests: WebRequestRegistry,
    pub context_menus: ContextMenuRegistry,
    pub pages: PageRegistry,
    /// IPC channels bound during the current load pass
    pub ipc_channels: Arc<Mutex<Vec<String>>>,
}

impl Sinks {
    /// Take the channels bound so far, leaving the list empty
    pub fn take_ipc_channels(&self) -> Vec<String> {
        std::mem::take(&mut *self.ipc_channels.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Context passed to `activate`
#[derive(Debug)]
pub struct PluginContext {
    plugin_id: String,
    host: HostHandle,
    paths: PluginPaths,
    sinks: Sinks,
}

impl PluginContext {
    pub(crate) fn new(plugin_id: &str, host: HostHandle, paths: PluginPaths, sinks: Sinks) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            host,
            paths,
            sinks,
        }
    }

    /// Id of the plugin this context belongs to
    #[must_use]
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Forwarded host primitives
    #[must_use]
    pub const fn host(&self) -> &HostHandle {
        &self.host
    }

    /// Application, user-data, and plugin directories
    #[must_use]
    pub const fn paths(&self) -> &PluginPaths {
        &self.paths
    }

    /// Plugin directory shortcut
    #[must_use]
    pub fn plugin_dir(&self) -> &Path {
        &self.paths.plugin_dir
    }

    /// Log at info level, prefixed with the plugin id
    pub fn log(&self, message: &str) {
        tracing::info!(plugin = %self.plugin_id, "[{}] {message}", self.plugin_id);
    }

    /// Log at warn level, prefixed with the plugin id
    pub fn warn(&self, message: &str) {
        tracing::warn!(plugin = %self.plugin_id, "[{}] {message}", self.plugin_id);
    }

    /// Log at error level, prefixed with the plugin id
    pub fn error(&self, message: &str) {
        tracing::error!(plugin = %self.plugin_id, "[{}] {message}", self.plugin_id);
    }

    /// Subscribe to a host event
    pub fn on(
        &self,
        event: &str,
        callback: impl Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    ) {
        self.guard("on", || {
            self.sinks
                .events
                .subscribe(event, Some(&self.plugin_id), Arc::new(callback));
            Ok(())
        });
    }

    /// Register a request/response handler on an IPC channel
    ///
    /// The handler runs behind an error barrier: a failure or panic becomes
    /// an error reply instead of unwinding into the host's dispatch.
    pub fn register_ipc(
        &self,
        channel: &str,
        handler: impl Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) {
        let plugin_id = self.plugin_id.clone();
        let channel_name = channel.to_string();
        let guarded: IpcHandler = Arc::new(move |args: &[Value]| {
            run_isolated(|| handler(args)).map_err(|fault| {
                tracing::error!(
                    plugin_id = %plugin_id,
                    channel = %channel_name,
                    error = %fault,
                    "ipc handler failed"
                );
                anyhow::anyhow!("handler for `{channel_name}` failed: {fault}")
            })
        });

        let bound = self.guard("register_ipc", || self.host.ipc().handle(channel, guarded));
        if bound.is_some() {
            self.sinks
                .ipc_channels
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(channel.to_string());
        }
    }

    /// Contribute a network-request interception rule
    pub fn register_web_request(
        &self,
        filter: WebRequestFilter,
        listener: impl Fn(&RequestDetails) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) {
        self.guard("register_web_request", || {
            self.sinks
                .web_requests
                .add(&self.plugin_id, filter, Arc::new(listener));
            Ok(())
        });
    }

    /// Contribute a context-menu mutator
    pub fn contribute_context_menu(
        &self,
        contributor: impl Fn(&mut Vec<MenuItem>, &ContextMenuParams, &SurfaceRef) -> anyhow::Result<()>
        + Send
        + Sync
        + 'static,
    ) {
        self.guard("contribute_context_menu", || {
            self.sinks
                .context_menus
                .add(&self.plugin_id, Arc::new(contributor));
            Ok(())
        });
    }

    /// Register a dedicated renderer page
    ///
    /// Returns the registration, or `None` if it was rejected.
    pub fn register_renderer_page(&self, spec: RendererPageSpec) -> Option<RendererPage> {
        self.guard("register_renderer_page", || {
            let page = RendererPage::resolve(&spec, &self.plugin_id, &self.paths.plugin_dir)?;
            self.sinks.pages.push(page.clone());
            tracing::debug!(
                plugin_id = %self.plugin_id,
                page = %page.id,
                url = %page.file_url,
                "registered renderer page"
            );
            Ok(page)
        })
    }

    /// Run a registration, logging and swallowing any failure
    fn guard<T>(&self, call: &str, f: impl FnOnce() -> anyhow::Result<T>) -> Option<T> {
        match run_isolated(f) {
            Ok(value) => Some(value),
            Err(fault) => {
                tracing::warn!(
                    plugin_id = %self.plugin_id,
                    call,
                    error = %fault,
                    "plugin registration failed"
                );
                None
            }
        }
    }
}
