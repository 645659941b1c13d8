//! Plugin host for desktop applications
//!
//! Discovers plugins on disk, loads and activates the enabled ones in
//! isolation, and aggregates what they contribute so the host application
//! can apply it to its windows, sessions, and menus.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Host application                    │
//! │  Windows  │  Sessions  │  Menus  │  IPC  │  Pages   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ apply / emit / resolve
//! ┌────────────────────▼────────────────────────────────┐
//! │                 PluginRegistry                       │
//! │  Discovery │ Loader │ Activation │ Contributions    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ PluginContext
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Plugins                          │
//! │      bundled (<app>/plugins) │ user (<data>/plugins) │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod contributions;
pub mod error;
pub mod events;
pub mod host;
pub mod isolation;
pub mod plugins;

pub use config::HostConfig;
pub use contributions::{
    ContextMenuParams, ContextMenuRegistry, MenuItem, NetworkSession, RequestDecision,
    RequestDetails, SurfaceRef, WebRequestFilter, WebRequestRegistry,
};
pub use error::{Error, Result};
pub use events::EventBus;
pub use host::{HostHandle, IpcRouter, LocalIpcRouter};
pub use isolation::{Fault, run_isolated};
pub use plugins::{
    FactoryLoader, LoadSummary, ModuleLoader, PluginContext, PluginDescriptor, PluginModule,
    PluginRecord, PluginRegistry, PluginStatus, RendererPage, RendererPageSpec,
};
