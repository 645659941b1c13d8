//! Contributions plugins register during activation for the host to apply later
//!
//! Both aggregators are append-only from the plugin side and are applied in
//! bulk by the host: web-request rules against a live network session,
//! context-menu contributors against a menu template about to be shown.

pub mod context_menu;
pub mod web_request;

pub use context_menu::{
    ContextMenuParams, ContextMenuRegistry, MenuContributor, MenuItem, MenuItemKind, SurfaceRef,
};
pub use web_request::{
    NetworkSession, RequestDecision, RequestDetails, RequestHook, WebRequestFilter,
    WebRequestListener, WebRequestRegistry,
};
