//! Boundary to the host application
//!
//! The plugin core does not implement windows, input devices, or IPC
//! transport. It forwards references to whatever the host hands it: an
//! [`IpcRouter`] for request/response channels and a bag of opaque, named
//! primitives plugins can downcast to the concrete types they expect.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

/// Request/response handler registered on an IPC channel
pub type IpcHandler = Arc<dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// Host-side request/response registration
pub trait IpcRouter: Send + Sync {
    /// Route requests on `channel` to `handler`
    ///
    /// # Errors
    ///
    /// Returns an error if the host refuses the registration (for example a
    /// channel that is already taken)
    fn handle(&self, channel: &str, handler: IpcHandler) -> anyhow::Result<()>;

    /// Unregister the handler on `channel`, returning whether one was bound
    fn remove(&self, channel: &str) -> bool;
}

/// In-process IPC router
///
/// Hosts without a separate renderer process (and the test suite) dispatch
/// requests through this directly.
#[derive(Default)]
pub struct LocalIpcRouter {
    handlers: RwLock<HashMap<String, IpcHandler>>,
}

impl LocalIpcRouter {
    /// Create an empty router
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch a request to the handler on `channel`
    ///
    /// # Errors
    ///
    /// Returns an error if no handler is registered or the handler fails
    pub fn invoke(&self, channel: &str, args: &[Value]) -> anyhow::Result<Value> {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no handler registered for channel `{channel}`"))?;
        handler(args)
    }

    /// Registered channel names, sorted
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }

    /// Drop every registered handler
    pub fn clear(&self) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl IpcRouter for LocalIpcRouter {
    fn handle(&self, channel: &str, handler: IpcHandler) -> anyhow::Result<()> {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.contains_key(channel) {
            anyhow::bail!("channel `{channel}` already has a handler");
        }
        handlers.insert(channel.to_string(), handler);
        Ok(())
    }

    fn remove(&self, channel: &str) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(channel)
            .is_some()
    }
}

/// References to host primitives forwarded into every plugin context
#[derive(Clone)]
pub struct HostHandle {
    ipc: Arc<dyn IpcRouter>,
    primitives: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl HostHandle {
    /// Create a handle around the host's IPC router
    #[must_use]
    pub fn new(ipc: Arc<dyn IpcRouter>) -> Self {
        Self {
            ipc,
            primitives: HashMap::new(),
        }
    }

    /// Attach a named host primitive (window manager, input service, ...)
    #[must_use]
    pub fn with_primitive<T: Any + Send + Sync>(mut self, name: &str, value: Arc<T>) -> Self {
        self.primitives.insert(name.to_string(), value);
        self
    }

    /// Look up a host primitive by name and concrete type
    #[must_use]
    pub fn primitive<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.primitives
            .get(name)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Names of the attached primitives, sorted
    #[must_use]
    pub fn primitive_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.primitives.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The host IPC router
    #[must_use]
    pub fn ipc(&self) -> &Arc<dyn IpcRouter> {
        &self.ipc
    }
}

impl Default for HostHandle {
    fn default() -> Self {
        Self::new(Arc::new(LocalIpcRouter::new()))
    }
}

impl fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostHandle")
            .field("primitives", &self.primitive_names())
            .finish_non_exhaustive()
    }
}
