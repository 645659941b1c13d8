//! Named-event pub/sub shared by the host and its plugins
//!
//! The bus is name-agnostic: any string is a valid event, and subscribing to
//! an unseen name creates its subscriber list. Delivery is best-effort, so a
//! failing subscriber is logged and never stops the ones after it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use crate::isolation::run_isolated;

/// Event names the host publishes
pub mod names {
    /// Application finished starting
    pub const APP_READY: &str = "app-ready";
    /// A top-level window was created
    pub const WINDOW_CREATED: &str = "window-created";
    /// A page/content surface was created
    pub const WEB_CONTENTS_CREATED: &str = "web-contents-created";
    /// A network session was configured
    pub const SESSION_CREATED: &str = "session-created";
    /// A full load pass finished activating plugins
    pub const PLUGINS_LOADED: &str = "plugins-loaded";
}

/// Subscriber callback
pub type Listener = Arc<dyn Fn(&[Value]) -> anyhow::Result<()> + Send + Sync>;

struct Subscription {
    owner: Option<String>,
    listener: Listener,
}

/// Process-wide named-event bus
///
/// Cloning yields another handle to the same subscriber table.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<String, Vec<Arc<Subscription>>>>>,
}

impl EventBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a host-side listener to `event`
    pub fn on(
        &self,
        event: &str,
        listener: impl Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    ) {
        self.subscribe(event, None, Arc::new(listener));
    }

    /// Subscribe on behalf of a plugin so failures are attributed to it
    pub(crate) fn subscribe(&self, event: &str, owner: Option<&str>, listener: Listener) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(Subscription {
                owner: owner.map(String::from),
                listener,
            }));
    }

    /// Invoke every subscriber of `event` in registration order
    ///
    /// Returns the number of subscribers that completed without error.
    pub fn emit(&self, event: &str, args: &[Value]) -> usize {
        // Snapshot so subscribers may subscribe or emit without deadlocking
        let subscribers: Vec<Arc<Subscription>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for sub in &subscribers {
            match run_isolated(|| (sub.listener)(args)) {
                Ok(()) => delivered += 1,
                Err(fault) => tracing::error!(
                    event = %event,
                    plugin_id = sub.owner.as_deref().unwrap_or("host"),
                    error = %fault,
                    "event listener failed"
                ),
            }
        }

        tracing::trace!(event = %event, delivered, total = subscribers.len(), "emitted event");
        delivered
    }

    /// Number of subscribers for `event`
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Event names with at least one subscriber, sorted
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, subs)| !subs.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Drop all plugin-owned subscriptions, keeping host listeners
    pub(crate) fn clear_plugin_listeners(&self) {
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        for subs in subscribers.values_mut() {
            subs.retain(|sub| sub.owner.is_none());
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.event_names())
            .finish()
    }
}
