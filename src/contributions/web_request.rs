//! Network-request interception rules contributed by plugins

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::isolation::run_isolated;

/// Which requests a listener wants to see
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebRequestFilter {
    /// URL match patterns (e.g. `*://*.example.com/*`); empty matches everything
    #[serde(default)]
    pub urls: Vec<String>,
}

impl WebRequestFilter {
    /// Filter for the given URL patterns
    #[must_use]
    pub fn urls<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Details of an intercepted request, as reported by the network session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    pub id: u64,
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

/// Interception decision handed back to the network session
///
/// Listeners may return any JSON object (`{"cancel": true}`,
/// `{"redirectURL": "..."}`); it is forwarded untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestDecision(pub Map<String, Value>);

impl RequestDecision {
    /// Let the request through unchanged
    #[must_use]
    pub fn proceed() -> Self {
        let mut map = Map::new();
        map.insert("cancel".to_string(), Value::Bool(false));
        Self(map)
    }

    /// Whether the decision cancels the request
    #[must_use]
    pub fn is_cancel(&self) -> bool {
        self.0.get("cancel").and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Listener contributed by a plugin
pub type WebRequestListener = Arc<dyn Fn(&RequestDetails) -> anyhow::Result<Value> + Send + Sync>;

/// Hook attached to a live network session
pub type RequestHook = Arc<dyn Fn(&RequestDetails) -> RequestDecision + Send + Sync>;

/// Live network session the host applies collected rules to
pub trait NetworkSession {
    /// Install an interception hook for requests matching `filter`
    fn on_before_request(&self, filter: WebRequestFilter, hook: RequestHook);
}

#[derive(Clone)]
struct WebRequestEntry {
    plugin_id: String,
    filter: WebRequestFilter,
    listener: WebRequestListener,
}

/// Collected web-request contributions, in registration order
#[derive(Clone, Default)]
pub struct WebRequestRegistry {
    entries: Arc<RwLock<Vec<WebRequestEntry>>>,
}

impl WebRequestRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a contribution
    pub fn add(&self, plugin_id: &str, filter: WebRequestFilter, listener: WebRequestListener) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(WebRequestEntry {
                plugin_id: plugin_id.to_string(),
                filter,
                listener,
            });
    }

    /// Number of collected entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been contributed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Plugin ids of the entries, in registration order
    #[must_use]
    pub fn contributors(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.plugin_id.clone())
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Attach one interception hook per entry to `session`
    ///
    /// Returns the number of hooks attached.
    pub fn apply(&self, session: &dyn NetworkSession) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner).clone();
        for entry in &entries {
            let WebRequestEntry {
                plugin_id,
                filter,
                listener,
            } = entry.clone();
            let hook: RequestHook = Arc::new(move |details: &RequestDetails| {
                decide(&plugin_id, &listener, details)
            });
            session.on_before_request(filter, hook);
        }

        tracing::debug!(hooks = entries.len(), "applied web request contributions");
        entries.len()
    }
}

/// Run a listener and turn whatever it produced into a decision
fn decide(plugin_id: &str, listener: &WebRequestListener, details: &RequestDetails) -> RequestDecision {
    match run_isolated(|| listener(details)) {
        Ok(Value::Object(map)) => RequestDecision(map),
        Ok(_) => RequestDecision::proceed(),
        Err(fault) => {
            tracing::error!(
                plugin_id = %plugin_id,
                url = %details.url,
                error = %fault,
                "web request listener failed"
            );
            RequestDecision::proceed()
        }
    }
}

impl fmt::Debug for WebRequestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRequestRegistry")
            .field("contributors", &self.contributors())
            .finish()
    }
}
