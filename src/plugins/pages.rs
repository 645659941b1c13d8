//! Dedicated renderer pages registered by plugins
//!
//! A page is addressed as `<scheme>://<page id>` and resolves to the
//! plugin-provided HTML file's `file://` URL.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use url::Url;

/// Default scheme for plugin pages
pub const DEFAULT_PAGE_SCHEME: &str = "plugin-page";

/// Page registration request from a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererPageSpec {
    /// Page id, unique per host by convention
    pub id: String,
    /// HTML file; relative paths resolve against the plugin directory
    pub html: PathBuf,
}

impl RendererPageSpec {
    #[must_use]
    pub fn new(id: impl Into<String>, html: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            html: html.into(),
        }
    }
}

/// A registered renderer page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererPage {
    pub id: String,
    pub file: PathBuf,
    pub file_url: String,
    pub plugin_id: String,
}

impl RendererPage {
    /// Resolve a page spec against its plugin directory
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty or the path cannot be expressed as
    /// a `file://` URL
    pub fn resolve(
        spec: &RendererPageSpec,
        plugin_id: &str,
        plugin_dir: &Path,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(!spec.id.trim().is_empty(), "page id must not be empty");

        let file = if spec.html.is_absolute() {
            spec.html.clone()
        } else {
            plugin_dir.join(&spec.html)
        };
        let file_url = Url::from_file_path(&file)
            .map_err(|()| anyhow::anyhow!("cannot build file URL for {}", file.display()))?;

        Ok(Self {
            id: spec.id.clone(),
            file,
            file_url: file_url.into(),
            plugin_id: plugin_id.to_string(),
        })
    }
}

/// Page registrations for the current load pass
#[derive(Debug, Clone, Default)]
pub struct PageRegistry {
    pages: Arc<RwLock<Vec<RendererPage>>>,
}

impl PageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, page: RendererPage) {
        self.pages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(page);
    }

    pub(crate) fn clear(&self) {
        self.pages.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Copy of every registration, in registration order
    #[must_use]
    pub fn all(&self) -> Vec<RendererPage> {
        self.pages.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// First registration with `id`
    #[must_use]
    pub fn get(&self, id: &str) -> Option<RendererPage> {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }
}

/// Build the special URL for a page id
#[must_use]
pub fn page_url(scheme: &str, id: &str) -> String {
    format!("{scheme}://{id}")
}

/// Extract the page id from `<scheme>://<id>[/...][?...]`
#[must_use]
pub fn page_id_from_url<'a>(scheme: &str, url: &'a str) -> Option<&'a str> {
    let rest = url.strip_prefix(scheme)?.strip_prefix("://")?;
    let id = rest.split(['/', '?', '#']).next().unwrap_or_default();
    (!id.is_empty()).then_some(id)
}
