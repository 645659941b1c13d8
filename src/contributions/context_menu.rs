//! Context-menu contributors
//!
//! Plugins hand over functions that mutate the menu template the host is
//! about to show. Contributors run in registration order against the same
//! template; one that fails is skipped without undoing what earlier
//! contributors did.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::isolation::run_isolated;

/// Kind of menu entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuItemKind {
    #[default]
    Normal,
    Separator,
    Submenu,
    Checkbox,
    Radio,
}

/// One entry of a menu template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: MenuItemKind,
    /// Built-in role the host maps to a native action (`copy`, `paste`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// IPC channel the host sends to when the item is clicked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub submenu: Vec<MenuItem>,
}

const fn default_true() -> bool {
    true
}

impl MenuItem {
    /// Plain clickable item
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: None,
            label: Some(label.into()),
            kind: MenuItemKind::Normal,
            role: None,
            command: None,
            enabled: true,
            submenu: Vec::new(),
        }
    }

    /// Separator line
    #[must_use]
    pub fn separator() -> Self {
        Self {
            label: None,
            kind: MenuItemKind::Separator,
            ..Self::new("")
        }
    }

    /// Set the IPC command sent on click
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Set the stable item id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Click parameters that triggered the menu
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMenuParams {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub page_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_url: Option<String>,
    #[serde(default)]
    pub selection_text: String,
    #[serde(default)]
    pub is_editable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// Rendering surface the menu was opened on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceRef {
    /// Host-assigned surface id
    pub id: u64,
    /// URL currently loaded in the surface
    #[serde(default)]
    pub url: String,
}

/// Menu contributor supplied by a plugin
pub type MenuContributor =
    Arc<dyn Fn(&mut Vec<MenuItem>, &ContextMenuParams, &SurfaceRef) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone)]
struct ContextMenuEntry {
    plugin_id: String,
    contributor: MenuContributor,
}

/// Collected context-menu contributors, in registration order
#[derive(Clone, Default)]
pub struct ContextMenuRegistry {
    entries: Arc<RwLock<Vec<ContextMenuEntry>>>,
}

impl ContextMenuRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a contributor
    pub fn add(&self, plugin_id: &str, contributor: MenuContributor) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ContextMenuEntry {
                plugin_id: plugin_id.to_string(),
                contributor,
            });
    }

    /// Number of collected contributors
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been contributed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Plugin ids of the contributors, in registration order
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

    /// Let every contributor mutate `template`
    ///
    /// Returns the number of contributors that completed without error.
    pub fn apply(
        &self,
        template: &mut Vec<MenuItem>,
        params: &ContextMenuParams,
        surface: &SurfaceRef,
    ) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner).clone();

        let mut applied = 0;
        for entry in &entries {
            match run_isolated(|| (entry.contributor)(template, params, surface)) {
                Ok(()) => applied += 1,
                Err(fault) => tracing::error!(
                    plugin_id = %entry.plugin_id,
                    surface = surface.id,
                    error = %fault,
                    "context menu contributor failed"
                ),
            }
        }
        applied
    }
}

impl fmt::Debug for ContextMenuRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextMenuRegistry")
            .field("contributors", &self.contributors())
            .finish()
    }
}
