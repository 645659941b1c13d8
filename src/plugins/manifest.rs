//! Plugin manifest format (`plugin.json`)
//!
//! Manifests are loose on disk: most fields are optional and `categories` /
//! `authors` accept several shapes. [`read_manifest`] coerces everything into
//! the canonical [`PluginManifest`] and never fails outward.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// File name of the manifest inside each plugin directory
pub const MANIFEST_FILE: &str = "plugin.json";

/// Version assumed when a manifest omits one
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Normalized plugin manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// Plugin identifier (defaults to the directory name)
    pub id: String,
    /// Human-readable name (defaults to the id)
    pub name: String,
    /// Version string
    pub version: String,
    /// Short description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Category tags, deduplicated in declaration order
    pub categories: Vec<String>,
    /// Author names in declaration order
    pub authors: Vec<String>,
    /// Whether the plugin should be loaded
    pub enabled: bool,
    /// Entry module, relative to the plugin directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    /// Script injected into rendering surfaces, relative to the plugin directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer_preload: Option<String>,
}

/// On-disk shape before normalization
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    categories: Option<Value>,
    #[serde(default)]
    authors: Option<Value>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    main: Option<String>,
    #[serde(default)]
    renderer_preload: Option<String>,
}

impl PluginManifest {
    /// Parse and normalize manifest JSON
    ///
    /// `fallback_id` is used when the manifest has no (or an empty) `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object of the expected shape
    pub fn parse(content: &str, fallback_id: &str) -> serde_json::Result<Self> {
        // Objects only; a derived struct would also accept a positional array
        let fields: Map<String, Value> = serde_json::from_str(content)?;
        let raw: RawManifest = serde_json::from_value(Value::Object(fields))?;
        Ok(Self::from_raw(raw, fallback_id))
    }

    fn from_raw(raw: RawManifest, fallback_id: &str) -> Self {
        let id = non_empty(raw.id).unwrap_or_else(|| fallback_id.to_string());
        Self {
            name: non_empty(raw.name).unwrap_or_else(|| id.clone()),
            version: non_empty(raw.version).unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            description: raw.description,
            categories: normalize_categories(raw.categories.as_ref()),
            authors: normalize_authors(raw.authors.as_ref()),
            enabled: raw.enabled.unwrap_or(true),
            main: non_empty(raw.main),
            renderer_preload: non_empty(raw.renderer_preload),
            id,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Read and normalize `<dir>/plugin.json`
///
/// Returns `None` when the file is missing or malformed. Manifest problems
/// never abort a discovery pass, so they are only logged at debug level.
#[must_use]
pub fn read_manifest(dir: &Path) -> Option<PluginManifest> {
    let path = dir.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&path).ok()?;
    let fallback_id = dir.file_name()?.to_string_lossy();

    match PluginManifest::parse(&content, &fallback_id) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            tracing::debug!(
                path = %path.display(),
                error = %e,
                "skipping malformed plugin manifest"
            );
            None
        }
    }
}

/// Coerce `categories` into an ordered set of strings
///
/// A string becomes a singleton, an array keeps its string elements, and
/// anything else (including absence) yields an empty list.
#[must_use]
pub fn normalize_categories(value: Option<&Value>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        if !out.iter().any(|c| c == s) {
            out.push(s.to_string());
        }
    };

    match value {
        Some(Value::String(s)) => push(s.as_str()),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).for_each(push),
        _ => {}
    }
    out
}

/// Coerce `authors` into an ordered list of names
///
/// Accepts a string, or an array whose elements are strings or objects with
/// a string `name`. Other elements are dropped.
#[must_use]
pub fn normalize_authors(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => obj.get("name").and_then(Value::as_str).map(String::from),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
