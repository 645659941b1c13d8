//! Persisted enable/disable state
//!
//! Toggling a plugin rewrites the `enabled` flag in its manifest. Unlike the
//! rest of the plugin system, failures here are returned to the caller.
//!
//! A toggle may touch several manifests (one id in both roots). Every
//! manifest is read and validated before any is written, and a failed write
//! restores the manifests already replaced.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::manifest::MANIFEST_FILE;
use crate::{Error, Result};

/// A manifest rewrite that has been validated but not yet written
#[derive(Debug)]
pub struct PendingWrite {
    dir: PathBuf,
    path: PathBuf,
    original: String,
    updated: String,
}

impl PendingWrite {
    /// Read `<plugin_dir>/plugin.json` and prepare it with `enabled` set
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be read or is not a JSON object
    pub async fn prepare(plugin_dir: &Path, enabled: bool) -> Result<Self> {
        let path = plugin_dir.join(MANIFEST_FILE);
        let original = tokio::fs::read_to_string(&path).await?;

        let mut manifest: Value = serde_json::from_str(&original)?;
        let Some(fields) = manifest.as_object_mut() else {
            return Err(Error::Manifest(format!(
                "{} is not a JSON object",
                path.display()
            )));
        };
        fields.insert("enabled".to_string(), Value::Bool(enabled));

        let mut updated = serde_json::to_string_pretty(&manifest)?;
        updated.push('\n');

        Ok(Self {
            dir: plugin_dir.to_path_buf(),
            path,
            original,
            updated,
        })
    }

    async fn commit(&self) -> Result<()> {
        replace_file_async(&self.dir, &self.path, self.updated.clone()).await
    }

    async fn revert(&self) -> Result<()> {
        replace_file_async(&self.dir, &self.path, self.original.clone()).await
    }
}

/// Set `enabled` in `<plugin_dir>/plugin.json`, preserving every other field
///
/// # Errors
///
/// Returns an error if the manifest cannot be read, is not a JSON object, or
/// cannot be written back
pub async fn write_enabled(plugin_dir: &Path, enabled: bool) -> Result<()> {
    write_enabled_all(&[plugin_dir.to_path_buf()], enabled).await
}

/// Set `enabled` in every listed plugin directory as one step
///
/// Nothing is written unless every manifest validates. If a write fails, the
/// manifests already replaced are restored before the error is returned.
///
/// # Errors
///
/// Returns the first read, parse, or write error
pub async fn write_enabled_all(plugin_dirs: &[PathBuf], enabled: bool) -> Result<()> {
    let mut pending = Vec::with_capacity(plugin_dirs.len());
    for dir in plugin_dirs {
        pending.push(PendingWrite::prepare(dir, enabled).await?);
    }

    for (index, write) in pending.iter().enumerate() {
        if let Err(e) = write.commit().await {
            for done in pending[..index].iter().rev() {
                if let Err(revert_err) = done.revert().await {
                    tracing::error!(
                        path = %done.path.display(),
                        error = %revert_err,
                        "failed to restore plugin manifest"
                    );
                }
            }
            return Err(e);
        }
    }

    for write in &pending {
        tracing::info!(
            path = %write.dir.display(),
            enabled,
            "updated plugin enabled state"
        );
    }
    Ok(())
}

/// Replace `path` atomically: temp file in `dir`, then rename over it
async fn replace_file_async(dir: &Path, path: &Path, content: String) -> Result<()> {
    let dir = dir.to_path_buf();
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || replace_file(&dir, &path, content.as_bytes()))
        .await
        .map_err(|e| Error::Manifest(format!("manifest write task failed: {e}")))?
}

fn replace_file(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
