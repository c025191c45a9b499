//! Dot-keyed configuration backed by JSON files.
//!
//! Each `<name>.json` file in the config directory contributes its content
//! under the `<name>.` key prefix. An optional overlay layer (installed by
//! a transformer) is consulted first on reads, which is how test doubles
//! take precedence over loaded values.

use crate::error::{CoreError, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Shared overlay layer type. Writes to the overlay are visible to every
/// clone of the map that carries it.
pub type ConfigOverlay = Arc<RwLock<HashMap<String, Value>>>;

/// The configuration map capability value.
#[derive(Clone, Debug)]
pub struct ConfigMap {
    entries: Arc<RwLock<HashMap<String, Value>>>,
    overlay: Option<ConfigOverlay>,
}

impl ConfigMap {
    /// Create an empty configuration map.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            overlay: None,
        }
    }

    /// Load every `*.json` file from a directory.
    ///
    /// Files are read in name order; a missing directory yields an empty
    /// map rather than an error.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let map = Self::new();
        if !dir.is_dir() {
            return Ok(map);
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| CoreError::ConfigLoad {
                path: dir.to_path_buf(),
                cause: e.to_string(),
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            let raw = std::fs::read_to_string(&path).map_err(|e| CoreError::ConfigLoad {
                path: path.clone(),
                cause: e.to_string(),
            })?;
            let value: Value = serde_json::from_str(&raw).map_err(|e| CoreError::ConfigParse {
                path: path.clone(),
                cause: e.to_string(),
            })?;
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            map.entries.write().insert(stem, value);
        }
        Ok(map)
    }

    /// Set a value under an exact dot key.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries.write().insert(key.into(), value);
    }

    /// Attach an overlay layer, returning a map that shares the loaded
    /// entries. Overlay reads take precedence over loaded values.
    #[must_use]
    pub fn with_overlay(&self, overlay: ConfigOverlay) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            overlay: Some(overlay),
        }
    }

    /// Get a value by dot key.
    ///
    /// The overlay is consulted first with the exact key. Loaded entries
    /// match either exactly or by walking the remaining path into a JSON
    /// object (`"queue.queues"` finds `queues` inside the `queue` entry).
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(overlay) = &self.overlay {
            if let Some(value) = overlay.read().get(key) {
                return Some(value.clone());
            }
        }

        let entries = self.entries.read();
        if let Some(value) = entries.get(key) {
            return Some(value.clone());
        }
        for (i, ch) in key.char_indices() {
            if ch != '.' {
                continue;
            }
            if let Some(value) = entries.get(&key[..i]) {
                if let Some(found) = value_at(value, &key[i + 1..]) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Check whether a dot key resolves in either layer.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Get a string value by dot key.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|v| v.as_str().map(|s| s.to_string()))
    }

    /// Get an array of strings by dot key. Non-string elements are skipped.
    pub fn str_array(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).and_then(|v| {
            v.as_array().map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(|s| s.to_string()))
                    .collect()
            })
        })
    }
}

impl Default for ConfigMap {
    fn default() -> Self {
        Self::new()
    }
}

fn value_at(value: &Value, path: &str) -> Option<Value> {
    let mut current = value;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current.clone())
}
