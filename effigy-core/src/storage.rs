//! Named file storages backed by the local filesystem.
//!
//! Storage names come from the `storage.storages` config key. Paths are
//! storage-relative; `..` segments are rejected so a storage can never
//! escape its root.

use crate::config::ConfigMap;
use crate::error::{CoreError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Storage names used when `storage.storages` is not configured.
pub const DEFAULT_STORAGES: &[&str] = &["local", "uploads"];

/// File visibility flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// World-readable.
    Public,
    /// Owner-only.
    Private,
}

impl Visibility {
    /// Stable string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named file storage.
pub trait Storage: Send + Sync {
    /// The storage name.
    fn name(&self) -> &str;

    /// Write a file, creating parent folders as needed.
    fn write(&self, path: &str, content: &[u8]) -> Result<()>;

    /// Read a file.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Check whether a file exists.
    fn exists(&self, path: &str) -> bool;

    /// Delete a file.
    fn delete(&self, path: &str) -> Result<()>;

    /// Copy a file.
    fn copy(&self, from: &str, to: &str) -> Result<()>;

    /// Move a file.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Create a folder and its parents.
    fn create_folder(&self, path: &str) -> Result<()>;

    /// Delete a folder recursively.
    fn delete_folder(&self, path: &str) -> Result<()>;

    /// Check whether a folder exists.
    fn folder_exists(&self, path: &str) -> bool;

    /// Change a file's visibility.
    fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()>;

    /// A file's visibility, if one was ever set.
    fn visibility(&self, path: &str) -> Option<Visibility>;
}

impl std::fmt::Debug for dyn Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Filesystem storage rooted at a directory.
pub struct LocalStorage {
    name: String,
    root: PathBuf,
    visibilities: RwLock<HashMap<String, Visibility>>,
}

impl LocalStorage {
    /// Create a storage rooted at a directory. The directory is created
    /// lazily on first write.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            visibilities: RwLock::new(HashMap::new()),
        }
    }

    /// The storage root on disk.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let trimmed = path.trim_matches('/');
        if trimmed.split('/').any(|part| part == "..") {
            return Err(self.io(path, "path escapes storage root"));
        }
        Ok(self.root.join(trimmed))
    }

    fn io(&self, path: &str, cause: impl ToString) -> CoreError {
        CoreError::StorageIo {
            storage: self.name.clone(),
            path: path.to_string(),
            cause: cause.to_string(),
        }
    }

    fn ensure_parent(&self, full: &Path, path: &str) -> Result<()> {
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io(path, e))?;
        }
        Ok(())
    }
}

impl Storage for LocalStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        self.ensure_parent(&full, path)?;
        std::fs::write(&full, content).map_err(|e| self.io(path, e))?;
        tracing::debug!(storage = %self.name, path, bytes = content.len(), "file written");
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        std::fs::read(&full).map_err(|e| self.io(path, e))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        std::fs::remove_file(&full).map_err(|e| self.io(path, e))
    }

    fn copy(&self, from: &str, to: &str) -> Result<()> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        self.ensure_parent(&dst, to)?;
        std::fs::copy(&src, &dst).map_err(|e| self.io(from, e))?;
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        self.ensure_parent(&dst, to)?;
        std::fs::rename(&src, &dst).map_err(|e| self.io(from, e))?;
        let mut vis = self.visibilities.write();
        if let Some(v) = vis.remove(from.trim_matches('/')) {
            vis.insert(to.trim_matches('/').to_string(), v);
        }
        Ok(())
    }

    fn create_folder(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        std::fs::create_dir_all(&full).map_err(|e| self.io(path, e))
    }

    fn delete_folder(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        std::fs::remove_dir_all(&full).map_err(|e| self.io(path, e))
    }

    fn folder_exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_dir()).unwrap_or(false)
    }

    fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        if !self.exists(path) {
            return Err(self.io(path, "file not found"));
        }
        self.visibilities
            .write()
            .insert(path.trim_matches('/').to_string(), visibility);
        Ok(())
    }

    fn visibility(&self, path: &str) -> Option<Visibility> {
        self.visibilities.read().get(path.trim_matches('/')).copied()
    }
}

/// The named-storage collection capability value.
#[derive(Clone)]
pub struct Storages {
    inner: Arc<RwLock<Vec<Arc<dyn Storage>>>>,
}

impl Storages {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create local storages from the `storage.storages` config key,
    /// falling back to [`DEFAULT_STORAGES`]. Each storage is rooted at
    /// `<files_root>/<name>`.
    pub fn from_config(config: &ConfigMap, files_root: &Path) -> Self {
        let names = config
            .str_array("storage.storages")
            .unwrap_or_else(|| DEFAULT_STORAGES.iter().map(|s| s.to_string()).collect());
        let storages = Self::new();
        for name in names {
            let root = files_root.join(&name);
            storages.add(Arc::new(LocalStorage::new(name, root)));
        }
        storages
    }

    /// Add a storage, replacing any existing storage with the same name.
    pub fn add(&self, storage: Arc<dyn Storage>) {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.iter_mut().find(|s| s.name() == storage.name()) {
            *existing = storage;
        } else {
            inner.push(storage);
        }
    }

    /// Look up a storage by name.
    pub fn storage(&self, name: &str) -> Result<Arc<dyn Storage>> {
        self.inner
            .read()
            .iter()
            .find(|s| s.name() == name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownStorage {
                name: name.to_string(),
            })
    }

    /// Registered storage names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().iter().map(|s| s.name().to_string()).collect()
    }
}

impl Default for Storages {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new("local", dir.path().join("local"));
        (dir, storage)
    }

    #[test]
    fn write_read_roundtrip_creates_parents() {
        let (_dir, storage) = storage();
        storage.write("docs/readme.txt", b"hello").unwrap();
        assert!(storage.exists("docs/readme.txt"));
        assert_eq!(storage.read("docs/readme.txt").unwrap(), b"hello");
        assert!(storage.folder_exists("docs"));
    }

    #[test]
    fn copy_and_rename() {
        let (_dir, storage) = storage();
        storage.write("a.txt", b"data").unwrap();

        storage.copy("a.txt", "b.txt").unwrap();
        assert!(storage.exists("a.txt"));
        assert!(storage.exists("b.txt"));

        storage.rename("b.txt", "moved/c.txt").unwrap();
        assert!(!storage.exists("b.txt"));
        assert!(storage.exists("moved/c.txt"));
    }

    #[test]
    fn delete_file_and_folder() {
        let (_dir, storage) = storage();
        storage.write("tmp/one.txt", b"1").unwrap();

        storage.delete("tmp/one.txt").unwrap();
        assert!(!storage.exists("tmp/one.txt"));

        storage.create_folder("tmp/deep").unwrap();
        storage.delete_folder("tmp").unwrap();
        assert!(!storage.folder_exists("tmp"));
    }

    #[test]
    fn visibility_tracking_moves_with_rename() {
        let (_dir, storage) = storage();
        storage.write("a.txt", b"x").unwrap();
        storage.set_visibility("a.txt", Visibility::Private).unwrap();
        assert_eq!(storage.visibility("a.txt"), Some(Visibility::Private));

        storage.rename("a.txt", "b.txt").unwrap();
        assert_eq!(storage.visibility("b.txt"), Some(Visibility::Private));
        assert_eq!(storage.visibility("a.txt"), None);
    }

    #[test]
    fn path_escape_is_rejected() {
        let (_dir, storage) = storage();
        let err = storage.write("../outside.txt", b"x").unwrap_err();
        assert_eq!(err.code(), "E122");
    }

    #[test]
    fn collection_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigMap::new();
        let storages = Storages::from_config(&config, dir.path());
        assert_eq!(storages.names(), vec!["local", "uploads"]);
        assert_eq!(storages.storage("missing").unwrap_err().code(), "E121");
    }
}
