//! File storage faker.
//!
//! Storages keep performing real filesystem work so reads, existence
//! checks, and IO faults behave as in production, but every storage is
//! re-rooted under a disposable sandbox inside the application's storage
//! directory. The sandbox is wiped when the capability resolves, so each
//! context starts from an empty tree.

use crate::must;
use crate::recorder::{recorder_in, Recorder, RecorderMap};
use crate::registry::{Faker, FakerKind};
use effigy_core::storage::{LocalStorage, Storage, Storages, Visibility};
use effigy_core::{App, Result, FAKE_PRIORITY};
use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;

/// Sandbox location relative to the application's storage directory.
const SANDBOX_SUBDIR: &str = "testing/file-storage";

/// One recorded storage operation.
#[derive(Debug, Clone, PartialEq)]
pub struct FileOp {
    /// The operated-on path, as the caller gave it.
    pub path: String,
    /// Destination path for copy and move operations.
    pub to: Option<String>,
    /// The visibility that was set, for visibility operations.
    pub visibility: Option<Visibility>,
}

impl FileOp {
    fn at(path: &str) -> Self {
        Self {
            path: path.to_string(),
            to: None,
            visibility: None,
        }
    }

    fn between(from: &str, to: &str) -> Self {
        Self {
            path: from.to_string(),
            to: Some(to.to_string()),
            visibility: None,
        }
    }
}

/// A storage that does the real work in a sandbox and records each
/// mutating call that succeeded.
pub struct TestStorage {
    inner: LocalStorage,
    recorder: Recorder<FileOp>,
}

impl TestStorage {
    fn new(inner: LocalStorage, recorder: Recorder<FileOp>) -> Self {
        Self { inner, recorder }
    }
}

impl Storage for TestStorage {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        self.inner.write(path, content)?;
        self.recorder.record("created", FileOp::at(path));
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.read(path)
    }

    fn exists(&self, path: &str) -> bool {
        self.inner.exists(path)
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path)?;
        self.recorder.record("deleted", FileOp::at(path));
        Ok(())
    }

    fn copy(&self, from: &str, to: &str) -> Result<()> {
        self.inner.copy(from, to)?;
        self.recorder.record("copied", FileOp::between(from, to));
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.inner.rename(from, to)?;
        self.recorder.record("moved", FileOp::between(from, to));
        Ok(())
    }

    fn create_folder(&self, path: &str) -> Result<()> {
        self.inner.create_folder(path)?;
        self.recorder.record("folder_created", FileOp::at(path));
        Ok(())
    }

    fn delete_folder(&self, path: &str) -> Result<()> {
        self.inner.delete_folder(path)?;
        self.recorder.record("folder_deleted", FileOp::at(path));
        Ok(())
    }

    fn folder_exists(&self, path: &str) -> bool {
        self.inner.folder_exists(path)
    }

    fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        self.inner.set_visibility(path, visibility)?;
        self.recorder.record(
            "visibility",
            FileOp {
                path: path.to_string(),
                to: None,
                visibility: Some(visibility),
            },
        );
        Ok(())
    }

    fn visibility(&self, path: &str) -> Option<Visibility> {
        self.inner.visibility(path)
    }
}

/// Re-roots every configured storage under a wiped sandbox and records
/// what happens to it.
#[derive(Clone)]
pub struct FakeFileStorage {
    inner: Arc<FakeFileStorageInner>,
}

struct FakeFileStorageInner {
    app: Arc<App>,
    recorders: RecorderMap<FileOp>,
    delegate: RwLock<Option<FakeFileStorage>>,
}

impl FakeFileStorage {
    pub(crate) fn install(app: &Arc<App>) -> Self {
        let recorders: RecorderMap<FileOp> = Arc::default();
        let hook_recorders = recorders.clone();
        app.hooks().storages.on_with_priority(
            move |storages, app| {
                let storage_dir = match app.dir("storage") {
                    Ok(dir) => dir,
                    Err(error) => {
                        tracing::warn!(%error, "storage dir unavailable, storages left real");
                        return storages;
                    }
                };
                let sandbox = storage_dir.join(SANDBOX_SUBDIR);
                if sandbox.exists() {
                    if let Err(error) = std::fs::remove_dir_all(&sandbox) {
                        tracing::warn!(%error, sandbox = %sandbox.display(), "sandbox not wiped");
                    }
                }

                let faked = Storages::new();
                for name in storages.names() {
                    let recorder = recorder_in(&hook_recorders, &name);
                    let local = LocalStorage::new(&name, sandbox.join(&name));
                    faked.add(Arc::new(TestStorage::new(local, recorder)));
                }
                faked
            },
            FAKE_PRIORITY,
        );
        Self {
            inner: Arc::new(FakeFileStorageInner {
                app: app.clone(),
                recorders,
                delegate: RwLock::new(None),
            }),
        }
    }

    fn newest(&self) -> FakeFileStorage {
        let mut current = self.clone();
        loop {
            let next = current.inner.delegate.read().clone();
            match next {
                Some(delegate) => current = delegate,
                None => return current,
            }
        }
    }

    /// The resolved storage collection.
    pub fn storages(&self) -> Storages {
        must(self.newest().inner.app.storages())
    }

    /// Assertion surface for one named storage.
    pub fn storage(&self, name: &str) -> StorageDouble {
        let newest = self.newest();
        StorageDouble {
            name: name.to_string(),
            app: newest.inner.app.clone(),
            recorder: recorder_in(&newest.inner.recorders, name),
        }
    }
}

impl Faker for FakeFileStorage {
    fn kind(&self) -> FakerKind {
        FakerKind::FileStorage
    }

    fn fork(&self, app: &Arc<App>) -> Arc<dyn Faker> {
        let forked = FakeFileStorage::install(app);
        *self.newest().inner.delegate.write() = Some(forked.clone());
        Arc::new(forked)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Asserts over one storage's recorded operations and current files.
pub struct StorageDouble {
    name: String,
    app: Arc<App>,
    recorder: Recorder<FileOp>,
}

impl StorageDouble {
    /// The storage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The resolved storage behind this double.
    pub fn storage(&self) -> Arc<dyn Storage> {
        must(must(self.app.storages()).storage(&self.name))
    }

    /// Recorded operations of one kind, in operation order.
    pub fn operations(&self, kind: &str) -> Vec<FileOp> {
        self.recorder.all(kind)
    }

    /// Assert a file currently exists.
    #[track_caller]
    pub fn assert_exists(&self, path: &str) -> &Self {
        if !self.storage().exists(path) {
            panic!("The expected [{path}] file does not exist.");
        }
        self
    }

    /// Assert a file currently does not exist.
    #[track_caller]
    pub fn assert_not_exist(&self, path: &str) -> &Self {
        if self.storage().exists(path) {
            panic!("The unexpected [{path}] file does exist.");
        }
        self
    }

    /// Assert a file was written at some point.
    #[track_caller]
    pub fn assert_created(&self, path: &str) -> &Self {
        if !self.recorder.has("created", |op| op.path == path) {
            panic!("The expected [{path}] file was not created.");
        }
        self
    }

    /// Assert a file was never written.
    #[track_caller]
    pub fn assert_not_created(&self, path: &str) -> &Self {
        if self.recorder.has("created", |op| op.path == path) {
            panic!("The expected [{path}] file was created.");
        }
        self
    }

    /// Assert a file was copied to a destination.
    #[track_caller]
    pub fn assert_copied(&self, from: &str, to: &str) -> &Self {
        let copied = self
            .recorder
            .has("copied", |op| op.path == from && op.to.as_deref() == Some(to));
        if !copied {
            panic!("The expected [{from}] file was not copied.");
        }
        self
    }

    /// Assert a file was never copied to a destination.
    #[track_caller]
    pub fn assert_not_copied(&self, from: &str, to: &str) -> &Self {
        let copied = self
            .recorder
            .has("copied", |op| op.path == from && op.to.as_deref() == Some(to));
        if copied {
            panic!("The expected [{from}] file was copied.");
        }
        self
    }

    /// Assert a file was moved to a destination.
    #[track_caller]
    pub fn assert_moved(&self, from: &str, to: &str) -> &Self {
        let moved = self
            .recorder
            .has("moved", |op| op.path == from && op.to.as_deref() == Some(to));
        if !moved {
            panic!("The expected [{from}] file was not moved.");
        }
        self
    }

    /// Assert a file was never moved to a destination.
    #[track_caller]
    pub fn assert_not_moved(&self, from: &str, to: &str) -> &Self {
        let moved = self
            .recorder
            .has("moved", |op| op.path == from && op.to.as_deref() == Some(to));
        if moved {
            panic!("The expected [{from}] file was moved.");
        }
        self
    }

    /// Assert a file was deleted.
    #[track_caller]
    pub fn assert_deleted(&self, path: &str) -> &Self {
        if !self.recorder.has("deleted", |op| op.path == path) {
            panic!("The expected [{path}] file was not deleted.");
        }
        self
    }

    /// Assert a file was never deleted.
    #[track_caller]
    pub fn assert_not_deleted(&self, path: &str) -> &Self {
        if self.recorder.has("deleted", |op| op.path == path) {
            panic!("The expected [{path}] file was deleted.");
        }
        self
    }

    /// Assert a folder currently exists.
    #[track_caller]
    pub fn assert_folder_exists(&self, path: &str) -> &Self {
        if !self.storage().folder_exists(path) {
            panic!("The expected [{path}] folder does not exist.");
        }
        self
    }

    /// Assert a folder currently does not exist.
    #[track_caller]
    pub fn assert_folder_not_exist(&self, path: &str) -> &Self {
        if self.storage().folder_exists(path) {
            panic!("The unexpected [{path}] folder does exist.");
        }
        self
    }

    /// Assert a folder was created.
    #[track_caller]
    pub fn assert_folder_created(&self, path: &str) -> &Self {
        if !self.recorder.has("folder_created", |op| op.path == path) {
            panic!("The expected [{path}] folder was not created.");
        }
        self
    }

    /// Assert a folder was never created.
    #[track_caller]
    pub fn assert_folder_not_created(&self, path: &str) -> &Self {
        if self.recorder.has("folder_created", |op| op.path == path) {
            panic!("The expected [{path}] folder was created.");
        }
        self
    }

    /// Assert a folder was deleted.
    #[track_caller]
    pub fn assert_folder_deleted(&self, path: &str) -> &Self {
        if !self.recorder.has("folder_deleted", |op| op.path == path) {
            panic!("The expected [{path}] folder was not deleted.");
        }
        self
    }

    /// Assert a folder was never deleted.
    #[track_caller]
    pub fn assert_folder_not_deleted(&self, path: &str) -> &Self {
        if self.recorder.has("folder_deleted", |op| op.path == path) {
            panic!("The expected [{path}] folder was deleted.");
        }
        self
    }

    /// Assert a file's visibility was changed.
    #[track_caller]
    pub fn assert_visibility_changed(&self, path: &str) -> &Self {
        if !self.recorder.has("visibility", |op| op.path == path) {
            panic!("The expected [{path}] file visibility was not changed.");
        }
        self
    }

    /// Assert a file's visibility was never changed.
    #[track_caller]
    pub fn assert_visibility_not_changed(&self, path: &str) -> &Self {
        if self.recorder.has("visibility", |op| op.path == path) {
            panic!("The expected [{path}] file visibility was changed.");
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_app() -> (tempfile::TempDir, Arc<App>) {
        let dir = tempfile::tempdir().unwrap();
        let app = Arc::new(App::builder().root(dir.path()).build().unwrap());
        (dir, app)
    }

    #[test]
    fn writes_land_in_the_sandbox_and_are_recorded() {
        let (_dir, app) = test_app();
        let fake = FakeFileStorage::install(&app);

        let local = fake.storages().storage("local").unwrap();
        local.write("docs/readme.txt", b"hello").unwrap();

        let on_disk = app
            .dir("storage")
            .unwrap()
            .join(SANDBOX_SUBDIR)
            .join("local/docs/readme.txt");
        assert!(on_disk.is_file());

        fake.storage("local")
            .assert_exists("docs/readme.txt")
            .assert_created("docs/readme.txt")
            .assert_folder_exists("docs")
            .assert_not_created("other.txt");
    }

    #[test]
    fn stale_sandbox_content_is_wiped_on_resolution() {
        let (_dir, app) = test_app();
        let fake = FakeFileStorage::install(&app);

        let stale = app
            .dir("storage")
            .unwrap()
            .join(SANDBOX_SUBDIR)
            .join("local/stale.txt");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, b"old").unwrap();

        fake.storage("local").assert_not_exist("stale.txt");
        assert!(!stale.exists());
    }

    #[test]
    fn copy_move_delete_are_recorded() {
        let (_dir, app) = test_app();
        let fake = FakeFileStorage::install(&app);

        let local = fake.storages().storage("local").unwrap();
        local.write("a.txt", b"data").unwrap();
        local.copy("a.txt", "b.txt").unwrap();
        local.rename("b.txt", "c.txt").unwrap();
        local.delete("a.txt").unwrap();
        local.create_folder("archive").unwrap();
        local.delete_folder("archive").unwrap();
        local.set_visibility("c.txt", Visibility::Private).unwrap();

        fake.storage("local")
            .assert_copied("a.txt", "b.txt")
            .assert_moved("b.txt", "c.txt")
            .assert_deleted("a.txt")
            .assert_folder_created("archive")
            .assert_folder_deleted("archive")
            .assert_visibility_changed("c.txt")
            .assert_not_exist("a.txt")
            .assert_exists("c.txt");
    }

    #[test]
    fn failed_operations_are_not_recorded() {
        let (_dir, app) = test_app();
        let fake = FakeFileStorage::install(&app);

        let local = fake.storages().storage("local").unwrap();
        assert!(local.delete("missing.txt").is_err());

        fake.storage("local").assert_not_deleted("missing.txt");
    }

    #[test]
    #[should_panic(expected = "The expected [missing.txt] file was not created.")]
    fn missing_write_fails() {
        let (_dir, app) = test_app();
        FakeFileStorage::install(&app)
            .storage("local")
            .assert_created("missing.txt");
    }

    #[test]
    #[should_panic(expected = "The unexpected [a.txt] file does exist.")]
    fn present_file_fails_not_exist() {
        let (_dir, app) = test_app();
        let fake = FakeFileStorage::install(&app);
        fake.storages()
            .storage("uploads")
            .unwrap()
            .write("a.txt", b"x")
            .unwrap();

        fake.storage("uploads").assert_not_exist("a.txt");
    }
}
