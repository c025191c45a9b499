//! File-backed sessions.
//!
//! Sessions are identified by the `sess_id` cookie and persisted as JSON
//! files under `storage/sessions`. Flash values live for exactly one
//! following request: they are saved with the session, surfaced through
//! [`SessionHandle::get`] on the next load, and dropped on the save after
//! that.

use crate::error::{CoreError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "sess_id";

/// Shared slot holding the session active in the current run, if any.
pub type SessionSlot = Arc<RwLock<Option<SessionHandle>>>;

/// The persisted shape of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Durable values.
    #[serde(default)]
    pub values: HashMap<String, Value>,
    /// Flash values awaiting their one following request.
    #[serde(default)]
    pub flash: HashMap<String, Value>,
}

struct SessionState {
    id: String,
    values: HashMap<String, Value>,
    flash_new: HashMap<String, Value>,
    flash_old: HashMap<String, Value>,
}

/// An active session, shared across a run.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<RwLock<SessionState>>,
}

impl SessionHandle {
    /// Start a fresh session with a new id.
    pub fn new() -> Self {
        Self::with_id(format!("sess_{}", uuid::Uuid::new_v4().simple()))
    }

    fn with_id(id: String) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionState {
                id,
                values: HashMap::new(),
                flash_new: HashMap::new(),
                flash_old: HashMap::new(),
            })),
        }
    }

    fn from_data(id: String, data: SessionData) -> Self {
        let handle = Self::with_id(id);
        {
            let mut state = handle.inner.write();
            state.values = data.values;
            // Flash saved by the previous request becomes readable now
            // and will not be saved again.
            state.flash_old = data.flash;
        }
        handle
    }

    /// The session id.
    pub fn id(&self) -> String {
        self.inner.read().id.clone()
    }

    /// Read a value; falls back to flash from the previous request.
    pub fn get(&self, key: &str) -> Option<Value> {
        let state = self.inner.read();
        state
            .values
            .get(key)
            .or_else(|| state.flash_old.get(key))
            .cloned()
    }

    /// Write a durable value.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.write().values.insert(key.into(), value);
    }

    /// Write a flash value for the next request only.
    pub fn flash(&self, key: impl Into<String>, value: Value) {
        self.inner.write().flash_new.insert(key.into(), value);
    }

    /// Remove a key from values and flash.
    pub fn remove(&self, key: &str) {
        let mut state = self.inner.write();
        state.values.remove(key);
        state.flash_new.remove(key);
        state.flash_old.remove(key);
    }

    /// Check whether a key would survive a save.
    pub fn has(&self, key: &str) -> bool {
        let state = self.inner.read();
        state.values.contains_key(key) || state.flash_new.contains_key(key)
    }

    /// Drop all values and flash.
    pub fn clear(&self) {
        let mut state = self.inner.write();
        state.values.clear();
        state.flash_new.clear();
        state.flash_old.clear();
    }

    /// What a save would persist.
    pub fn snapshot(&self) -> SessionData {
        let state = self.inner.read();
        SessionData {
            values: state.values.clone(),
            flash: state.flash_new.clone(),
        }
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Loads and saves sessions under a directory.
///
/// Clones share the seed map, so values seeded through any clone apply
/// to sessions loaded through all of them.
#[derive(Clone)]
pub struct SessionStore {
    dir: PathBuf,
    cookie_name: String,
    seed: Arc<RwLock<HashMap<String, Value>>>,
}

impl SessionStore {
    /// Create a store over a directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cookie_name: SESSION_COOKIE.to_string(),
            seed: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The cookie carrying the session id.
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Queue a value every loaded session starts with.
    pub fn seed(&self, key: impl Into<String>, value: Value) {
        self.seed.write().insert(key.into(), value);
    }

    /// Values queued via [`SessionStore::seed`].
    pub fn seed_values(&self) -> HashMap<String, Value> {
        self.seed.read().clone()
    }

    /// Load the session for a cookie id, or start a fresh one.
    ///
    /// Unknown or unsafe ids start a fresh session rather than erroring.
    pub fn load(&self, id: Option<&str>) -> Result<SessionHandle> {
        let handle = match id.filter(|id| is_safe_id(id)) {
            Some(id) => {
                let path = self.path(id);
                if path.is_file() {
                    let raw = std::fs::read_to_string(&path).map_err(session_io)?;
                    let data: SessionData = serde_json::from_str(&raw)?;
                    SessionHandle::from_data(id.to_string(), data)
                } else {
                    SessionHandle::with_id(id.to_string())
                }
            }
            None => SessionHandle::new(),
        };
        for (key, value) in self.seed.read().iter() {
            handle.set(key.clone(), value.clone());
        }
        Ok(handle)
    }

    /// Persist a session.
    pub fn save(&self, handle: &SessionHandle) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(session_io)?;
        let raw = serde_json::to_string_pretty(&handle.snapshot())?;
        std::fs::write(self.path(&handle.id()), raw).map_err(session_io)?;
        Ok(())
    }

    /// Delete a persisted session.
    pub fn destroy(&self, id: &str) -> Result<()> {
        let path = self.path(id);
        if path.is_file() {
            std::fs::remove_file(&path).map_err(session_io)?;
        }
        Ok(())
    }

    /// Read a persisted session without activating it.
    pub fn peek(&self, id: &str) -> Result<Option<SessionData>> {
        let path = self.path(id);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(session_io)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn session_io(cause: std::io::Error) -> CoreError {
    CoreError::SessionIo {
        cause: cause.to_string(),
    }
}
