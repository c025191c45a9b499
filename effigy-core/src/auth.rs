//! Token-based authentication state and token storages.
//!
//! The auth middleware resolves a token id from the `X-Auth-Token` header
//! or the session, fetches the token from the resolved storage, and sets
//! the per-run auth state. Storages differ in where tokens live: process
//! memory, JSON files under the app's storage directory, or the session
//! itself.

use crate::error::{CoreError, Result};
use crate::http::session::{SessionHandle, SessionSlot};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Request header carrying a token id.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Session key holding the current token id.
pub const SESSION_TOKEN_ID_KEY: &str = "_auth_token_id";

/// Session key used by the session token storage for the token itself.
pub const SESSION_TOKEN_KEY: &str = "_auth_token";

/// An authenticatable user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// User id.
    pub id: i64,
    /// Username.
    pub username: String,
}

impl User {
    /// Create a user.
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// An issued auth token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    /// Token id, sent by clients in [`AUTH_TOKEN_HEADER`].
    pub id: String,
    /// Token payload; carries the user snapshot under `user`.
    pub payload: Value,
    /// How the token was obtained, e.g. `loginform`.
    pub authenticated_via: String,
    /// Who issued the token, e.g. `testing`.
    pub authenticated_by: String,
    /// Issue timestamp.
    pub issued_at: DateTime<Utc>,
}

impl Token {
    /// Create a token with a fresh id.
    pub fn new(payload: Value, via: impl Into<String>, by: impl Into<String>) -> Self {
        Self {
            id: format!("tok_{}", uuid::Uuid::new_v4().simple()),
            payload,
            authenticated_via: via.into(),
            authenticated_by: by.into(),
            issued_at: Utc::now(),
        }
    }

    /// The user snapshot carried in the payload, if any.
    pub fn user(&self) -> Option<User> {
        self.payload
            .get("user")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Where issued tokens live.
pub trait TokenStorage: Send + Sync {
    /// The storage name (`inmemory`, `storage`, `session`).
    fn name(&self) -> &str;

    /// Issue and store a token.
    fn create_token(&self, payload: Value, via: &str, by: &str) -> Result<Token>;

    /// Fetch a token by id.
    fn fetch_token(&self, id: &str) -> Result<Option<Token>>;

    /// Delete a token by id. Deleting an unknown id is not an error.
    fn delete_token(&self, id: &str) -> Result<()>;
}

/// Shared token storage handle flowing through the capability chain.
pub type SharedTokenStorage = Arc<dyn TokenStorage>;

/// Tokens held in process memory; gone when the context goes.
pub struct InMemoryTokenStorage {
    tokens: RwLock<HashMap<String, Token>>,
}

impl InMemoryTokenStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTokenStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStorage for InMemoryTokenStorage {
    fn name(&self) -> &str {
        "inmemory"
    }

    fn create_token(&self, payload: Value, via: &str, by: &str) -> Result<Token> {
        let token = Token::new(payload, via, by);
        self.tokens.write().insert(token.id.clone(), token.clone());
        Ok(token)
    }

    fn fetch_token(&self, id: &str) -> Result<Option<Token>> {
        Ok(self.tokens.read().get(id).cloned())
    }

    fn delete_token(&self, id: &str) -> Result<()> {
        self.tokens.write().remove(id);
        Ok(())
    }
}

/// Tokens persisted as JSON files; survive context forks.
pub struct FileTokenStorage {
    dir: PathBuf,
}

impl FileTokenStorage {
    /// Create a storage writing under a directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn io(&self, cause: impl ToString) -> CoreError {
        CoreError::TokenStorage {
            storage: "storage".to_string(),
            cause: cause.to_string(),
        }
    }
}

impl TokenStorage for FileTokenStorage {
    fn name(&self) -> &str {
        "storage"
    }

    fn create_token(&self, payload: Value, via: &str, by: &str) -> Result<Token> {
        let token = Token::new(payload, via, by);
        std::fs::create_dir_all(&self.dir).map_err(|e| self.io(e))?;
        let raw = serde_json::to_string_pretty(&token)?;
        std::fs::write(self.path(&token.id), raw).map_err(|e| self.io(e))?;
        Ok(token)
    }

    fn fetch_token(&self, id: &str) -> Result<Option<Token>> {
        let path = self.path(id);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| self.io(e))?;
        let token = serde_json::from_str(&raw)?;
        Ok(Some(token))
    }

    fn delete_token(&self, id: &str) -> Result<()> {
        let path = self.path(id);
        if path.is_file() {
            std::fs::remove_file(&path).map_err(|e| self.io(e))?;
        }
        Ok(())
    }
}

/// The token lives in the session; travels with the session cookie.
///
/// Binds to the run's active session at call time, since the session
/// is loaded per request while the storage is resolved once.
pub struct SessionTokenStorage {
    slot: SessionSlot,
}

impl SessionTokenStorage {
    /// Create a storage reading through a session slot.
    pub fn new(slot: SessionSlot) -> Self {
        Self { slot }
    }

    fn session(&self) -> SessionHandle {
        if let Some(session) = self.slot.read().clone() {
            return session;
        }
        let mut slot = self.slot.write();
        if let Some(session) = slot.as_ref() {
            return session.clone();
        }
        let fresh = SessionHandle::new();
        *slot = Some(fresh.clone());
        fresh
    }
}

impl TokenStorage for SessionTokenStorage {
    fn name(&self) -> &str {
        "session"
    }

    fn create_token(&self, payload: Value, via: &str, by: &str) -> Result<Token> {
        let token = Token::new(payload, via, by);
        self.session()
            .set(SESSION_TOKEN_KEY, serde_json::to_value(&token)?);
        Ok(token)
    }

    fn fetch_token(&self, id: &str) -> Result<Option<Token>> {
        let Some(value) = self.session().get(SESSION_TOKEN_KEY) else {
            return Ok(None);
        };
        let token: Token = serde_json::from_value(value)?;
        Ok((token.id == id).then_some(token))
    }

    fn delete_token(&self, _id: &str) -> Result<()> {
        self.session().remove(SESSION_TOKEN_KEY);
        Ok(())
    }
}

/// Who is authenticated in the current run.
#[derive(Debug, Clone, PartialEq)]
pub struct Authenticated {
    /// The authenticated user.
    pub user: User,
    /// How the token was obtained.
    pub via: String,
    /// Who issued the token.
    pub by: String,
    /// The token backing this authentication.
    pub token_id: String,
}

/// Per-run authentication state.
pub struct Auth {
    state: RwLock<Option<Authenticated>>,
}

impl Auth {
    /// Create unauthenticated state.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }

    /// Check whether someone is authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.state.read().is_some()
    }

    /// The current authentication, if any.
    pub fn current(&self) -> Option<Authenticated> {
        self.state.read().clone()
    }

    /// Mark a user as authenticated.
    pub fn set(&self, authenticated: Authenticated) {
        tracing::debug!(user = %authenticated.user.username, "authenticated");
        *self.state.write() = Some(authenticated);
    }

    /// Clear the authentication.
    pub fn clear(&self) {
        *self.state.write() = None;
    }
}

impl Default for Auth {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_carries_user_snapshot() {
        let user = User::new(5, "tom");
        let token = Token::new(json!({"user": user}), "loginform", "testing");
        assert!(token.id.starts_with("tok_"));
        assert_eq!(token.user().unwrap(), user);
    }

    #[test]
    fn in_memory_roundtrip() {
        let storage = InMemoryTokenStorage::new();
        let token = storage
            .create_token(json!({"user": User::new(1, "ann")}), "loginform", "testing")
            .unwrap();

        let fetched = storage.fetch_token(&token.id).unwrap().unwrap();
        assert_eq!(fetched, token);

        storage.delete_token(&token.id).unwrap();
        assert!(storage.fetch_token(&token.id).unwrap().is_none());
    }

    #[test]
    fn file_storage_survives_new_instances() {
        let dir = tempfile::tempdir().unwrap();
        let token = {
            let storage = FileTokenStorage::new(dir.path());
            storage
                .create_token(json!({"user": User::new(5, "tom")}), "loginform", "testing")
                .unwrap()
        };

        // A fresh instance over the same directory still finds the token.
        let storage = FileTokenStorage::new(dir.path());
        let fetched = storage.fetch_token(&token.id).unwrap().unwrap();
        assert_eq!(fetched.user().unwrap().username, "tom");

        storage.delete_token(&token.id).unwrap();
        assert!(storage.fetch_token(&token.id).unwrap().is_none());
    }

    #[test]
    fn session_storage_matches_by_id() {
        let slot: SessionSlot = Arc::new(RwLock::new(Some(SessionHandle::new())));
        let storage = SessionTokenStorage::new(slot);
        let token = storage
            .create_token(json!({"user": User::new(2, "bea")}), "loginform", "testing")
            .unwrap();

        assert!(storage.fetch_token(&token.id).unwrap().is_some());
        assert!(storage.fetch_token("tok_other").unwrap().is_none());

        storage.delete_token(&token.id).unwrap();
        assert!(storage.fetch_token(&token.id).unwrap().is_none());
    }

    #[test]
    fn auth_state_transitions() {
        let auth = Auth::new();
        assert!(!auth.is_authenticated());

        auth.set(Authenticated {
            user: User::new(5, "tom"),
            via: "loginform".to_string(),
            by: "testing".to_string(),
            token_id: "tok_x".to_string(),
        });
        assert!(auth.is_authenticated());
        assert_eq!(auth.current().unwrap().user.username, "tom");

        auth.clear();
        assert!(!auth.is_authenticated());
    }
}
