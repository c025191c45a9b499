//! Authentication faker.
//!
//! Selects the token storage variant before the capability resolves and
//! pre-authenticates a user by issuing a real token and stamping its id
//! onto every incoming request. Whether authentication survives a new
//! context depends on the selected variant: `storage` tokens persist on
//! disk under the shared root, `inmemory` tokens die with their context.

use crate::must;
use crate::registry::{Faker, FakerKind};
use effigy_core::auth::{
    Authenticated, FileTokenStorage, InMemoryTokenStorage, SessionTokenStorage, SharedTokenStorage,
    Token, User, AUTH_TOKEN_HEADER, SESSION_TOKEN_KEY,
};
use effigy_core::{App, CoreError, FAKE_PRIORITY};
use parking_lot::RwLock;
use serde_json::json;
use std::any::Any;
use std::sync::Arc;

type StorageSelection = Arc<RwLock<Option<String>>>;

/// Substitutes the token storage and pre-authenticates users.
#[derive(Clone)]
pub struct FakeAuth {
    inner: Arc<FakeAuthInner>,
}

struct FakeAuthInner {
    app: Arc<App>,
    storage_name: StorageSelection,
    token: RwLock<Option<Token>>,
    delegate: RwLock<Option<FakeAuth>>,
}

impl FakeAuth {
    pub(crate) fn install(app: &Arc<App>) -> Self {
        let storage_name: StorageSelection = Arc::default();
        let selection = storage_name.clone();
        app.hooks().token_storage.on_with_priority(
            move |storage, app| {
                let Some(name) = selection.read().clone() else {
                    return storage;
                };
                match name.as_str() {
                    "session" => {
                        Arc::new(SessionTokenStorage::new(app.session_slot())) as SharedTokenStorage
                    }
                    "storage" => match app.dir("storage") {
                        Ok(dir) => Arc::new(FileTokenStorage::new(dir.join("auth").join("tokens"))),
                        Err(error) => {
                            tracing::warn!(%error, "storage dir unavailable, token storage kept");
                            storage
                        }
                    },
                    _ => Arc::new(InMemoryTokenStorage::new()),
                }
            },
            FAKE_PRIORITY,
        );
        Self {
            inner: Arc::new(FakeAuthInner {
                app: app.clone(),
                storage_name,
                token: RwLock::new(None),
                delegate: RwLock::new(None),
            }),
        }
    }

    fn newest(&self) -> FakeAuth {
        let mut current = self.clone();
        loop {
            let next = current.inner.delegate.read().clone();
            match next {
                Some(delegate) => current = delegate,
                None => return current,
            }
        }
    }

    /// Select the token storage variant (`inmemory`, `storage`, `session`)
    /// used when the capability resolves.
    pub fn token_storage(&self, name: impl Into<String>) -> &Self {
        *self.newest().inner.storage_name.write() = Some(name.into());
        self
    }

    /// The resolved token storage.
    pub fn storage(&self) -> SharedTokenStorage {
        must(self.newest().inner.app.token_storage())
    }

    /// Issue a token for a user and authenticate the next run as them.
    pub fn authenticated_as(&self, user: User) -> Token {
        let storage = self.storage();
        let token = must(storage.create_token(json!({ "user": user }), "loginform", "testing"));
        self.authenticated_with(token.clone());
        token
    }

    /// Authenticate the next run with an already issued token.
    pub fn authenticated_with(&self, token: Token) -> &Self {
        let newest = self.newest();
        let app = &newest.inner.app;

        let storage = must(app.token_storage());
        if storage.name() == "session" {
            // The run session is loaded from the store, so the token must
            // ride in as a seed rather than a write to the pre-run handle.
            let value = must(serde_json::to_value(&token).map_err(CoreError::from));
            must(app.session_store()).seed(SESSION_TOKEN_KEY, value);
        }

        let id = token.id.clone();
        app.hooks().server_request.on_with_priority(
            move |request, _| request.with_header(AUTH_TOKEN_HEADER, id.clone()),
            FAKE_PRIORITY,
        );
        *newest.inner.token.write() = Some(token);
        self
    }

    /// The run's authentication, if any.
    pub fn authenticated(&self) -> Option<Authenticated> {
        self.newest().inner.app.auth().current()
    }

    /// Assert a user is authenticated.
    #[track_caller]
    pub fn assert_authenticated(&self) -> &Self {
        if self.authenticated().is_none() {
            panic!("The user is not authenticated");
        }
        self
    }

    /// Assert no user is authenticated.
    #[track_caller]
    pub fn assert_not_authenticated(&self) -> &Self {
        if self.authenticated().is_some() {
            panic!("The user is authenticated");
        }
        self
    }
}

impl Faker for FakeAuth {
    fn kind(&self) -> FakerKind {
        FakerKind::Auth
    }

    fn fork(&self, app: &Arc<App>) -> Arc<dyn Faker> {
        let newest = self.newest();
        let forked = FakeAuth::install(app);
        *forked.inner.storage_name.write() = newest.inner.storage_name.read().clone();
        let token = newest.inner.token.read().clone();
        if let Some(token) = token {
            forked.authenticated_with(token);
        }
        *newest.inner.delegate.write() = Some(forked.clone());
        Arc::new(forked)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use effigy_core::{Guard, Reply, Route};
    use std::path::Path;

    fn profile_app(root: &Path) -> Arc<App> {
        let app = App::builder()
            .root(root)
            .routes(|r| {
                r.add(
                    Route::get("/profile", |cx| {
                        let name = cx
                            .auth()
                            .current()
                            .map(|a| a.user.username)
                            .unwrap_or_default();
                        Ok(Reply::Text(name))
                    })
                    .guarded(Guard::Authenticated { redirect: None }),
                );
            })
            .build()
            .unwrap();
        Arc::new(app)
    }

    #[test]
    fn authenticated_as_drives_the_auth_middleware() {
        let dir = tempfile::tempdir().unwrap();
        let app = profile_app(dir.path());
        app.hooks()
            .server_request
            .on(|_, _| effigy_core::ServerRequest::new("GET", "/profile"));

        let fake = FakeAuth::install(&app);
        fake.token_storage("inmemory");
        let token = fake.authenticated_as(User::new(5, "tom"));
        assert!(token.id.starts_with("tok_"));

        let response = app.run().unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.body_str(), "tom");
        fake.assert_authenticated();
        assert_eq!(fake.authenticated().unwrap().by, "testing");
    }

    #[test]
    fn session_variant_seeds_the_run_session() {
        let dir = tempfile::tempdir().unwrap();
        let app = profile_app(dir.path());
        app.hooks()
            .server_request
            .on(|_, _| effigy_core::ServerRequest::new("GET", "/profile"));

        let fake = FakeAuth::install(&app);
        fake.token_storage("session");
        fake.authenticated_as(User::new(7, "ana"));

        let response = app.run().unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.body_str(), "ana");
        fake.assert_authenticated();
    }

    #[test]
    fn storage_variant_persists_across_contexts() {
        let dir = tempfile::tempdir().unwrap();
        let app = profile_app(dir.path());
        let fake = FakeAuth::install(&app);
        fake.token_storage("storage");
        let token = fake.authenticated_as(User::new(5, "tom"));

        // A second context over the same root still finds the token.
        let second = profile_app(dir.path());
        let forked = fake.fork(&second);
        let forked = forked
            .as_any()
            .downcast_ref::<FakeAuth>()
            .expect("auth faker");
        let fetched = forked.storage().fetch_token(&token.id).unwrap();
        assert_eq!(fetched.unwrap().user().unwrap().username, "tom");
    }

    #[test]
    fn unauthenticated_run_stays_guest() {
        let dir = tempfile::tempdir().unwrap();
        let app = profile_app(dir.path());
        app.hooks()
            .server_request
            .on(|_, _| effigy_core::ServerRequest::new("GET", "/profile"));

        let fake = FakeAuth::install(&app);
        let response = app.run().unwrap();

        assert_eq!(response.status(), 403);
        fake.assert_not_authenticated();
    }

    #[test]
    #[should_panic(expected = "The user is not authenticated")]
    fn missing_authentication_fails() {
        let dir = tempfile::tempdir().unwrap();
        let app = profile_app(dir.path());
        FakeAuth::install(&app).assert_authenticated();
    }
}
