//! The application kernel.
//!
//! An [`App`] owns its directories, the capability hook registry and the
//! memoized services resolved through it. Booting resolves every service
//! once in a fixed order; running resolves the incoming request, walks
//! the middleware stack, dispatches the matched route and emits the
//! response. An app handles exactly one request; a second [`App::run`]
//! returns the already-captured response without handling again.

use crate::auth::{
    Auth, Authenticated, FileTokenStorage, InMemoryTokenStorage, SessionTokenStorage,
    SharedTokenStorage, Token, User, SESSION_TOKEN_ID_KEY,
};
use crate::config::ConfigMap;
use crate::error::{CoreError, Result};
use crate::events::{Events, SharedDispatcher};
use crate::hooks::Hooks;
use crate::http::emitter::{SharedEmitter, WriterEmitter};
use crate::http::middleware::MiddlewareStack;
use crate::http::request::{ServerRequest, UploadedFile};
use crate::http::response::Response;
use crate::http::router::{Guard, Router};
use crate::http::session::{SessionHandle, SessionSlot, SessionStore};
use crate::mail::{Mailers, Renderer};
use crate::notifier::{Channels, Notifier};
use crate::queue::Queues;
use crate::storage::Storages;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Named application directories.
#[derive(Debug, Clone)]
pub struct Dirs {
    map: HashMap<String, PathBuf>,
}

impl Dirs {
    fn conventional(root: &Path) -> Self {
        let mut map = HashMap::new();
        map.insert("root".to_string(), root.to_path_buf());
        map.insert("app".to_string(), root.join("app"));
        map.insert("config".to_string(), root.join("app").join("config"));
        map.insert("views".to_string(), root.join("app").join("views"));
        map.insert("storage".to_string(), root.join("storage"));
        map.insert("public".to_string(), root.join("public"));
        Self { map }
    }

    /// The path registered under a name.
    pub fn dir(&self, name: &str) -> Result<PathBuf> {
        self.map
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownDir {
                name: name.to_string(),
            })
    }

    /// Register or replace a named path.
    pub fn set(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.map.insert(name.into(), path.into());
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.map.keys().cloned().collect();
        names.sort();
        names
    }
}

/// A memoized service. Resolution runs once; later reads get clones.
struct Slot<T: Clone> {
    value: RwLock<Option<T>>,
}

impl<T: Clone> Slot<T> {
    fn get_or_resolve<F>(&self, resolve: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.value.read().clone() {
            return Ok(value);
        }
        let mut slot = self.value.write();
        if let Some(value) = slot.clone() {
            return Ok(value);
        }
        let value = resolve()?;
        *slot = Some(value.clone());
        Ok(value)
    }
}

impl<T: Clone> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: RwLock::new(None),
        }
    }
}

#[derive(Default)]
struct Services {
    config: Slot<ConfigMap>,
    router: Slot<Router>,
    session_store: Slot<SessionStore>,
    token_storage: Slot<SharedTokenStorage>,
    events: Slot<SharedDispatcher>,
    queues: Slot<Queues>,
    mailers: Slot<Mailers>,
    channels: Slot<Channels>,
    storages: Slot<Storages>,
    middleware: Slot<MiddlewareStack>,
    emitter: Slot<SharedEmitter>,
}

#[derive(Default)]
struct AppState {
    booted: AtomicBool,
    response: RwLock<Option<Response>>,
    session: SessionSlot,
    auth: Auth,
}

/// The application kernel.
pub struct App {
    id: String,
    dirs: Dirs,
    hooks: Hooks,
    services: Services,
    state: AppState,
}

impl App {
    /// Start building an app.
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    /// The app context id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The capability hook registry.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// The named directories.
    pub fn dirs(&self) -> &Dirs {
        &self.dirs
    }

    /// The path registered under a directory name.
    pub fn dir(&self, name: &str) -> Result<PathBuf> {
        self.dirs.dir(name)
    }

    /// Resolve every service once, in a fixed order.
    ///
    /// Booting twice is harmless; already-resolved services stay as
    /// they are.
    pub fn boot(&self) -> Result<()> {
        self.config()?;
        self.session_store()?;
        self.token_storage()?;
        self.events()?;
        self.queues()?;
        self.mailers()?;
        self.channels()?;
        self.storages()?;
        self.router()?;
        self.middleware()?;
        self.emitter()?;
        if !self.state.booted.swap(true, Ordering::SeqCst) {
            tracing::info!(app = %self.id, "app booted");
        }
        Ok(())
    }

    /// Check whether [`App::boot`] has completed.
    #[must_use]
    pub fn is_booted(&self) -> bool {
        self.state.booted.load(Ordering::SeqCst)
    }

    /// Handle the incoming request and emit the response.
    ///
    /// The request is resolved through the server-request capability
    /// starting from `GET /`. A second call returns the captured
    /// response without handling anything.
    pub fn run(self: &Arc<Self>) -> Result<Response> {
        if let Some(response) = self.state.response.read().clone() {
            return Ok(response);
        }
        self.boot()?;

        let request = self
            .hooks
            .server_request
            .resolve(ServerRequest::default(), self);
        tracing::info!(
            app = %self.id,
            method = request.method(),
            path = request.path(),
            "handling request"
        );
        let cx = RunCx::new(self.clone(), request);

        let middlewares = self.middleware()?.list();
        let mut short_circuit = None;
        let mut ran_befores = 0;
        for middleware in &middlewares {
            if let Some(response) = middleware.before(&cx)? {
                tracing::debug!(middleware = middleware.name(), "request short-circuited");
                short_circuit = Some(response);
                break;
            }
            ran_befores += 1;
        }

        let mut response = match short_circuit {
            Some(response) => response,
            None => self.dispatch(&cx)?,
        };
        for middleware in middlewares[..ran_befores].iter().rev() {
            response = middleware.after(&cx, response)?;
        }

        self.emitter()?.emit(&response)?;
        *self.state.response.write() = Some(response.clone());
        tracing::info!(app = %self.id, status = response.status(), "request handled");
        Ok(response)
    }

    /// The response captured by [`App::run`], if it ran.
    pub fn response(&self) -> Option<Response> {
        self.state.response.read().clone()
    }

    /// Check whether this app already handled its request.
    #[must_use]
    pub fn ran(&self) -> bool {
        self.state.response.read().is_some()
    }

    fn dispatch(&self, cx: &RunCx) -> Result<Response> {
        let router = self.router()?;
        let request = cx.request();
        match router.match_route(request.method(), request.path()) {
            Some((route, params)) => {
                cx.set_params(params);
                if let Some(denied) = self.check_guard(route.guard()) {
                    return Ok(denied);
                }
                tracing::debug!(pattern = route.pattern(), "route matched");
                route.handle(cx)?.into_response()
            }
            None => {
                tracing::debug!(path = request.path(), "no route matched");
                Ok(Response::text(404, "Not Found"))
            }
        }
    }

    fn check_guard(&self, guard: Option<&Guard>) -> Option<Response> {
        let authenticated = self.state.auth.is_authenticated();
        let redirect = match guard? {
            Guard::Authenticated { redirect } if !authenticated => Some(redirect.clone()),
            Guard::Guest { redirect } if authenticated => Some(redirect.clone()),
            _ => None,
        }?;
        Some(match redirect {
            Some(location) => Response::redirect(location),
            None => Response::text(403, "Forbidden"),
        })
    }

    /// The session active in the current run, started on demand.
    pub fn session(&self) -> SessionHandle {
        if let Some(session) = self.state.session.read().clone() {
            return session;
        }
        let mut slot = self.state.session.write();
        if let Some(session) = slot.as_ref() {
            return session.clone();
        }
        let fresh = SessionHandle::new();
        *slot = Some(fresh.clone());
        fresh
    }

    /// The active session, if one was started.
    pub fn current_session(&self) -> Option<SessionHandle> {
        self.state.session.read().clone()
    }

    /// Install the session for the current run.
    pub fn install_session(&self, session: SessionHandle) {
        *self.state.session.write() = Some(session);
    }

    /// The slot the run's session is installed into. Late-binding consumers
    /// such as [`SessionTokenStorage`] hold this instead of a session.
    pub fn session_slot(&self) -> SessionSlot {
        self.state.session.clone()
    }

    /// The per-run authentication state.
    pub fn auth(&self) -> &Auth {
        &self.state.auth
    }

    /// The configuration map.
    pub fn config(&self) -> Result<ConfigMap> {
        self.services.config.get_or_resolve(|| {
            let initial = ConfigMap::load_dir(&self.dir("config")?)?;
            Ok(self.hooks.config.resolve(initial, self))
        })
    }

    /// The route table.
    pub fn router(&self) -> Result<Router> {
        self.services
            .router
            .get_or_resolve(|| Ok(self.hooks.router.resolve(Router::new(), self)))
    }

    /// The session store.
    pub fn session_store(&self) -> Result<SessionStore> {
        self.services.session_store.get_or_resolve(|| {
            let initial = SessionStore::new(self.dir("storage")?.join("sessions"));
            Ok(self.hooks.session.resolve(initial, self))
        })
    }

    /// The auth token storage named by `auth.token_storage`.
    pub fn token_storage(&self) -> Result<SharedTokenStorage> {
        self.services.token_storage.get_or_resolve(|| {
            let config = self.config()?;
            let variant = config
                .get_str("auth.token_storage")
                .unwrap_or_else(|| "inmemory".to_string());
            let initial: SharedTokenStorage = match variant.as_str() {
                "storage" => Arc::new(FileTokenStorage::new(
                    self.dir("storage")?.join("auth").join("tokens"),
                )),
                "session" => Arc::new(SessionTokenStorage::new(self.state.session.clone())),
                "inmemory" => Arc::new(InMemoryTokenStorage::new()),
                other => {
                    tracing::warn!(variant = other, "unknown token storage, using inmemory");
                    Arc::new(InMemoryTokenStorage::new())
                }
            };
            Ok(self.hooks.token_storage.resolve(initial, self))
        })
    }

    /// The event dispatcher.
    pub fn events(&self) -> Result<SharedDispatcher> {
        self.services.events.get_or_resolve(|| {
            let initial: SharedDispatcher = Arc::new(Events::new());
            Ok(self.hooks.events.resolve(initial, self))
        })
    }

    /// The named queues.
    pub fn queues(&self) -> Result<Queues> {
        self.services.queues.get_or_resolve(|| {
            let config = self.config()?;
            Ok(self.hooks.queues.resolve(Queues::from_config(&config), self))
        })
    }

    /// The named mailers.
    pub fn mailers(&self) -> Result<Mailers> {
        self.services.mailers.get_or_resolve(|| {
            let config = self.config()?;
            let renderer = Arc::new(Renderer::new(self.dir("views")?));
            Ok(self
                .hooks
                .mailers
                .resolve(Mailers::from_config(&config, renderer), self))
        })
    }

    /// The notifier channels.
    pub fn channels(&self) -> Result<Channels> {
        self.services.channels.get_or_resolve(|| {
            let config = self.config()?;
            Ok(self
                .hooks
                .channels
                .resolve(Channels::from_config(&config), self))
        })
    }

    /// A notifier over the resolved channels.
    pub fn notifier(&self) -> Result<Notifier> {
        Ok(Notifier::new(self.channels()?))
    }

    /// The named file storages.
    pub fn storages(&self) -> Result<Storages> {
        self.services.storages.get_or_resolve(|| {
            let config = self.config()?;
            let files_root = self.dir("storage")?.join("files");
            Ok(self
                .hooks
                .storages
                .resolve(Storages::from_config(&config, &files_root), self))
        })
    }

    /// The middleware stack.
    pub fn middleware(&self) -> Result<MiddlewareStack> {
        self.services
            .middleware
            .get_or_resolve(|| Ok(self.hooks.middleware.resolve(MiddlewareStack::standard(), self)))
    }

    /// The response emitter.
    pub fn emitter(&self) -> Result<SharedEmitter> {
        self.services.emitter.get_or_resolve(|| {
            let initial: SharedEmitter = Arc::new(WriterEmitter);
            Ok(self.hooks.response_emitter.resolve(initial, self))
        })
    }
}

/// Builds an [`App`] rooted at a directory.
#[derive(Default)]
pub struct AppBuilder {
    root: Option<PathBuf>,
    dir_overrides: Vec<(String, PathBuf)>,
    config_values: Vec<(String, Value)>,
    route_registrars: Vec<Box<dyn Fn(&Router) + Send + Sync>>,
}

impl AppBuilder {
    /// Root the app at a directory. Conventional subdirectories are
    /// created on build.
    #[must_use]
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Override or add a named directory. Overridden conventional
    /// directories are still created on build; added names are not.
    #[must_use]
    pub fn dir(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.dir_overrides.push((name.into(), path.into()));
        self
    }

    /// Seed a configuration value, applied after config files load.
    #[must_use]
    pub fn config_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config_values.push((key.into(), value));
        self
    }

    /// Register routes; runs when the router capability resolves.
    #[must_use]
    pub fn routes<F>(mut self, registrar: F) -> Self
    where
        F: Fn(&Router) + Send + Sync + 'static,
    {
        self.route_registrars.push(Box::new(registrar));
        self
    }

    /// Build the app and create its directories.
    pub fn build(self) -> Result<App> {
        let root = self.root.unwrap_or_else(|| PathBuf::from("."));
        let mut dirs = Dirs::conventional(&root);
        for (name, path) in self.dir_overrides {
            dirs.set(name, path);
        }
        for name in ["root", "app", "config", "views", "storage", "public"] {
            let path = dirs.dir(name)?;
            std::fs::create_dir_all(&path).map_err(|e| CoreError::DirCreate {
                path: path.clone(),
                cause: e.to_string(),
            })?;
        }

        let app = App {
            id: format!("app_{}", uuid::Uuid::new_v4().simple()),
            dirs,
            hooks: Hooks::new(),
            services: Services::default(),
            state: AppState::default(),
        };
        for (key, value) in self.config_values {
            app.hooks.config.on(move |config, _| {
                config.set(key.clone(), value.clone());
                config
            });
        }
        for registrar in self.route_registrars {
            app.hooks.router.on(move |router, _| {
                registrar(&router);
                router
            });
        }
        tracing::debug!(app = %app.id, root = %root.display(), "app built");
        Ok(app)
    }
}

/// What a handler and the middleware see while a request runs.
pub struct RunCx {
    app: Arc<App>,
    request: ServerRequest,
    params: RwLock<HashMap<String, String>>,
}

impl RunCx {
    /// Create a run context.
    pub fn new(app: Arc<App>, request: ServerRequest) -> Self {
        Self {
            app,
            request,
            params: RwLock::new(HashMap::new()),
        }
    }

    /// The app handling the request.
    pub fn app(&self) -> &App {
        &self.app
    }

    /// The resolved request.
    pub fn request(&self) -> &ServerRequest {
        &self.request
    }

    pub(crate) fn set_params(&self, params: HashMap<String, String>) {
        *self.params.write() = params;
    }

    /// A route param captured from the path.
    pub fn param(&self, name: &str) -> Option<String> {
        self.params.read().get(name).cloned()
    }

    /// All captured route params.
    pub fn params(&self) -> HashMap<String, String> {
        self.params.read().clone()
    }

    /// The active session, started on demand.
    pub fn session(&self) -> SessionHandle {
        self.app.session()
    }

    /// Install the session for this run.
    pub fn install_session(&self, session: SessionHandle) {
        self.app.install_session(session);
    }

    /// The run's authentication state.
    pub fn auth(&self) -> &Auth {
        self.app.auth()
    }

    /// Log a user in: issue a token, remember it in the session, set
    /// the auth state.
    pub fn login(&self, user: User) -> Result<Token> {
        let storage = self.app.token_storage()?;
        let token = storage.create_token(serde_json::json!({ "user": &user }), "loginform", "app")?;
        self.session()
            .set(SESSION_TOKEN_ID_KEY, Value::String(token.id.clone()));
        self.app.auth().set(Authenticated {
            user,
            via: token.authenticated_via.clone(),
            by: token.authenticated_by.clone(),
            token_id: token.id.clone(),
        });
        Ok(token)
    }

    /// Log the current user out and delete their token.
    pub fn logout(&self) -> Result<()> {
        if let Some(current) = self.app.auth().current() {
            self.app.token_storage()?.delete_token(&current.token_id)?;
        }
        self.session().remove(SESSION_TOKEN_ID_KEY);
        self.app.auth().clear();
        Ok(())
    }

    /// The url of a named route.
    pub fn url(&self, name: &str, params: &[(&str, &str)]) -> Result<String> {
        self.app.router()?.url(name, params)
    }

    /// The request body as JSON, if it is.
    pub fn body_json(&self) -> Option<Value> {
        self.request.body_json()
    }

    /// An uploaded file by input name.
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.request.file(name)
    }
}
