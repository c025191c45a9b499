//! Request middleware and the default stack.

use crate::app::RunCx;
use crate::auth::{Authenticated, AUTH_TOKEN_HEADER, SESSION_TOKEN_ID_KEY};
use crate::error::Result;
use crate::http::response::Response;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

/// Session key holding the CSRF token.
pub const CSRF_SESSION_KEY: &str = "_csrf";

/// Request header carrying the CSRF token on unsafe methods.
pub const CSRF_HEADER: &str = "X-Csrf-Token";

/// Wraps request handling.
///
/// `before` hooks run in stack order and may short-circuit with a
/// response; `after` hooks run in reverse for every middleware whose
/// `before` ran, including on a short-circuit.
pub trait Middleware: Send + Sync {
    /// Stack name used for removal and replacement.
    fn name(&self) -> &str;

    /// Run before the handler. `Some` short-circuits the request.
    fn before(&self, _cx: &RunCx) -> Result<Option<Response>> {
        Ok(None)
    }

    /// Run after the handler on the way out.
    fn after(&self, _cx: &RunCx, response: Response) -> Result<Response> {
        Ok(response)
    }
}

/// The ordered middleware stack.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    inner: Arc<RwLock<Vec<Arc<dyn Middleware>>>>,
}

impl MiddlewareStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// The default stack: session, auth, csrf.
    pub fn standard() -> Self {
        let stack = Self::new();
        stack.push(SessionMiddleware);
        stack.push(AuthMiddleware);
        stack.push(CsrfMiddleware);
        stack
    }

    /// Append a middleware.
    pub fn push(&self, middleware: impl Middleware + 'static) {
        self.inner.write().push(Arc::new(middleware));
    }

    /// Remove a middleware by name.
    pub fn remove(&self, name: &str) -> bool {
        let mut entries = self.inner.write();
        let before = entries.len();
        entries.retain(|m| m.name() != name);
        entries.len() != before
    }

    /// Replace a middleware by name, keeping its position.
    pub fn replace(&self, name: &str, middleware: impl Middleware + 'static) -> bool {
        let mut entries = self.inner.write();
        match entries.iter().position(|m| m.name() == name) {
            Some(at) => {
                entries[at] = Arc::new(middleware);
                true
            }
            None => false,
        }
    }

    /// Check whether a middleware is on the stack.
    pub fn has(&self, name: &str) -> bool {
        self.inner.read().iter().any(|m| m.name() == name)
    }

    /// Names in stack order.
    pub fn names(&self) -> Vec<String> {
        self.inner
            .read()
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    /// Snapshot of the stack for a run.
    pub fn list(&self) -> Vec<Arc<dyn Middleware>> {
        self.inner.read().clone()
    }
}

/// Loads the session named by the request cookie and saves it on the
/// way out, setting the session cookie on the response.
pub struct SessionMiddleware;

impl Middleware for SessionMiddleware {
    fn name(&self) -> &str {
        "session"
    }

    fn before(&self, cx: &RunCx) -> Result<Option<Response>> {
        let store = cx.app().session_store()?;
        let id = cx.request().cookie(store.cookie_name()).map(str::to_string);
        let session = store.load(id.as_deref())?;
        cx.install_session(session);
        Ok(None)
    }

    fn after(&self, cx: &RunCx, response: Response) -> Result<Response> {
        let store = cx.app().session_store()?;
        let session = cx.session();
        store.save(&session)?;
        let mut response = response;
        response.add_cookie(store.cookie_name(), &session.id());
        Ok(response)
    }
}

/// Resolves the auth token named by the `X-Auth-Token` header or the
/// session and sets the run's auth state. Rejection is left to guards.
pub struct AuthMiddleware;

impl Middleware for AuthMiddleware {
    fn name(&self) -> &str {
        "auth"
    }

    fn before(&self, cx: &RunCx) -> Result<Option<Response>> {
        let token_id = match cx.request().header(AUTH_TOKEN_HEADER) {
            Some(id) => Some(id.to_string()),
            None => cx
                .session()
                .get(SESSION_TOKEN_ID_KEY)
                .and_then(|v| v.as_str().map(str::to_string)),
        };
        let Some(token_id) = token_id else {
            return Ok(None);
        };

        let storage = cx.app().token_storage()?;
        let Some(token) = storage.fetch_token(&token_id)? else {
            return Ok(None);
        };
        let Some(user) = token.user() else {
            return Ok(None);
        };

        cx.auth().set(Authenticated {
            user,
            via: token.authenticated_via.clone(),
            by: token.authenticated_by.clone(),
            token_id: token.id,
        });
        Ok(None)
    }
}

/// Issues a CSRF token on safe methods and requires it back in the
/// `X-Csrf-Token` header on unsafe ones.
pub struct CsrfMiddleware;

impl Middleware for CsrfMiddleware {
    fn name(&self) -> &str {
        "csrf"
    }

    fn before(&self, cx: &RunCx) -> Result<Option<Response>> {
        if matches!(cx.request().method(), "GET" | "HEAD" | "OPTIONS") {
            let session = cx.session();
            if session.get(CSRF_SESSION_KEY).is_none() {
                session.set(
                    CSRF_SESSION_KEY,
                    Value::String(uuid::Uuid::new_v4().simple().to_string()),
                );
            }
            return Ok(None);
        }

        let expected = cx
            .session()
            .get(CSRF_SESSION_KEY)
            .and_then(|v| v.as_str().map(str::to_string));
        let given = cx.request().header(CSRF_HEADER);
        match (expected, given) {
            (Some(expected), Some(given)) if expected == given => Ok(None),
            _ => Ok(Some(Response::text(403, "CSRF token mismatch."))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Middleware for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn standard_stack_order() {
        let stack = MiddlewareStack::standard();
        assert_eq!(stack.names(), vec!["session", "auth", "csrf"]);
    }

    #[test]
    fn remove_by_name() {
        let stack = MiddlewareStack::standard();
        assert!(stack.remove("csrf"));
        assert!(!stack.remove("csrf"));
        assert!(!stack.has("csrf"));
        assert_eq!(stack.names(), vec!["session", "auth"]);
    }

    #[test]
    fn replace_keeps_position() {
        let stack = MiddlewareStack::standard();
        assert!(stack.replace("auth", Named("auth2")));
        assert_eq!(stack.names(), vec!["session", "auth2", "csrf"]);
        assert!(!stack.replace("auth", Named("auth3")));
    }
}
