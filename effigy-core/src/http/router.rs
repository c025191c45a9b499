//! Route table, handlers and route guards.

use crate::app::RunCx;
use crate::error::{CoreError, Result};
use crate::http::response::Response;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What a handler returns; turned into a [`Response`] by the runtime.
pub enum Reply {
    /// `200` with an HTML text body.
    Text(String),
    /// `200` with a JSON body.
    Json(Value),
    /// `302` to a location.
    Redirect(String),
    /// A bare status with no body.
    Status(u16),
    /// A fully built response.
    Full(Response),
}

impl Reply {
    /// Build the response this reply stands for.
    pub fn into_response(self) -> Result<Response> {
        match self {
            Reply::Text(body) => Ok(Response::text(200, body)),
            Reply::Json(value) => Response::json(200, &value),
            Reply::Redirect(location) => Ok(Response::redirect(location)),
            Reply::Status(status) => Ok(Response::new(status)),
            Reply::Full(response) => Ok(response),
        }
    }
}

/// A route handler.
pub type Handler = Arc<dyn Fn(&RunCx) -> Result<Reply> + Send + Sync>;

/// Access restriction checked before a route's handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Only authenticated users; others are redirected or get `403`.
    Authenticated {
        /// Where to send unauthenticated users, if anywhere.
        redirect: Option<String>,
    },
    /// Only guests; authenticated users are redirected or get `403`.
    Guest {
        /// Where to send authenticated users, if anywhere.
        redirect: Option<String>,
    },
}

/// One route: method, pattern, handler, and optional name and guard.
pub struct Route {
    method: String,
    pattern: String,
    regex: Option<Regex>,
    name: Option<String>,
    guard: Option<Guard>,
    handler: Handler,
}

impl Route {
    /// Create a route for a method and pattern.
    ///
    /// Patterns hold literal segments and `{param}` placeholders matching
    /// one segment each, e.g. `/blog/{id}`.
    pub fn new<F>(method: &str, pattern: &str, handler: F) -> Self
    where
        F: Fn(&RunCx) -> Result<Reply> + Send + Sync + 'static,
    {
        let pattern = normalize_pattern(pattern);
        let regex = compile_pattern(&pattern);
        if regex.is_none() {
            tracing::warn!(pattern = %pattern, "route pattern failed to compile; route will not match");
        }
        Self {
            method: method.to_ascii_uppercase(),
            pattern,
            regex,
            name: None,
            guard: None,
            handler: Arc::new(handler),
        }
    }

    /// A `GET` route.
    pub fn get<F>(pattern: &str, handler: F) -> Self
    where
        F: Fn(&RunCx) -> Result<Reply> + Send + Sync + 'static,
    {
        Self::new("GET", pattern, handler)
    }

    /// A `POST` route.
    pub fn post<F>(pattern: &str, handler: F) -> Self
    where
        F: Fn(&RunCx) -> Result<Reply> + Send + Sync + 'static,
    {
        Self::new("POST", pattern, handler)
    }

    /// A `PUT` route.
    pub fn put<F>(pattern: &str, handler: F) -> Self
    where
        F: Fn(&RunCx) -> Result<Reply> + Send + Sync + 'static,
    {
        Self::new("PUT", pattern, handler)
    }

    /// A `DELETE` route.
    pub fn delete<F>(pattern: &str, handler: F) -> Self
    where
        F: Fn(&RunCx) -> Result<Reply> + Send + Sync + 'static,
    {
        Self::new("DELETE", pattern, handler)
    }

    /// Name the route for url generation.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restrict the route with a guard.
    #[must_use]
    pub fn guarded(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Route method, uppercased.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Route pattern with a leading `/`.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Route name, if named.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Route guard, if guarded.
    pub fn guard(&self) -> Option<&Guard> {
        self.guard.as_ref()
    }

    /// Match a method and path, yielding the captured params.
    pub fn matches(&self, method: &str, path: &str) -> Option<HashMap<String, String>> {
        if !self.method.eq_ignore_ascii_case(method) {
            return None;
        }
        let regex = self.regex.as_ref()?;
        let captures = regex.captures(path)?;
        let mut params = HashMap::new();
        for name in regex.capture_names().flatten() {
            if let Some(found) = captures.name(name) {
                params.insert(name.to_string(), found.as_str().to_string());
            }
        }
        Some(params)
    }

    /// Invoke the handler.
    pub fn handle(&self, cx: &RunCx) -> Result<Reply> {
        (self.handler)(cx)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("name", &self.name)
            .field("guard", &self.guard)
            .finish()
    }
}

/// The route table. First registered match wins.
#[derive(Clone, Default)]
pub struct Router {
    inner: Arc<RwLock<Vec<Arc<Route>>>>,
}

impl Router {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route.
    pub fn add(&self, route: Route) {
        self.inner.write().push(Arc::new(route));
    }

    /// Find the first route matching a method and path.
    pub fn match_route(
        &self,
        method: &str,
        path: &str,
    ) -> Option<(Arc<Route>, HashMap<String, String>)> {
        self.inner
            .read()
            .iter()
            .find_map(|route| route.matches(method, path).map(|p| (route.clone(), p)))
    }

    /// Build the url of a named route, filling `{param}` placeholders.
    pub fn url(&self, name: &str, params: &[(&str, &str)]) -> Result<String> {
        let routes = self.inner.read();
        let route = routes
            .iter()
            .find(|r| r.name.as_deref() == Some(name))
            .ok_or_else(|| CoreError::RouteNotFound {
                name: name.to_string(),
            })?;
        let mut url = route.pattern.clone();
        for (key, value) in params {
            url = url.replace(&format!("{{{key}}}"), value);
        }
        if let Some(open) = url.find('{') {
            let close = url[open..].find('}').map_or(url.len(), |c| open + c);
            return Err(CoreError::RouteParam {
                name: name.to_string(),
                param: url[open + 1..close].to_string(),
            });
        }
        Ok(url)
    }

    /// Names of all named routes.
    pub fn names(&self) -> Vec<String> {
        self.inner
            .read()
            .iter()
            .filter_map(|r| r.name.clone())
            .collect()
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Check whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

fn normalize_pattern(raw: &str) -> String {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn compile_pattern(pattern: &str) -> Option<Regex> {
    let mut source = String::from("^");
    let mut rest = pattern;
    loop {
        match rest.find('{') {
            Some(open) => {
                source.push_str(&regex::escape(&rest[..open]));
                let after = &rest[open..];
                match after.find('}') {
                    Some(close) if is_param_name(&after[1..close]) => {
                        source.push_str(&format!("(?P<{}>[^/]+)", &after[1..close]));
                        rest = &after[close + 1..];
                    }
                    _ => {
                        // Stray braces match literally.
                        source.push_str(&regex::escape(&after[..1]));
                        rest = &after[1..];
                    }
                }
            }
            None => {
                source.push_str(&regex::escape(rest));
                break;
            }
        }
    }
    source.push('$');
    Regex::new(&source).ok()
}

fn is_param_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_ok(_: &RunCx) -> Result<Reply> {
        Ok(Reply::Status(200))
    }

    #[test]
    fn pattern_params_are_captured() {
        let route = Route::get("/blog/{id}/comments/{comment}", reply_ok);
        let params = route.matches("GET", "/blog/7/comments/3").unwrap();
        assert_eq!(params["id"], "7");
        assert_eq!(params["comment"], "3");
        assert!(route.matches("GET", "/blog/7").is_none());
        assert!(route.matches("POST", "/blog/7/comments/3").is_none());
    }

    #[test]
    fn first_match_wins() {
        let router = Router::new();
        router.add(Route::get("/blog/new", |_| Ok(Reply::Text("new".into()))).named("blog.new"));
        router.add(Route::get("/blog/{id}", reply_ok).named("blog.show"));

        let (route, params) = router.match_route("GET", "/blog/new").unwrap();
        assert_eq!(route.name(), Some("blog.new"));
        assert!(params.is_empty());

        let (route, params) = router.match_route("GET", "/blog/12").unwrap();
        assert_eq!(route.name(), Some("blog.show"));
        assert_eq!(params["id"], "12");
    }

    #[test]
    fn url_generation() {
        let router = Router::new();
        router.add(Route::get("/blog/{id}", reply_ok).named("blog.show"));

        assert_eq!(router.url("blog.show", &[("id", "9")]).unwrap(), "/blog/9");

        let err = router.url("missing", &[]).unwrap_err();
        assert_eq!(err.code(), "E041");

        let err = router.url("blog.show", &[]).unwrap_err();
        assert_eq!(err.code(), "E042");
    }

    #[test]
    fn stray_braces_match_literally() {
        let route = Route::get("/odd/{", reply_ok);
        assert!(route.matches("GET", "/odd/{").is_some());
        assert!(route.matches("GET", "/odd/x").is_none());
    }

    #[test]
    fn patterns_are_normalized() {
        let route = Route::get("dashboard/", reply_ok);
        assert_eq!(route.pattern(), "/dashboard");
        assert!(route.matches("get", "/dashboard").is_some());
    }
}
