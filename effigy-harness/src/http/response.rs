//! Captured response assertions.

use crate::must;
use effigy_core::http::cookie::Cookie;
use effigy_core::http::response::Response;
use effigy_core::http::router::Router;
use effigy_core::http::session::SessionData;
use serde_json::Value;
use std::fmt;

/// A response captured from one application run.
///
/// Holds the response itself, a snapshot of the session as the run left
/// it and the run's route table, so assertions keep working after the
/// harness has moved on to the next context.
#[derive(Clone)]
pub struct TestResponse {
    response: Response,
    session: Option<SessionData>,
    router: Option<Router>,
}

impl TestResponse {
    pub(crate) fn new(
        response: Response,
        session: Option<SessionData>,
        router: Option<Router>,
    ) -> Self {
        Self {
            response,
            session,
            router,
        }
    }

    /// The captured response.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Response status.
    pub fn status(&self) -> u16 {
        self.response.status()
    }

    /// First header value for a name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response.header(name)
    }

    /// Check whether a header is present.
    pub fn has_header(&self, name: &str) -> bool {
        self.response.header(name).is_some()
    }

    /// Body as text.
    pub fn body(&self) -> String {
        self.response.body_str().into_owned()
    }

    /// Body parsed as JSON, if it parses.
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(self.response.body()).ok()
    }

    /// Cookies set by the response.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.response.cookies()
    }

    /// One cookie set by the response.
    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        self.response.cookie(name)
    }

    /// A value from the captured session snapshot.
    pub fn session(&self, key: &str) -> Option<Value> {
        let session = self.session.as_ref()?;
        session
            .values
            .get(key)
            .or_else(|| session.flash.get(key))
            .cloned()
    }

    fn session_has(&self, key: &str) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.values.contains_key(key) || s.flash.contains_key(key))
    }

    /// Whether a client would follow this response somewhere else.
    pub fn is_redirect(&self) -> bool {
        self.response.is_redirect()
    }

    /// The redirect target, if any.
    pub fn location(&self) -> Option<&str> {
        self.response.location()
    }

    /// Assert the response status.
    #[track_caller]
    pub fn assert_status(&self, status: u16) -> &Self {
        let actual = self.response.status();
        if actual != status {
            panic!("Received response status [{actual}] but expected [{status}].");
        }
        self
    }

    /// Assert the body is exactly a string.
    #[track_caller]
    pub fn assert_body_same(&self, body: &str) -> &Self {
        if self.response.body_str() != body {
            panic!("Response is not same with [{body}]");
        }
        self
    }

    /// Assert the body is not a string.
    #[track_caller]
    pub fn assert_body_not_same(&self, body: &str) -> &Self {
        if self.response.body_str() == body {
            panic!("Response is same with [{body}]");
        }
        self
    }

    /// Assert the body contains a string.
    #[track_caller]
    pub fn assert_body_contains(&self, body: &str) -> &Self {
        if !self.response.body_str().contains(body) {
            panic!("Response doesn't contain [{body}]");
        }
        self
    }

    /// Assert the content type.
    #[track_caller]
    pub fn assert_content_type(&self, content_type: &str) -> &Self {
        if self.response.header("Content-Type") != Some(content_type) {
            panic!("Response does not contain content type [{content_type}].");
        }
        self
    }

    /// Assert a header is present.
    #[track_caller]
    pub fn assert_has_header(&self, name: &str) -> &Self {
        if !self.has_header(name) {
            panic!("Response does not contain header with name [{name}].");
        }
        self
    }

    /// Assert a header is present with a value.
    #[track_caller]
    pub fn assert_header(&self, name: &str, value: &str) -> &Self {
        self.assert_has_header(name);
        let actual = self.response.header(name).unwrap_or_default();
        if actual != value {
            panic!("Header [{name}] was found, but value [{actual}] does not match [{value}].");
        }
        self
    }

    /// Assert a header is absent.
    #[track_caller]
    pub fn assert_header_missing(&self, name: &str) -> &Self {
        if self.has_header(name) {
            panic!("Response contains header with name [{name}].");
        }
        self
    }

    /// Assert a cookie was set.
    #[track_caller]
    pub fn assert_cookie(&self, name: &str) -> &Self {
        if self.cookie(name).is_none() {
            panic!("Response does not contain cookie with name [{name}].");
        }
        self
    }

    /// Assert a cookie was set with a value.
    #[track_caller]
    pub fn assert_cookie_value(&self, name: &str, value: &str) -> &Self {
        self.assert_cookie(name);
        let actual = self.cookie(name).map(|c| c.value).unwrap_or_default();
        if actual != value {
            panic!("Cookie [{name}] was found, but value [{actual}] does not match [{value}].");
        }
        self
    }

    /// Assert no cookie of a name was set.
    #[track_caller]
    pub fn assert_cookie_missing(&self, name: &str) -> &Self {
        if self.cookie(name).is_some() {
            panic!("Response contains cookie with name [{name}].");
        }
        self
    }

    /// Assert the session holds a key.
    #[track_caller]
    pub fn assert_has_session(&self, key: &str) -> &Self {
        if !self.session_has(key) {
            panic!("Session is missing expected key [{key}].");
        }
        self
    }

    /// Assert the session holds a key with a value.
    #[track_caller]
    pub fn assert_session_value(&self, key: &str, value: &Value) -> &Self {
        self.assert_has_session(key);
        match self.session(key) {
            Some(actual) if &actual == value => self,
            actual => panic!(
                "Session key [{key}] was found, but value [{}] does not match [{}].",
                value_text(actual.as_ref()),
                value_text(Some(value)),
            ),
        }
    }

    /// Assert the session does not hold a key.
    ///
    /// A run that never started a session has nothing unexpected in it.
    #[track_caller]
    pub fn assert_session_missing(&self, key: &str) -> &Self {
        if self.session_has(key) {
            panic!("Session has unexpected key [{key}].");
        }
        self
    }

    /// Assert the response redirects to a uri.
    #[track_caller]
    pub fn assert_location(&self, uri: &str) -> &Self {
        self.assert_header("Location", uri)
    }

    /// Assert the response redirects to a named route.
    #[track_caller]
    pub fn assert_redirect_to_route(&self, name: &str, params: &[(&str, &str)]) -> &Self {
        let Some(router) = &self.router else {
            return self;
        };
        if !self.is_redirect() {
            panic!("Response is not a redirection.");
        }
        let url = must(router.url(name, params));
        self.assert_location(&url)
    }
}

impl fmt::Display for TestResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.response.body_str())
    }
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use effigy_core::http::router::{Reply, Route};
    use serde_json::json;

    fn plain(response: Response) -> TestResponse {
        TestResponse::new(response, None, None)
    }

    fn with_session(response: Response, session: SessionData) -> TestResponse {
        TestResponse::new(response, Some(session), None)
    }

    #[test]
    fn body_and_status_assertions_chain() {
        let response = plain(Response::text(200, "welcome home"));
        response
            .assert_status(200)
            .assert_body_same("welcome home")
            .assert_body_contains("welcome")
            .assert_body_not_same("goodbye")
            .assert_content_type("text/html; charset=utf-8");
    }

    #[test]
    #[should_panic(expected = "Received response status [404] but expected [200].")]
    fn wrong_status_fails() {
        plain(Response::text(404, "missing")).assert_status(200);
    }

    #[test]
    #[should_panic(expected = "Response doesn't contain [absent]")]
    fn missing_body_text_fails() {
        plain(Response::text(200, "present")).assert_body_contains("absent");
    }

    #[test]
    fn header_assertions() {
        let response = plain(Response::new(204).with_header("X-Request-Id", "req_9"));
        response
            .assert_has_header("x-request-id")
            .assert_header("X-Request-Id", "req_9")
            .assert_header_missing("X-Other");
    }

    #[test]
    #[should_panic(
        expected = "Header [X-Request-Id] was found, but value [req_9] does not match [req_1]."
    )]
    fn mismatched_header_value_fails() {
        plain(Response::new(204).with_header("X-Request-Id", "req_9"))
            .assert_header("X-Request-Id", "req_1");
    }

    #[test]
    fn cookie_assertions() {
        let mut response = Response::new(200);
        response.add_cookie("theme", "dark mode");
        plain(response)
            .assert_cookie("theme")
            .assert_cookie_value("theme", "dark mode")
            .assert_cookie_missing("locale");
    }

    #[test]
    #[should_panic(expected = "Response does not contain cookie with name [locale].")]
    fn absent_cookie_fails() {
        plain(Response::new(200)).assert_cookie("locale");
    }

    #[test]
    fn session_snapshot_assertions() {
        let mut session = SessionData::default();
        session.values.insert("user".to_string(), json!("tom"));
        session.flash.insert("notice".to_string(), json!("saved!"));

        let response = with_session(Response::new(200), session);
        response
            .assert_has_session("user")
            .assert_session_value("user", &json!("tom"))
            .assert_has_session("notice")
            .assert_session_missing("basket");
    }

    #[test]
    #[should_panic(expected = "Session is missing expected key [user].")]
    fn sessionless_run_has_no_keys() {
        plain(Response::new(200)).assert_has_session("user");
    }

    #[test]
    fn sessionless_run_passes_missing_checks() {
        plain(Response::new(200)).assert_session_missing("user");
    }

    #[test]
    #[should_panic(expected = "Session key [user] was found, but value [tom] does not match [ann].")]
    fn mismatched_session_value_fails() {
        let mut session = SessionData::default();
        session.values.insert("user".to_string(), json!("tom"));
        with_session(Response::new(200), session).assert_session_value("user", &json!("ann"));
    }

    #[test]
    fn redirect_to_named_route() {
        let router = Router::new();
        router.add(Route::get("/profile/{id}", |_| Ok(Reply::Status(200))).named("profile"));

        let response = TestResponse::new(Response::redirect("/profile/7"), None, Some(router));
        response.assert_redirect_to_route("profile", &[("id", "7")]);
    }

    #[test]
    #[should_panic(expected = "Response is not a redirection.")]
    fn plain_response_is_not_a_redirection() {
        let router = Router::new();
        router.add(Route::get("/profile", |_| Ok(Reply::Status(200))).named("profile"));

        TestResponse::new(Response::text(200, "ok"), None, Some(router))
            .assert_redirect_to_route("profile", &[]);
    }

    #[test]
    fn routerless_capture_skips_route_assertions() {
        plain(Response::text(200, "ok")).assert_redirect_to_route("anywhere", &[]);
    }
}
