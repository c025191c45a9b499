//! The outgoing response.

use crate::error::Result;
use crate::http::cookie::{parse_set_cookie, percent_encode, Cookie};
use serde::Serialize;
use std::borrow::Cow;

/// Statuses a client follows to the `Location` header.
pub const REDIRECT_STATUSES: &[u16] = &[201, 301, 302, 303, 307, 308];

/// The response an app run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    /// Create an empty response with a status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// An HTML text response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(body.into().into_bytes())
    }

    /// A JSON response.
    pub fn json(status: u16, value: &impl Serialize) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(status)
            .with_header("Content-Type", "application/json")
            .with_body(body))
    }

    /// A `302 Found` redirect.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::new(302).with_header("Location", location.into())
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Append a `Set-Cookie` header for a name/value pair.
    pub fn add_cookie(&mut self, name: &str, value: &str) {
        self.headers.push((
            "Set-Cookie".to_string(),
            format!("{name}={}; Path=/; HttpOnly", percent_encode(value)),
        ));
    }

    /// Response status.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// All headers in order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header value for a name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for a header name, case-insensitive.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Cookies set by this response, parsed from `Set-Cookie` headers.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.header_values("set-cookie")
            .into_iter()
            .map(parse_set_cookie)
            .collect()
    }

    /// One cookie set by this response.
    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        self.cookies().into_iter().find(|c| c.name == name)
    }

    /// Raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as text.
    pub fn body_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Whether a client would follow this response somewhere else.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        REDIRECT_STATUSES.contains(&self.status) && self.header("location").is_some()
    }

    /// The redirect target, if any.
    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_sets_content_type() {
        let response = Response::text(200, "hello");
        assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(response.body_str(), "hello");
    }

    #[test]
    fn json_sets_content_type() {
        let response = Response::json(200, &json!({"ok": true})).unwrap();
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.body_str(), "{\"ok\":true}");
    }

    #[test]
    fn multiple_set_cookie_values() {
        let mut response = Response::new(200);
        response.add_cookie("sess_id", "abc");
        response.add_cookie("theme", "dark mode");

        let cookies = response.cookies();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].value, "abc");
        assert_eq!(response.cookie("theme").unwrap().value, "dark mode");
    }

    #[test]
    fn redirect_detection() {
        assert!(Response::redirect("/next").is_redirect());
        assert!(Response::new(201)
            .with_header("Location", "/made")
            .is_redirect());
        // Status alone is not enough.
        assert!(!Response::new(302).is_redirect());
        assert!(!Response::text(200, "ok").is_redirect());
    }
}
