//! The incoming server request.

use crate::http::cookie::percent_decode;
use serde_json::Value;
use std::collections::HashMap;

/// A file uploaded with a request.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    /// Client-side file name.
    pub filename: String,
    /// Raw file content.
    pub content: Vec<u8>,
    /// Media type.
    pub mime: String,
    size_override: Option<usize>,
}

impl UploadedFile {
    /// Create an uploaded file.
    pub fn new(filename: impl Into<String>, content: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content,
            mime: mime.into(),
            size_override: None,
        }
    }

    /// Override the reported size without changing the content.
    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size_override = Some(size);
        self
    }

    /// Reported size in bytes.
    pub fn size(&self) -> usize {
        self.size_override.unwrap_or(self.content.len())
    }

    /// File extension, lowercased.
    pub fn extension(&self) -> Option<String> {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }
}

/// Request body variants.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// Raw text body.
    Text(String),
    /// JSON body.
    Json(Value),
    /// URL-encoded form fields.
    Form(Vec<(String, String)>),
}

impl Body {
    /// Check whether the body is empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }
}

/// The request an app run handles.
#[derive(Debug, Clone)]
pub struct ServerRequest {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    files: HashMap<String, UploadedFile>,
    body: Body,
}

impl ServerRequest {
    /// Create a request from a method and a uri.
    ///
    /// The uri is split at the first `?`; the path keeps a leading `/` and
    /// loses any trailing one, query pairs are URL-decoded.
    pub fn new(method: impl Into<String>, uri: &str) -> Self {
        let (raw_path, raw_query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (uri, None),
        };
        Self {
            method: method.into().to_ascii_uppercase(),
            path: normalize_path(raw_path),
            query: raw_query.map(parse_query).unwrap_or_default(),
            headers: Vec::new(),
            cookies: Vec::new(),
            files: HashMap::new(),
            body: Body::Empty,
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set a cookie, replacing an existing one of the same name.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_cookie(name, value);
        self
    }

    /// Append a query pair.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Attach an uploaded file under an input name.
    #[must_use]
    pub fn with_file(mut self, name: impl Into<String>, file: UploadedFile) -> Self {
        self.files.insert(name.into(), file);
        self
    }

    /// Set a cookie in place, replacing an existing one of the same name.
    pub fn set_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.cookies.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.cookies.push((name, value)),
        }
    }

    /// Request method, uppercased.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request path with a leading `/`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// All query pairs in order.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// First query value for a key.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
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

    /// All cookies in order.
    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    /// Cookie value for a name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attached files by input name.
    pub fn files(&self) -> &HashMap<String, UploadedFile> {
        &self.files
    }

    /// One attached file by input name.
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }

    /// The request body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// The body as JSON, if it is JSON or JSON-parsable text.
    pub fn body_json(&self) -> Option<Value> {
        match &self.body {
            Body::Json(value) => Some(value.clone()),
            Body::Text(text) => serde_json::from_str(text).ok(),
            _ => None,
        }
    }

    /// A form field value, from a form body.
    pub fn form_value(&self, key: &str) -> Option<&str> {
        match &self.body {
            Body::Form(fields) => fields
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

impl Default for ServerRequest {
    fn default() -> Self {
        Self::new("GET", "/")
    }
}

fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            (percent_decode(key), percent_decode(value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uri_splits_path_and_query() {
        let request = ServerRequest::new("get", "/blog/?page=2&tag=new%20stuff");
        assert_eq!(request.method(), "GET");
        assert_eq!(request.path(), "/blog");
        assert_eq!(request.query_param("page"), Some("2"));
        assert_eq!(request.query_param("tag"), Some("new stuff"));
    }

    #[test]
    fn root_path_stays_root() {
        assert_eq!(ServerRequest::new("GET", "/").path(), "/");
        assert_eq!(ServerRequest::new("GET", "").path(), "/");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let request = ServerRequest::new("GET", "/").with_header("X-Auth-Token", "tok_1");
        assert_eq!(request.header("x-auth-token"), Some("tok_1"));
    }

    #[test]
    fn cookie_set_replaces_same_name() {
        let request = ServerRequest::new("GET", "/")
            .with_cookie("sess_id", "old")
            .with_cookie("sess_id", "new");
        assert_eq!(request.cookie("sess_id"), Some("new"));
        assert_eq!(request.cookies().len(), 1);
    }

    #[test]
    fn json_body_from_text() {
        let request =
            ServerRequest::new("POST", "/api").with_body(Body::Text("{\"a\":1}".to_string()));
        assert_eq!(request.body_json(), Some(json!({"a": 1})));
    }

    #[test]
    fn uploaded_file_size_override() {
        let file = UploadedFile::new("photo.JPG", vec![1, 2, 3], "image/jpeg").with_size(2048);
        assert_eq!(file.size(), 2048);
        assert_eq!(file.extension().as_deref(), Some("jpg"));
    }
}
