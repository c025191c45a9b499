//! Request descriptor building.

use effigy_core::http::request::{Body, ServerRequest, UploadedFile};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

/// The request waiting for the next application run.
///
/// The server-request transformer takes it on resolution, so it is
/// consumed exactly once per run.
pub(crate) type PendingRequest = Arc<RwLock<Option<ServerRequest>>>;

/// Mutates the pending request before the run consumes it.
///
/// All mutators chain. Calls after the run has consumed the request are
/// ignored with a warning.
pub struct TestRequestBuilder {
    pending: PendingRequest,
}

impl TestRequestBuilder {
    pub(crate) fn new(pending: PendingRequest) -> Self {
        Self { pending }
    }

    fn mutate(&self, apply: impl FnOnce(ServerRequest) -> ServerRequest) -> &Self {
        let mut slot = self.pending.write();
        match slot.take() {
            Some(request) => *slot = Some(apply(request)),
            None => tracing::warn!("request already consumed, builder call dropped"),
        }
        self
    }

    /// Append query pairs.
    pub fn query(&self, pairs: &[(&str, &str)]) -> &Self {
        self.mutate(|mut request| {
            for (key, value) in pairs {
                request = request.with_query(*key, *value);
            }
            request
        })
    }

    /// Append a header.
    pub fn header(&self, name: &str, value: &str) -> &Self {
        self.mutate(|request| request.with_header(name, value))
    }

    /// Set a cookie, replacing one of the same name.
    pub fn cookie(&self, name: &str, value: &str) -> &Self {
        self.mutate(|request| request.with_cookie(name, value))
    }

    /// Attach an uploaded file under an input name.
    pub fn file(&self, name: &str, file: UploadedFile) -> &Self {
        self.mutate(|request| request.with_file(name, file))
    }

    /// Set a text body.
    pub fn body(&self, text: impl Into<String>) -> &Self {
        self.mutate(|request| request.with_body(Body::Text(text.into())))
    }

    /// Set a JSON body with the matching content negotiation headers.
    pub fn json(&self, value: Value) -> &Self {
        self.mutate(|request| {
            let length = value.to_string().len();
            request
                .with_header("Content-Type", "application/json")
                .with_header("Accept", "application/json")
                .with_header("Content-Length", length.to_string())
                .with_body(Body::Json(value))
        })
    }

    /// Set a form body.
    pub fn form(&self, pairs: &[(&str, &str)]) -> &Self {
        self.mutate(|request| {
            let fields = pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect();
            request
                .with_header("Content-Type", "application/x-www-form-urlencoded")
                .with_body(Body::Form(fields))
        })
    }

    /// The request as currently built, if not yet consumed.
    pub fn built(&self) -> Option<ServerRequest> {
        self.pending.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded(method: &str, uri: &str) -> TestRequestBuilder {
        let pending: PendingRequest = Arc::new(RwLock::new(Some(ServerRequest::new(method, uri))));
        TestRequestBuilder::new(pending)
    }

    #[test]
    fn mutators_chain_onto_the_pending_request() {
        let builder = seeded("GET", "/search");
        builder
            .query(&[("term", "harness"), ("page", "2")])
            .header("Accept-Language", "de")
            .cookie("theme", "dark");

        let request = builder.built().unwrap();
        assert_eq!(request.query_param("term"), Some("harness"));
        assert_eq!(request.query_param("page"), Some("2"));
        assert_eq!(request.header("accept-language"), Some("de"));
        assert_eq!(request.cookie("theme"), Some("dark"));
    }

    #[test]
    fn json_body_sets_negotiation_headers() {
        let builder = seeded("POST", "/api/orders");
        builder.json(json!({"sku": "a-1"}));

        let request = builder.built().unwrap();
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.header("Accept"), Some("application/json"));
        assert_eq!(request.header("Content-Length"), Some("13"));
        assert_eq!(request.body_json(), Some(json!({"sku": "a-1"})));
    }

    #[test]
    fn form_body_keeps_field_order() {
        let builder = seeded("POST", "/login");
        builder.form(&[("user", "tom"), ("password", "secret")]);

        let request = builder.built().unwrap();
        assert_eq!(request.form_value("user"), Some("tom"));
        assert_eq!(
            request.header("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn consumed_request_ignores_late_mutation() {
        let pending: PendingRequest = Arc::new(RwLock::new(None));
        let builder = TestRequestBuilder::new(pending);
        builder.header("X-Late", "1");
        assert!(builder.built().is_none());
    }
}
