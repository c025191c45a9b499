//! HTTP faker: request building, response capture and subrequests.

use crate::http::files::FileFactory;
use crate::http::request::{PendingRequest, TestRequestBuilder};
use crate::http::response::TestResponse;
use crate::must;
use crate::registry::{Faker, FakerKind};
use effigy_core::http::emitter::{ResponseEmitter, SharedEmitter};
use effigy_core::http::request::ServerRequest;
use effigy_core::http::response::Response;
use effigy_core::{App, FAKE_PRIORITY};
use parking_lot::RwLock;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;

/// Builds the next app context and returns its HTTP faker.
///
/// Installed by the harness; a faker without one cannot start
/// subrequests.
pub(crate) type Refork = Arc<dyn Fn() -> FakeHttp + Send + Sync>;

/// Captures instead of emitting; the harness reads the run's stored
/// response.
struct CaptureEmitter;

impl ResponseEmitter for CaptureEmitter {
    fn emit(&self, _response: &Response) -> effigy_core::Result<()> {
        Ok(())
    }

    fn is_mock(&self) -> bool {
        true
    }
}

/// Drives simulated requests against the app.
///
/// One app context handles one request. The first [`FakeHttp::response`]
/// call runs the app and captures the outcome; a further
/// [`FakeHttp::request`] forks a fresh context through the harness,
/// carrying the captured response's cookies so state rides along the way
/// a browser would send it.
#[derive(Clone)]
pub struct FakeHttp {
    inner: Arc<FakeHttpInner>,
}

struct FakeHttpInner {
    app: Arc<App>,
    pending: PendingRequest,
    captured: RwLock<Option<TestResponse>>,
    removed_middleware: Arc<RwLock<Vec<String>>>,
    session_seeds: RwLock<Vec<(String, Value)>>,
    refork: RwLock<Option<Refork>>,
    files: FileFactory,
    delegate: RwLock<Option<FakeHttp>>,
}

impl FakeHttp {
    pub(crate) fn install(app: &Arc<App>) -> Self {
        Self::install_with(app, Vec::new(), Vec::new())
    }

    fn install_with(app: &Arc<App>, removed: Vec<String>, seeds: Vec<(String, Value)>) -> Self {
        let pending: PendingRequest = Arc::new(RwLock::new(None));
        let hook_pending = pending.clone();
        app.hooks().server_request.on_with_priority(
            move |initial, _| hook_pending.write().take().unwrap_or(initial),
            FAKE_PRIORITY,
        );

        app.hooks().response_emitter.on_with_priority(
            |_, _| Arc::new(CaptureEmitter) as SharedEmitter,
            FAKE_PRIORITY,
        );

        // The removal list is read at resolution time, so names added
        // after installation still apply to the boot of this context.
        let removed_middleware = Arc::new(RwLock::new(removed));
        let hook_removed = removed_middleware.clone();
        app.hooks().middleware.on_with_priority(
            move |stack, _| {
                stack.remove("csrf");
                for name in hook_removed.read().iter() {
                    stack.remove(name);
                }
                stack
            },
            FAKE_PRIORITY,
        );

        for (key, value) in &seeds {
            must(app.session_store()).seed(key.clone(), value.clone());
        }

        tracing::debug!(app = %app.id(), "http faker installed");
        Self {
            inner: Arc::new(FakeHttpInner {
                app: app.clone(),
                pending,
                captured: RwLock::new(None),
                removed_middleware,
                session_seeds: RwLock::new(seeds),
                refork: RwLock::new(None),
                files: FileFactory::new(),
                delegate: RwLock::new(None),
            }),
        }
    }

    fn newest(&self) -> FakeHttp {
        let mut current = self.clone();
        loop {
            let next = current.inner.delegate.read().clone();
            match next {
                Some(delegate) => current = delegate,
                None => return current,
            }
        }
    }

    pub(crate) fn attach_refork(&self, refork: Refork) {
        *self.newest().inner.refork.write() = Some(refork);
    }

    /// Build the request for the next run.
    ///
    /// After a response has been captured in this context, a fresh
    /// context is forked first and the captured response's cookies are
    /// carried onto the new request. Cookies set explicitly on the
    /// returned builder win over carried ones.
    pub fn request(&self, method: &str, uri: &str) -> TestRequestBuilder {
        let newest = self.newest();
        if newest.inner.captured.read().is_some() {
            return newest.subrequest(method, uri);
        }
        tracing::debug!(method, uri, "request built");
        *newest.inner.pending.write() = Some(ServerRequest::new(method, uri));
        TestRequestBuilder::new(newest.inner.pending.clone())
    }

    fn subrequest(&self, method: &str, uri: &str) -> TestRequestBuilder {
        let carried = self
            .inner
            .captured
            .read()
            .as_ref()
            .map(|response| response.cookies())
            .unwrap_or_default();
        let refork = self.inner.refork.read().clone();
        let Some(refork) = refork else {
            panic!("Cannot start a subrequest: no harness is attached to fork the app context.");
        };
        tracing::info!(method, uri, cookies = carried.len(), "forking app context");
        let next = refork();
        let builder = next.request(method, uri);
        for cookie in &carried {
            builder.cookie(&cookie.name, &cookie.value);
        }
        builder
    }

    /// Run the app and capture its response.
    ///
    /// Idempotent: later calls return the same capture. Without a built
    /// request the run handles `GET /`.
    pub fn response(&self) -> TestResponse {
        let newest = self.newest();
        if let Some(captured) = newest.inner.captured.read().clone() {
            return captured;
        }
        let app = &newest.inner.app;
        let response = must(app.run());
        let session = app.current_session().map(|session| session.snapshot());
        let router = app.router().ok();
        let captured = TestResponse::new(response, session, router);
        *newest.inner.captured.write() = Some(captured.clone());
        tracing::debug!(app = %app.id(), status = captured.status(), "response captured");
        captured
    }

    /// Follow `Location` redirects with `GET` subrequests until a
    /// non-redirect response arrives.
    ///
    /// A redirect loop does not terminate.
    pub fn follow_redirects(&self) -> TestResponse {
        let mut response = self.response();
        while response.is_redirect() {
            let location = response.location().unwrap_or_default().to_string();
            tracing::debug!(location = %location, "following redirect");
            self.request("GET", &location);
            response = self.response();
        }
        response
    }

    /// Remove middlewares by name for this and every later context.
    pub fn without_middleware(&self, names: &[&str]) -> &Self {
        let newest = self.newest();
        let mut removed = newest.inner.removed_middleware.write();
        for name in names {
            removed.push((*name).to_string());
        }
        self
    }

    /// Seed a session value every loaded session starts with.
    pub fn with_session(&self, key: impl Into<String>, value: Value) -> &Self {
        let newest = self.newest();
        let key = key.into();
        newest
            .inner
            .session_seeds
            .write()
            .push((key.clone(), value.clone()));
        must(newest.inner.app.session_store()).seed(key, value);
        self
    }

    /// Builder for fake uploaded files.
    pub fn file_factory(&self) -> FileFactory {
        self.newest().inner.files
    }
}

impl Faker for FakeHttp {
    fn kind(&self) -> FakerKind {
        FakerKind::Http
    }

    fn fork(&self, app: &Arc<App>) -> Arc<dyn Faker> {
        let newest = self.newest();
        let removed = newest.inner.removed_middleware.read().clone();
        let seeds = newest.inner.session_seeds.read().clone();
        let forked = FakeHttp::install_with(app, removed, seeds);
        *forked.inner.refork.write() = newest.inner.refork.read().clone();
        *newest.inner.delegate.write() = Some(forked.clone());
        Arc::new(forked)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
