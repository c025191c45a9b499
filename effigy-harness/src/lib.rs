//! Effigy Harness Library
//!
//! This crate provides the test harness for Effigy applications: one
//! faker per collaborator capability, simulated HTTP request flows with
//! redirect following, and a fixture that rebuilds app contexts between
//! requests.
//!
//! # Overview
//!
//! A faker registers transformers on the app's capability hooks so the
//! resolved collaborator is replaced by an observable double. Doubles
//! still do the real work (templates render, files land in a sandbox)
//! and record every mutating call for assertions. One app context
//! handles one request; the harness forks fresh contexts for follow-up
//! requests, carrying faker configuration and response cookies forward.
//!
//! # Key Components
//!
//! - **Harness**: the fixture; app factory, faker accessors, lifecycle
//! - **FakeHttp**: request building, response capture, subrequests
//! - **Fakers**: config, events, queue, mail, notifier, file storage,
//!   auth
//! - **Recorder**: append-only, kind-keyed call history
//!
//! # Example
//!
//! ```ignore
//! use effigy_core::prelude::*;
//! use effigy_harness::Harness;
//!
//! let harness = Harness::new(|root| {
//!     App::builder()
//!         .root(root)
//!         .routes(|r| {
//!             r.add(Route::get("/", |_| Ok(Reply::Text("home".into()))));
//!         })
//!         .build()
//! })?;
//!
//! let http = harness.fake_http();
//! http.request("GET", "/");
//! http.response().assert_status(200).assert_body_same("home");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod config;
pub mod events;
pub mod fixture;
pub mod http;
pub mod logging;
pub mod mail;
pub mod notifier;
pub mod queue;
pub mod recorder;
pub mod registry;
pub mod storage;

// Re-export key types at crate root for convenience
pub use auth::FakeAuth;
pub use config::FakeConfig;
pub use events::FakeEvents;
pub use fixture::Harness;
pub use http::{FakeHttp, FileFactory, TestRequestBuilder, TestResponse};
pub use mail::{FakeMail, MailerDouble, SentMessage};
pub use notifier::FakeNotifier;
pub use queue::{FakeQueue, QueueDouble};
pub use recorder::Recorder;
pub use registry::{Faker, FakerKind, FakerRegistry};
pub use storage::{FakeFileStorage, FileOp, StorageDouble};

/// Unwrap a kernel result inside harness paths, panicking with the
/// error's display text so the fault reaches the test runner.
#[track_caller]
pub(crate) fn must<T>(result: effigy_core::Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => panic!("{error}"),
    }
}
