//! Effigy Core Library
//!
//! This crate provides the application kernel for the Effigy framework:
//! directories, configuration, the capability hook registry, and the
//! synchronous HTTP runtime with its collaborator services.
//!
//! # Overview
//!
//! Every service an app uses resolves through an explicit, prioritized
//! chain of transformer functions registered against its capability.
//! Services are memoized after their first resolution, so a transformer
//! registered early sees the fully-configured value exactly once.
//!
//! # Key Components
//!
//! - **Hooks**: one transformer chain per capability, priority-ordered
//! - **App**: boot and run lifecycle over the resolved services
//! - **Http**: requests, responses, sessions, routing, middleware
//! - **Services**: config, events, queues, mail, notifier, file storage,
//!   token auth
//!
//! # Example
//!
//! ```ignore
//! use effigy_core::prelude::*;
//! use std::sync::Arc;
//!
//! let app = Arc::new(
//!     App::builder()
//!         .root("/tmp/demo")
//!         .routes(|r| {
//!             r.add(Route::get("/", |_| Ok(Reply::Text("home".into()))));
//!         })
//!         .build()?,
//! );
//!
//! app.hooks().server_request.on(|_, _| ServerRequest::new("GET", "/"));
//! let response = app.run()?;
//! assert_eq!(response.status(), 200);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod hooks;
pub mod http;
pub mod mail;
pub mod notifier;
pub mod prelude;
pub mod queue;
pub mod storage;

// Re-export key types at crate root for convenience
pub use app::{App, AppBuilder, RunCx};
pub use error::{CoreError, Result};
pub use hooks::{Capability, Hooks, TransformerChain, DEFAULT_PRIORITY, FAKE_PRIORITY};
pub use http::request::ServerRequest;
pub use http::response::Response;
pub use http::router::{Guard, Reply, Route, Router};
