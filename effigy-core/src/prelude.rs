//! Prelude for convenient imports.
//!
//! This module re-exports the most commonly used types and traits.
//!
//! # Example
//!
//! ```ignore
//! use effigy_core::prelude::*;
//! ```

// Kernel
pub use crate::app::{App, AppBuilder, Dirs, RunCx};

// Error handling
pub use crate::error::{CoreError, IoResultExt, Result};

// Capability hooks
pub use crate::hooks::{Capability, Hooks, TransformerChain, DEFAULT_PRIORITY, FAKE_PRIORITY};

// Http
pub use crate::http::cookie::Cookie;
pub use crate::http::emitter::{ResponseEmitter, SharedEmitter, WriterEmitter};
pub use crate::http::middleware::{Middleware, MiddlewareStack};
pub use crate::http::request::{Body, ServerRequest, UploadedFile};
pub use crate::http::response::Response;
pub use crate::http::router::{Guard, Handler, Reply, Route, Router};
pub use crate::http::session::{SessionData, SessionHandle, SessionStore};

// Config
pub use crate::config::{ConfigMap, ConfigOverlay};

// Events
pub use crate::events::{Event, EventDispatcher, Events, Listener, SharedDispatcher};

// Queue
pub use crate::queue::{Job, MemoryQueue, Queue, Queues};

// Mail
pub use crate::mail::{Address, Mailer, Mailers, Message, NullMailer, Renderer};

// Notifier
pub use crate::notifier::{
    Channel, ChannelMessage, Channels, Notification, Notifier, Recipient, SentNotification,
};

// File storage
pub use crate::storage::{LocalStorage, Storage, Storages, Visibility};

// Auth
pub use crate::auth::{
    Auth, Authenticated, SharedTokenStorage, Token, TokenStorage, User, AUTH_TOKEN_HEADER,
};
