//! Capability hook registry.
//!
//! Every service the application resolves flows through an explicit,
//! prioritized chain of transformer functions registered against its
//! capability. Transformers wrap or replace the value; nothing here uses
//! reflection or patching. Test doubles register at [`FAKE_PRIORITY`] so
//! they always see the fully-configured value and have the final word.

use crate::app::App;
use crate::auth::SharedTokenStorage;
use crate::config::ConfigMap;
use crate::events::SharedDispatcher;
use crate::http::emitter::SharedEmitter;
use crate::http::middleware::MiddlewareStack;
use crate::http::request::ServerRequest;
use crate::http::router::Router;
use crate::http::session::SessionStore;
use crate::mail::Mailers;
use crate::notifier::Channels;
use crate::queue::Queues;
use crate::storage::Storages;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Priority assigned when none is given.
pub const DEFAULT_PRIORITY: i32 = 1000;

/// Priority used by test doubles. Most-negative registrations evaluate
/// last, so a transformer at this priority wins as the final value.
pub const FAKE_PRIORITY: i32 = -1500;

/// The closed set of interception targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The configuration map.
    Config,
    /// The route table.
    Router,
    /// The incoming server request.
    ServerRequest,
    /// The response emitter.
    ResponseEmitter,
    /// The session store.
    Session,
    /// The middleware stack.
    Middleware,
    /// The named mailers.
    Mailers,
    /// The named queues.
    Queues,
    /// The event dispatcher.
    Events,
    /// The notifier channels.
    Channels,
    /// The named file storages.
    Storages,
    /// The auth token storage.
    TokenStorage,
}

impl Capability {
    /// Stable string form used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Router => "router",
            Self::ServerRequest => "server-request",
            Self::ResponseEmitter => "response-emitter",
            Self::Session => "session",
            Self::Middleware => "middleware",
            Self::Mailers => "mailers",
            Self::Queues => "queues",
            Self::Events => "events",
            Self::Channels => "channels",
            Self::Storages => "storages",
            Self::TokenStorage => "token-storage",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transformer registered against a capability.
pub type Transformer<T> = Box<dyn Fn(T, &App) -> T + Send + Sync>;

struct ChainEntry<T> {
    priority: i32,
    seq: u64,
    func: Transformer<T>,
}

/// An ordered list of transformers for one capability.
///
/// Entries are kept in evaluation order: priority descending, then
/// registration order. [`FAKE_PRIORITY`] entries therefore run last.
///
/// Transformers must be pure with respect to registration: they must not
/// register further hooks or resolve their own capability while a chain is
/// being folded.
pub struct TransformerChain<T> {
    capability: Capability,
    entries: RwLock<Vec<ChainEntry<T>>>,
    next_seq: AtomicU64,
}

impl<T> TransformerChain<T> {
    /// Create an empty chain for a capability.
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            entries: RwLock::new(Vec::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register a transformer at [`DEFAULT_PRIORITY`].
    pub fn on<F>(&self, func: F)
    where
        F: Fn(T, &App) -> T + Send + Sync + 'static,
    {
        self.on_with_priority(func, DEFAULT_PRIORITY);
    }

    /// Register a transformer at an explicit priority.
    pub fn on_with_priority<F>(&self, func: F, priority: i32)
    where
        F: Fn(T, &App) -> T + Send + Sync + 'static,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(
            capability = self.capability.as_str(),
            priority,
            seq,
            "hook registered"
        );
        let entry = ChainEntry {
            priority,
            seq,
            func: Box::new(func),
        };
        let mut entries = self.entries.write();
        let at = entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(entries.len());
        entries.insert(at, entry);
    }

    /// Fold a value through the chain in evaluation order.
    pub fn resolve(&self, initial: T, app: &App) -> T {
        let entries = self.entries.read();
        tracing::trace!(
            capability = self.capability.as_str(),
            transformers = entries.len(),
            "resolving capability"
        );
        entries
            .iter()
            .fold(initial, |value, entry| (entry.func)(value, app))
    }

    /// Number of registered transformers.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check whether the chain has no transformers.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// One transformer chain per capability.
pub struct Hooks {
    /// Chain for the configuration map.
    pub config: TransformerChain<ConfigMap>,
    /// Chain for the route table.
    pub router: TransformerChain<Router>,
    /// Chain for the incoming server request.
    pub server_request: TransformerChain<ServerRequest>,
    /// Chain for the response emitter.
    pub response_emitter: TransformerChain<SharedEmitter>,
    /// Chain for the session store.
    pub session: TransformerChain<SessionStore>,
    /// Chain for the middleware stack.
    pub middleware: TransformerChain<MiddlewareStack>,
    /// Chain for the named mailers.
    pub mailers: TransformerChain<Mailers>,
    /// Chain for the named queues.
    pub queues: TransformerChain<Queues>,
    /// Chain for the event dispatcher.
    pub events: TransformerChain<SharedDispatcher>,
    /// Chain for the notifier channels.
    pub channels: TransformerChain<Channels>,
    /// Chain for the named file storages.
    pub storages: TransformerChain<Storages>,
    /// Chain for the auth token storage.
    pub token_storage: TransformerChain<SharedTokenStorage>,
}

impl Hooks {
    /// Create a registry with empty chains for every capability.
    pub fn new() -> Self {
        Self {
            config: TransformerChain::new(Capability::Config),
            router: TransformerChain::new(Capability::Router),
            server_request: TransformerChain::new(Capability::ServerRequest),
            response_emitter: TransformerChain::new(Capability::ResponseEmitter),
            session: TransformerChain::new(Capability::Session),
            middleware: TransformerChain::new(Capability::Middleware),
            mailers: TransformerChain::new(Capability::Mailers),
            queues: TransformerChain::new(Capability::Queues),
            events: TransformerChain::new(Capability::Events),
            channels: TransformerChain::new(Capability::Channels),
            storages: TransformerChain::new(Capability::Storages),
            token_storage: TransformerChain::new(Capability::TokenStorage),
        }
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;

    fn test_app() -> App {
        let dir = tempfile::tempdir().unwrap();
        App::builder().root(dir.path()).build().unwrap()
    }

    #[test]
    fn default_priority_runs_in_registration_order() {
        let app = test_app();
        let chain: TransformerChain<String> = TransformerChain::new(Capability::Config);

        chain.on(|value, _| format!("{value}a"));
        chain.on(|value, _| format!("{value}b"));

        assert_eq!(chain.resolve(String::new(), &app), "ab");
    }

    #[test]
    fn most_negative_priority_evaluates_last() {
        let app = test_app();
        let chain: TransformerChain<Vec<&'static str>> = TransformerChain::new(Capability::Events);

        chain.on_with_priority(
            |mut value, _| {
                value.push("fake");
                value
            },
            FAKE_PRIORITY,
        );
        chain.on(|mut value, _| {
            value.push("normal");
            value
        });
        chain.on_with_priority(
            |mut value, _| {
                value.push("early");
                value
            },
            2000,
        );

        assert_eq!(
            chain.resolve(Vec::new(), &app),
            vec!["early", "normal", "fake"]
        );
    }

    #[test]
    fn replacement_discards_previous_value() {
        let app = test_app();
        let chain: TransformerChain<u32> = TransformerChain::new(Capability::Queues);

        chain.on(|value, _| value + 1);
        chain.on_with_priority(|_, _| 99, FAKE_PRIORITY);

        assert_eq!(chain.resolve(0, &app), 99);
    }

    #[test]
    fn capability_labels() {
        assert_eq!(Capability::ServerRequest.as_str(), "server-request");
        assert_eq!(Capability::TokenStorage.to_string(), "token-storage");
    }
}
