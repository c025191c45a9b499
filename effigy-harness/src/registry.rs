//! Faker registration and per-context forking.

use effigy_core::App;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// The capabilities a faker can stand in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakerKind {
    /// Configuration overlay.
    Config,
    /// Request building, response capture and subrequests.
    Http,
    /// Event dispatch recording.
    Events,
    /// Queue push recording.
    Queue,
    /// Mail send recording.
    Mail,
    /// Notification send recording.
    Notifier,
    /// Sandboxed file storages.
    FileStorage,
    /// Authentication state.
    Auth,
}

impl FakerKind {
    /// Stable string form used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Http => "http",
            Self::Events => "events",
            Self::Queue => "queue",
            Self::Mail => "mail",
            Self::Notifier => "notifier",
            Self::FileStorage => "file-storage",
            Self::Auth => "auth",
        }
    }
}

impl fmt::Display for FakerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A test double standing in for one capability.
///
/// A faker registers its transformers against the app it is installed
/// on. When the harness moves to a fresh app context, every faker is
/// forked: the fork re-installs against the new context and carries the
/// faker's configured state, never its recorded history. The original
/// keeps answering, delegating to its fork.
pub trait Faker: Send + Sync {
    /// Which capability this faker intercepts.
    fn kind(&self) -> FakerKind;

    /// Re-install against a fresh app context.
    fn fork(&self, app: &Arc<App>) -> Arc<dyn Faker>;

    /// Downcasting support for typed retrieval.
    fn as_any(&self) -> &dyn Any;
}

/// The fakers installed on one app context, in installation order.
#[derive(Default)]
pub struct FakerRegistry {
    entries: RwLock<Vec<Arc<dyn Faker>>>,
}

impl FakerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a faker. One faker per kind; the first stays.
    pub fn register(&self, faker: Arc<dyn Faker>) {
        let mut entries = self.entries.write();
        if entries.iter().any(|f| f.kind() == faker.kind()) {
            tracing::warn!(kind = %faker.kind(), "faker already registered, keeping the first");
            return;
        }
        tracing::debug!(kind = %faker.kind(), "faker registered");
        entries.push(faker);
    }

    /// The faker registered for a kind, if any.
    pub fn get(&self, kind: FakerKind) -> Option<Arc<dyn Faker>> {
        self.entries
            .read()
            .iter()
            .find(|f| f.kind() == kind)
            .cloned()
    }

    /// The faker for a kind, downcast to its concrete type.
    pub fn get_as<T: Clone + 'static>(&self, kind: FakerKind) -> Option<T> {
        self.get(kind)
            .and_then(|f| f.as_any().downcast_ref::<T>().cloned())
    }

    /// Fork every faker onto a fresh app context, keeping order.
    pub fn fork_all(&self, app: &Arc<App>) -> FakerRegistry {
        let forked = FakerRegistry::new();
        for faker in self.entries.read().iter() {
            forked.entries.write().push(faker.fork(app));
        }
        forked
    }

    /// Kinds in installation order.
    pub fn kinds(&self) -> Vec<FakerKind> {
        self.entries.read().iter().map(|f| f.kind()).collect()
    }

    /// Number of registered fakers.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check whether no fakers are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Dummy {
        kind: FakerKind,
    }

    impl Faker for Dummy {
        fn kind(&self) -> FakerKind {
            self.kind
        }

        fn fork(&self, _app: &Arc<App>) -> Arc<dyn Faker> {
            Arc::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn one_faker_per_kind() {
        let registry = FakerRegistry::new();
        registry.register(Arc::new(Dummy {
            kind: FakerKind::Queue,
        }));
        registry.register(Arc::new(Dummy {
            kind: FakerKind::Queue,
        }));

        assert_eq!(registry.len(), 1);
        assert!(registry.get(FakerKind::Queue).is_some());
        assert!(registry.get(FakerKind::Mail).is_none());
    }

    #[test]
    fn fork_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let app = Arc::new(App::builder().root(dir.path()).build().unwrap());

        let registry = FakerRegistry::new();
        registry.register(Arc::new(Dummy {
            kind: FakerKind::Events,
        }));
        registry.register(Arc::new(Dummy {
            kind: FakerKind::Queue,
        }));

        let forked = registry.fork_all(&app);
        assert_eq!(forked.kinds(), vec![FakerKind::Events, FakerKind::Queue]);
    }

    #[test]
    fn typed_retrieval() {
        let registry = FakerRegistry::new();
        registry.register(Arc::new(Dummy {
            kind: FakerKind::Auth,
        }));

        let dummy: Dummy = registry.get_as(FakerKind::Auth).unwrap();
        assert_eq!(dummy.kind, FakerKind::Auth);
    }
}
