//! The test fixture: app contexts, faker accessors and lifecycle steps.

use crate::auth::FakeAuth;
use crate::config::FakeConfig;
use crate::events::FakeEvents;
use crate::http::FakeHttp;
use crate::mail::FakeMail;
use crate::must;
use crate::notifier::FakeNotifier;
use crate::queue::FakeQueue;
use crate::registry::{Faker, FakerKind, FakerRegistry};
use crate::storage::FakeFileStorage;
use effigy_core::error::{IoResultExt, Result};
use effigy_core::App;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::{Arc, Weak};
use tempfile::TempDir;

type AppFactory = Box<dyn Fn(&Path) -> Result<App> + Send + Sync>;
type BootCallback = Arc<dyn Fn(&Arc<App>) + Send + Sync>;
type StepCallback = Arc<dyn Fn() + Send + Sync>;

struct BootStep {
    name: String,
    callback: BootCallback,
}

struct Step {
    name: String,
    callback: StepCallback,
}

#[derive(Clone)]
struct Context {
    app: Arc<App>,
    registry: Arc<FakerRegistry>,
}

/// Drives one test: builds app contexts from a factory over a scratch
/// directory, hands out one faker per capability and runs registered
/// lifecycle steps.
///
/// The app is built lazily on first access. When a faker needs a fresh
/// context (a subrequest), the harness builds a new app from the same
/// factory over the same scratch root and re-forks every faker onto it
/// in original registration order.
pub struct Harness {
    inner: Arc<HarnessInner>,
}

struct HarnessInner {
    factory: AppFactory,
    scratch: TempDir,
    context: RwLock<Option<Context>>,
    booting: RwLock<Vec<BootStep>>,
    setups: RwLock<Vec<Step>>,
    teardowns: RwLock<Vec<Step>>,
}

impl Harness {
    /// Create a harness around an app factory.
    ///
    /// The factory is called with the scratch root whenever a context is
    /// (re)built.
    pub fn new<F>(factory: F) -> Result<Self>
    where
        F: Fn(&Path) -> Result<App> + Send + Sync + 'static,
    {
        let scratch = tempfile::tempdir().io_at("harness scratch")?;
        Ok(Self {
            inner: Arc::new(HarnessInner {
                factory: Box::new(factory),
                scratch,
                context: RwLock::new(None),
                booting: RwLock::new(Vec::new()),
                setups: RwLock::new(Vec::new()),
                teardowns: RwLock::new(Vec::new()),
            }),
        })
    }

    /// The scratch root the app contexts are built over.
    pub fn root(&self) -> &Path {
        self.inner.scratch.path()
    }

    /// The current app context, built on first access.
    pub fn app(&self) -> Arc<App> {
        self.inner.context().app
    }

    /// Register a callback run on every newly built app, before anything
    /// resolves.
    pub fn booting<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn(&Arc<App>) + Send + Sync + 'static,
    {
        let name = name.into();
        if self.inner.context.read().is_some() {
            tracing::warn!(step = %name, "app already built, booting callback applies from the next context");
        }
        self.inner.booting.write().push(BootStep {
            name,
            callback: Arc::new(callback),
        });
    }

    /// Run the current app and return it.
    pub fn run_app(&self) -> Arc<App> {
        let app = self.app();
        must(app.run());
        app
    }

    /// Retire the current context and build a fresh one, re-forking every
    /// faker onto it.
    pub fn fork(&self) -> Arc<App> {
        self.inner.fork()
    }

    /// The configuration faker.
    pub fn fake_config(&self) -> FakeConfig {
        self.faker(FakerKind::Config, FakeConfig::install)
    }

    /// The HTTP faker.
    pub fn fake_http(&self) -> FakeHttp {
        let handle = Arc::downgrade(&self.inner);
        self.faker(FakerKind::Http, move |app| {
            let faker = FakeHttp::install(app);
            faker.attach_refork(Arc::new(move || refork_http(&handle)));
            faker
        })
    }

    /// The event faker.
    pub fn fake_events(&self) -> FakeEvents {
        self.faker(FakerKind::Events, FakeEvents::install)
    }

    /// The queue faker.
    pub fn fake_queue(&self) -> FakeQueue {
        self.faker(FakerKind::Queue, FakeQueue::install)
    }

    /// The mail faker.
    pub fn fake_mail(&self) -> FakeMail {
        self.faker(FakerKind::Mail, FakeMail::install)
    }

    /// The notifier faker.
    pub fn fake_notifier(&self) -> FakeNotifier {
        self.faker(FakerKind::Notifier, FakeNotifier::install)
    }

    /// The file storage faker.
    pub fn fake_file_storage(&self) -> FakeFileStorage {
        self.faker(FakerKind::FileStorage, FakeFileStorage::install)
    }

    /// The auth faker.
    pub fn fake_auth(&self) -> FakeAuth {
        self.faker(FakerKind::Auth, FakeAuth::install)
    }

    fn faker<T, F>(&self, kind: FakerKind, install: F) -> T
    where
        T: Faker + Clone + 'static,
        F: FnOnce(&Arc<App>) -> T,
    {
        let context = self.inner.context();
        if let Some(existing) = context.registry.get_as::<T>(kind) {
            return existing;
        }
        let faker = install(&context.app);
        context.registry.register(Arc::new(faker.clone()));
        faker
    }

    /// Register a named setup step, run by [`Harness::setup`] in
    /// registration order.
    pub fn on_setup<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.setups.write().push(Step {
            name: name.into(),
            callback: Arc::new(callback),
        });
    }

    /// Register a named teardown step, run in reverse registration order
    /// when the harness drops.
    pub fn on_teardown<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.teardowns.write().push(Step {
            name: name.into(),
            callback: Arc::new(callback),
        });
    }

    /// Build the app and run the registered setup steps in order.
    pub fn setup(&self) {
        self.inner.context();
        let steps: Vec<(String, StepCallback)> = self
            .inner
            .setups
            .read()
            .iter()
            .map(|step| (step.name.clone(), step.callback.clone()))
            .collect();
        for (name, callback) in steps {
            tracing::debug!(step = %name, "setup step");
            callback();
        }
    }
}

impl HarnessInner {
    fn context(&self) -> Context {
        if let Some(context) = self.context.read().clone() {
            return context;
        }
        let mut slot = self.context.write();
        if let Some(context) = slot.clone() {
            return context;
        }
        let context = Context {
            app: self.build_app(),
            registry: Arc::new(FakerRegistry::new()),
        };
        *slot = Some(context.clone());
        context
    }

    fn build_app(&self) -> Arc<App> {
        let app = Arc::new(must((self.factory)(self.scratch.path())));
        let steps: Vec<(String, BootCallback)> = self
            .booting
            .read()
            .iter()
            .map(|step| (step.name.clone(), step.callback.clone()))
            .collect();
        for (name, callback) in steps {
            tracing::debug!(step = %name, app = %app.id(), "booting step");
            callback(&app);
        }
        app
    }

    fn fork(&self) -> Arc<App> {
        let retired = self.context();
        let app = self.build_app();
        let registry = Arc::new(retired.registry.fork_all(&app));
        tracing::info!(
            from = %retired.app.id(),
            to = %app.id(),
            fakers = registry.len(),
            "context forked"
        );
        *self.context.write() = Some(Context {
            app: app.clone(),
            registry,
        });
        app
    }
}

impl Drop for HarnessInner {
    fn drop(&mut self) {
        let teardowns = std::mem::take(self.teardowns.get_mut());
        for step in teardowns.iter().rev() {
            tracing::debug!(step = %step.name, "teardown step");
            (step.callback)();
        }
    }
}

fn refork_http(handle: &Weak<HarnessInner>) -> FakeHttp {
    let Some(inner) = handle.upgrade() else {
        panic!("Cannot start a subrequest: the harness was dropped.");
    };
    inner.fork();
    let context = inner.context();
    match context.registry.get_as::<FakeHttp>(FakerKind::Http) {
        Some(faker) => faker,
        None => panic!("Cannot start a subrequest: the forked context lost its http faker."),
    }
}
