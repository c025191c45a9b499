//! Event dispatch faker.

use crate::must;
use crate::recorder::Recorder;
use crate::registry::{Faker, FakerKind};
use effigy_core::events::{Event, EventDispatcher, Listener, SharedDispatcher};
use effigy_core::{App, FAKE_PRIORITY};
use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;

/// Records dispatched events without invoking their listeners.
pub struct TestDispatcher {
    recorder: Recorder<Event>,
    listeners: RwLock<Vec<Listener>>,
}

impl TestDispatcher {
    fn new(recorder: Recorder<Event>) -> Self {
        Self {
            recorder,
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl EventDispatcher for TestDispatcher {
    fn dispatch(&self, event: Event) -> Event {
        tracing::debug!(event = %event.name, "event recorded, listeners suppressed");
        self.recorder.record(event.name.clone(), event.clone());
        event
    }

    fn listen(&self, listener: Listener) {
        self.listeners.write().push(listener);
    }

    fn listeners_for(&self, event: &str) -> Vec<String> {
        self.listeners
            .read()
            .iter()
            .filter(|l| l.event() == event)
            .map(|l| l.name().to_string())
            .collect()
    }
}

/// Replaces the event dispatcher and asserts over what was dispatched.
#[derive(Clone)]
pub struct FakeEvents {
    inner: Arc<FakeEventsInner>,
}

struct FakeEventsInner {
    app: Arc<App>,
    recorder: Recorder<Event>,
    delegate: RwLock<Option<FakeEvents>>,
}

impl FakeEvents {
    pub(crate) fn install(app: &Arc<App>) -> Self {
        let recorder = Recorder::new();
        let hook_recorder = recorder.clone();
        app.hooks().events.on_with_priority(
            move |_, _| Arc::new(TestDispatcher::new(hook_recorder.clone())) as SharedDispatcher,
            FAKE_PRIORITY,
        );
        Self {
            inner: Arc::new(FakeEventsInner {
                app: app.clone(),
                recorder,
                delegate: RwLock::new(None),
            }),
        }
    }

    fn newest(&self) -> FakeEvents {
        let mut current = self.clone();
        loop {
            let next = current.inner.delegate.read().clone();
            match next {
                Some(delegate) => current = delegate,
                None => return current,
            }
        }
    }

    /// Events dispatched under a name, in dispatch order.
    pub fn dispatched(&self, name: &str) -> Vec<Event> {
        self.newest().inner.recorder.all(name)
    }

    /// Assert an event was dispatched.
    #[track_caller]
    pub fn assert_dispatched(&self, name: &str) -> &Self {
        if self.newest().inner.recorder.count(name) == 0 {
            panic!("The expected [{name}] event was not dispatched.");
        }
        self
    }

    /// Assert an event matching a predicate was dispatched.
    #[track_caller]
    pub fn assert_dispatched_where<F>(&self, name: &str, predicate: F) -> &Self
    where
        F: Fn(&Event) -> bool,
    {
        if !self.newest().inner.recorder.has(name, predicate) {
            panic!("The expected [{name}] event was not dispatched.");
        }
        self
    }

    /// Assert an event was dispatched exactly `times` times.
    #[track_caller]
    pub fn assert_dispatched_times(&self, name: &str, times: usize) -> &Self {
        let actual = self.newest().inner.recorder.count(name);
        if actual != times {
            panic!(
                "The expected [{name}] event was dispatched {actual} times instead of {times} times."
            );
        }
        self
    }

    /// Assert an event was not dispatched.
    #[track_caller]
    pub fn assert_not_dispatched(&self, name: &str) -> &Self {
        if self.newest().inner.recorder.count(name) > 0 {
            panic!("The unexpected [{name}] event was dispatched.");
        }
        self
    }

    /// Assert no event matching a predicate was dispatched.
    #[track_caller]
    pub fn assert_not_dispatched_where<F>(&self, name: &str, predicate: F) -> &Self
    where
        F: Fn(&Event) -> bool,
    {
        if self.newest().inner.recorder.has(name, predicate) {
            panic!("The unexpected [{name}] event was dispatched.");
        }
        self
    }

    /// Assert nothing at all was dispatched.
    #[track_caller]
    pub fn assert_nothing_dispatched(&self) -> &Self {
        let count = self.newest().inner.recorder.count_all();
        if count > 0 {
            panic!("{count} unexpected events were dispatched.");
        }
        self
    }

    /// Assert a listener is attached to an event.
    #[track_caller]
    pub fn assert_listening(&self, event: &str, listener: &str) -> &Self {
        let attached = must(self.newest().inner.app.events()).listeners_for(event);
        if !attached.iter().any(|name| name == listener) {
            panic!("Event [{event}] does not have the [{listener}] listener attached to it.");
        }
        self
    }
}

impl Faker for FakeEvents {
    fn kind(&self) -> FakerKind {
        FakerKind::Events
    }

    fn fork(&self, app: &Arc<App>) -> Arc<dyn Faker> {
        let forked = FakeEvents::install(app);
        *self.newest().inner.delegate.write() = Some(forked.clone());
        Arc::new(forked)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
