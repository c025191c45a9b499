//! Notification faker.
//!
//! Channels still build their per-recipient messages, so undefined
//! message and undefined address faults propagate under test. Delivery
//! is observed through the channel collection, never performed.

use crate::must;
use crate::recorder::Recorder;
use crate::registry::{Faker, FakerKind};
use effigy_core::notifier::{Channels, SentNotification};
use effigy_core::{App, FAKE_PRIORITY};
use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;

/// Records every delivered notification per recipient.
#[derive(Clone)]
pub struct FakeNotifier {
    inner: Arc<FakeNotifierInner>,
}

struct FakeNotifierInner {
    app: Arc<App>,
    recorder: Recorder<SentNotification>,
    delegate: RwLock<Option<FakeNotifier>>,
}

impl FakeNotifier {
    pub(crate) fn install(app: &Arc<App>) -> Self {
        let recorder = Recorder::new();
        let hook_recorder = recorder.clone();
        app.hooks().channels.on_with_priority(
            move |channels, _| {
                let sink = hook_recorder.clone();
                channels.with_observer(Arc::new(move |sent: &SentNotification| {
                    tracing::debug!(
                        notification = %sent.notification.name,
                        recipient = %sent.recipient.identity(),
                        "notification recorded"
                    );
                    sink.record(sent.notification.name.clone(), sent.clone());
                }))
            },
            FAKE_PRIORITY,
        );
        Self {
            inner: Arc::new(FakeNotifierInner {
                app: app.clone(),
                recorder,
                delegate: RwLock::new(None),
            }),
        }
    }

    fn newest(&self) -> FakeNotifier {
        let mut current = self.clone();
        loop {
            let next = current.inner.delegate.read().clone();
            match next {
                Some(delegate) => current = delegate,
                None => return current,
            }
        }
    }

    /// The resolved channel collection.
    pub fn channels(&self) -> Channels {
        must(self.newest().inner.app.channels())
    }

    /// Deliveries recorded under a notification name, one per recipient.
    pub fn sent(&self, notification: &str) -> Vec<SentNotification> {
        self.newest().inner.recorder.all(notification)
    }

    /// Assert a notification was sent.
    #[track_caller]
    pub fn assert_sent(&self, notification: &str) -> &Self {
        if self.newest().inner.recorder.count(notification) == 0 {
            panic!("The expected notification [{notification}] was not sent.");
        }
        self
    }

    /// Assert a delivery matching a predicate happened.
    #[track_caller]
    pub fn assert_sent_where<F>(&self, notification: &str, predicate: F) -> &Self
    where
        F: Fn(&SentNotification) -> bool,
    {
        if !self.newest().inner.recorder.has(notification, predicate) {
            panic!("The expected notification [{notification}] was not sent.");
        }
        self
    }

    /// Assert a notification was not sent.
    #[track_caller]
    pub fn assert_not_sent(&self, notification: &str) -> &Self {
        if self.newest().inner.recorder.count(notification) > 0 {
            panic!("The unexpected notification [{notification}] was sent.");
        }
        self
    }

    /// Assert no delivery matching a predicate happened.
    #[track_caller]
    pub fn assert_not_sent_where<F>(&self, notification: &str, predicate: F) -> &Self
    where
        F: Fn(&SentNotification) -> bool,
    {
        if self.newest().inner.recorder.has(notification, predicate) {
            panic!("The unexpected notification [{notification}] was sent.");
        }
        self
    }

    /// Assert nothing at all was sent.
    #[track_caller]
    pub fn assert_nothing_sent(&self) -> &Self {
        let recorder = &self.newest().inner.recorder;
        if !recorder.is_empty() {
            let names = recorder.kinds().join(", ");
            panic!("The following notifications were sent unexpectedly: {names}");
        }
        self
    }

    /// Assert a notification was sent exactly `times` times, counting one
    /// per recipient.
    #[track_caller]
    pub fn assert_sent_times(&self, notification: &str, times: usize) -> &Self {
        let actual = self.newest().inner.recorder.count(notification);
        if actual != times {
            panic!(
                "The expected notification [{notification}] was sent {actual} times instead of {times} times."
            );
        }
        self
    }
}

impl Faker for FakeNotifier {
    fn kind(&self) -> FakerKind {
        FakerKind::Notifier
    }

    fn fork(&self, app: &Arc<App>) -> Arc<dyn Faker> {
        let forked = FakeNotifier::install(app);
        *self.newest().inner.delegate.write() = Some(forked.clone());
        Arc::new(forked)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use effigy_core::notifier::{ChannelMessage, Notification, Notifier, Recipient};

    fn test_app() -> Arc<App> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(App::builder().root(dir.path()).build().unwrap())
    }

    fn shipped() -> Notification {
        Notification::new("order_shipped")
            .subject("Your order shipped")
            .channels(["mail"])
    }

    #[test]
    fn deliveries_are_recorded_per_recipient() {
        let app = test_app();
        let fake = FakeNotifier::install(&app);

        let notifier = Notifier::new(app.channels().unwrap());
        let recipients = [
            Recipient::new().email("tom@example.com"),
            Recipient::new().email("ana@example.com"),
        ];
        notifier.send(&shipped(), &recipients).unwrap();

        fake.assert_sent("order_shipped")
            .assert_sent_times("order_shipped", 2)
            .assert_sent_where("order_shipped", |sent| {
                sent.recipient.email.as_deref() == Some("ana@example.com")
            })
            .assert_not_sent("order_cancelled");

        let deliveries = fake.sent("order_shipped");
        assert!(matches!(
            deliveries[0].message("mail"),
            Some(ChannelMessage::Mail(_))
        ));
    }

    #[test]
    fn address_fault_still_propagates() {
        let app = test_app();
        let fake = FakeNotifier::install(&app);

        let notifier = Notifier::new(app.channels().unwrap());
        let err = notifier
            .send(&shipped(), &[Recipient::new().phone("555-0100")])
            .unwrap_err();

        assert_eq!(err.code(), "E103");
        fake.assert_nothing_sent();
    }

    #[test]
    #[should_panic(expected = "The expected notification [order_shipped] was not sent.")]
    fn missing_notification_fails() {
        let app = test_app();
        FakeNotifier::install(&app).assert_sent("order_shipped");
    }

    #[test]
    #[should_panic(expected = "The following notifications were sent unexpectedly: order_shipped")]
    fn unexpected_notification_fails_with_names() {
        let app = test_app();
        let fake = FakeNotifier::install(&app);

        Notifier::new(app.channels().unwrap())
            .send(&shipped(), &[Recipient::new().email("tom@example.com")])
            .unwrap();

        fake.assert_nothing_sent();
    }
}
