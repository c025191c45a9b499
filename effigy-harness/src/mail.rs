//! Mail faker.
//!
//! Replaced mailers still render templates at send time, so rendering
//! failures surface in tests exactly as they would in production. Only
//! the transport is swallowed.

use crate::must;
use crate::recorder::{recorder_in, Recorder, RecorderMap};
use crate::registry::{Faker, FakerKind};
use effigy_core::mail::{Mailer, Mailers, Message, Renderer};
use effigy_core::{App, Result, FAKE_PRIORITY};
use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;

/// A mailer that renders and records messages instead of sending them.
pub struct TestMailer {
    name: String,
    renderer: Arc<Renderer>,
    recorder: Recorder<Message>,
}

impl TestMailer {
    fn new(name: impl Into<String>, renderer: Arc<Renderer>, recorder: Recorder<Message>) -> Self {
        Self {
            name: name.into(),
            renderer,
            recorder,
        }
    }
}

impl Mailer for TestMailer {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, message: Message) -> Result<()> {
        let message = self.renderer.render_message(message)?;
        tracing::debug!(mailer = %self.name, message = %message.name, "message recorded, never sent");
        self.recorder.record(message.name.clone(), message);
        Ok(())
    }
}

/// Replaces every configured mailer with a recording one.
#[derive(Clone)]
pub struct FakeMail {
    inner: Arc<FakeMailInner>,
}

struct FakeMailInner {
    app: Arc<App>,
    recorders: RecorderMap<Message>,
    delegate: RwLock<Option<FakeMail>>,
}

impl FakeMail {
    pub(crate) fn install(app: &Arc<App>) -> Self {
        let recorders: RecorderMap<Message> = Arc::default();
        let hook_recorders = recorders.clone();
        app.hooks().mailers.on_with_priority(
            move |mailers, _| {
                let renderer = mailers.renderer();
                let faked = Mailers::new(Arc::clone(&renderer));
                for name in mailers.names() {
                    let recorder = recorder_in(&hook_recorders, &name);
                    faked.add(Arc::new(TestMailer::new(
                        name,
                        Arc::clone(&renderer),
                        recorder,
                    )));
                }
                faked
            },
            FAKE_PRIORITY,
        );
        Self {
            inner: Arc::new(FakeMailInner {
                app: app.clone(),
                recorders,
                delegate: RwLock::new(None),
            }),
        }
    }

    fn newest(&self) -> FakeMail {
        let mut current = self.clone();
        loop {
            let next = current.inner.delegate.read().clone();
            match next {
                Some(delegate) => current = delegate,
                None => return current,
            }
        }
    }

    /// The resolved mailer collection.
    pub fn mailers(&self) -> Mailers {
        must(self.newest().inner.app.mailers())
    }

    /// Assertion surface for one named mailer.
    pub fn mailer(&self, name: &str) -> MailerDouble {
        let newest = self.newest();
        MailerDouble {
            recorder: recorder_in(&newest.inner.recorders, name),
        }
    }
}

impl Faker for FakeMail {
    fn kind(&self) -> FakerKind {
        FakerKind::Mail
    }

    fn fork(&self, app: &Arc<App>) -> Arc<dyn Faker> {
        let forked = FakeMail::install(app);
        *self.newest().inner.delegate.write() = Some(forked.clone());
        Arc::new(forked)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Asserts over the messages one mailer received.
pub struct MailerDouble {
    recorder: Recorder<Message>,
}

impl MailerDouble {
    /// Messages sent under a message name, in send order.
    pub fn messages(&self, message: &str) -> Vec<Message> {
        self.recorder.all(message)
    }

    /// Assert a message was sent and return its narrowing surface.
    #[track_caller]
    pub fn sent(&self, message: &str) -> SentMessage {
        let messages = self.recorder.all(message);
        if messages.is_empty() {
            panic!("The expected [{message}] message was not sent.");
        }
        SentMessage {
            name: message.to_string(),
            messages,
        }
    }
}

/// Sent messages under one name, narrowed assertion by assertion.
///
/// Every assertion keeps only the messages it matched, so a chain like
/// `sent("welcome").assert_from(..).assert_subject(..)` holds for one
/// and the same message, not for two different ones.
pub struct SentMessage {
    name: String,
    messages: Vec<Message>,
}

impl SentMessage {
    /// The messages still matching every assertion so far.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[track_caller]
    fn narrow<F>(mut self, predicate: F, failure: String) -> Self
    where
        F: Fn(&Message) -> bool,
    {
        self.messages.retain(|m| predicate(m));
        if self.messages.is_empty() {
            panic!("{failure}");
        }
        self
    }

    fn address_part(name: Option<&str>) -> String {
        name.map(|n| format!("{n} ")).unwrap_or_default()
    }

    #[track_caller]
    fn narrow_from(self, email: &str, display: Option<&str>) -> Self {
        let failure = format!(
            "The expected [{}] message was not sent from: {}<{}> address.",
            self.name,
            Self::address_part(display),
            email
        );
        let display = display.map(str::to_string);
        self.narrow(
            |m| {
                m.from
                    .as_ref()
                    .is_some_and(|a| a.email == email && a.name == display)
            },
            failure,
        )
    }

    /// Assert the sender address, without a display name.
    #[track_caller]
    pub fn assert_from(self, email: &str) -> Self {
        self.narrow_from(email, None)
    }

    /// Assert the sender address and display name.
    #[track_caller]
    pub fn assert_from_named(self, email: &str, name: &str) -> Self {
        self.narrow_from(email, Some(name))
    }

    #[track_caller]
    fn narrow_to(self, email: &str, display: Option<&str>) -> Self {
        let failure = format!(
            "The expected [{}] message was not sent to: {}<{}> address.",
            self.name,
            Self::address_part(display),
            email
        );
        let display = display.map(str::to_string);
        self.narrow(
            |m| m.to.iter().any(|a| a.email == email && a.name == display),
            failure,
        )
    }

    /// Assert a recipient address, without a display name.
    #[track_caller]
    pub fn assert_has_to(self, email: &str) -> Self {
        self.narrow_to(email, None)
    }

    /// Assert a recipient address and display name.
    #[track_caller]
    pub fn assert_has_to_named(self, email: &str, name: &str) -> Self {
        self.narrow_to(email, Some(name))
    }

    /// Assert a carbon-copy address.
    #[track_caller]
    pub fn assert_has_cc(self, email: &str) -> Self {
        let failure = format!(
            "The expected [{}] message has no Cc: <{email}> address.",
            self.name
        );
        self.narrow(
            |m| m.cc.iter().any(|a| a.email == email && a.name.is_none()),
            failure,
        )
    }

    /// Assert a blind-carbon-copy address.
    #[track_caller]
    pub fn assert_has_bcc(self, email: &str) -> Self {
        let failure = format!(
            "The expected [{}] message has no Bcc: <{email}> address.",
            self.name
        );
        self.narrow(
            |m| m.bcc.iter().any(|a| a.email == email && a.name.is_none()),
            failure,
        )
    }

    /// Assert the reply-to address.
    #[track_caller]
    pub fn assert_reply_to(self, email: &str) -> Self {
        let failure = format!(
            "The expected [{}] message has no replyTo: <{email}> address.",
            self.name
        );
        self.narrow(
            |m| {
                m.reply_to
                    .as_ref()
                    .is_some_and(|a| a.email == email && a.name.is_none())
            },
            failure,
        )
    }

    /// Assert the exact subject line.
    #[track_caller]
    pub fn assert_subject(self, subject: &str) -> Self {
        let failure = format!(
            "The expected [{}] message has no subject: {subject}",
            self.name
        );
        self.narrow(|m| m.subject.as_deref() == Some(subject), failure)
    }

    /// Assert the rendered text body contains a fragment.
    #[track_caller]
    pub fn assert_text_contains(self, text: &str) -> Self {
        let failure = format!(
            "The expected [{}] message text does not contain: {text}",
            self.name
        );
        self.narrow(
            |m| m.text.as_deref().is_some_and(|t| t.contains(text)),
            failure,
        )
    }

    /// Assert the rendered html body contains a fragment.
    #[track_caller]
    pub fn assert_html_contains(self, html: &str) -> Self {
        let failure = format!(
            "The expected [{}] message html does not contain: {html}",
            self.name
        );
        self.narrow(
            |m| m.html.as_deref().is_some_and(|h| h.contains(html)),
            failure,
        )
    }

    /// Assert the message carries a queue delivery parameter.
    #[track_caller]
    pub fn assert_is_queued(self) -> Self {
        let failure = format!("The expected [{}] message is not queued.", self.name);
        self.narrow(Message::is_queued, failure)
    }

    /// Assert how many messages match every assertion so far.
    #[track_caller]
    pub fn assert_times(self, times: usize) -> Self {
        let actual = self.messages.len();
        if actual != times {
            panic!(
                "The expected [{}] message was sent {actual} times instead of {times} times.",
                self.name
            );
        }
        self
    }
}
