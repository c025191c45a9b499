//! Notifications, recipients, and delivery channels.
//!
//! Channels are resolved by name; the builder matches on the name prefix
//! (`mail*`, `sms*`, `storage*`) so several channels of one kind can
//! coexist. A notification must provide content for every channel it
//! targets and the recipient must have an address for it; otherwise the
//! undefined-message / undefined-address faults propagate to the caller.

use crate::config::ConfigMap;
use crate::error::{CoreError, Result};
use crate::mail::Message;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Channel names used when `notifier.channels` is not configured.
pub const DEFAULT_CHANNELS: &[&str] = &["mail", "sms", "storage"];

/// Someone a notification can be delivered to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipient {
    /// Address for `mail*` channels.
    pub email: Option<String>,
    /// Address for `sms*` channels.
    pub phone: Option<String>,
    /// Identity for `storage*` channels.
    pub id: Option<i64>,
    /// Recipient type recorded by storage channels.
    pub kind: String,
}

impl Recipient {
    /// Create a recipient with no addresses.
    pub fn new() -> Self {
        Self {
            email: None,
            phone: None,
            id: None,
            kind: "user".to_string(),
        }
    }

    /// Set the mail address.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the sms address.
    #[must_use]
    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Set the storage identity.
    #[must_use]
    pub fn id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the recipient type.
    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Identity used in fault messages.
    #[must_use]
    pub fn identity(&self) -> String {
        if let Some(id) = self.id {
            return format!("{}:{}", self.kind, id);
        }
        if let Some(email) = &self.email {
            return email.clone();
        }
        if let Some(phone) = &self.phone {
            return phone.clone();
        }
        "anonymous".to_string()
    }
}

impl Default for Recipient {
    fn default() -> Self {
        Self::new()
    }
}

/// A notification with per-channel content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    /// Notification identity, e.g. `order_shipped`.
    pub name: String,
    /// Subject usable by every channel kind.
    pub subject: Option<String>,
    /// Body usable by every channel kind.
    pub content: Option<String>,
    /// Channel names this notification targets.
    pub channels: Vec<String>,
    /// Explicit mail message overriding the generic content.
    pub mail: Option<Message>,
    /// Explicit sms text overriding the generic content.
    pub sms: Option<String>,
    /// Explicit storage data overriding the generic content.
    pub storage_data: Option<Value>,
}

impl Notification {
    /// Create a notification with no content and no channels.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject: None,
            content: None,
            channels: Vec::new(),
            mail: None,
            sms: None,
            storage_data: None,
        }
    }

    /// Set the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the generic body.
    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Target the given channels.
    #[must_use]
    pub fn channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Provide an explicit mail message.
    #[must_use]
    pub fn mail(mut self, message: Message) -> Self {
        self.mail = Some(message);
        self
    }

    /// Provide explicit sms text.
    #[must_use]
    pub fn sms(mut self, text: impl Into<String>) -> Self {
        self.sms = Some(text.into());
        self
    }

    /// Provide explicit storage data.
    #[must_use]
    pub fn storage(mut self, data: Value) -> Self {
        self.storage_data = Some(data);
        self
    }
}

/// A message built for an sms channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmsMessage {
    /// Recipient phone number.
    pub to: String,
    /// Message text.
    pub text: String,
}

/// A record built for a storage channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageRecord {
    /// The notification name.
    pub name: String,
    /// The recipient identity.
    pub recipient_id: i64,
    /// The recipient type.
    pub recipient_type: String,
    /// The stored data.
    pub data: Value,
    /// When the record was built.
    pub created_at: DateTime<Utc>,
}

/// The message a channel produced for one recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    /// Built by a `mail*` channel.
    Mail(Message),
    /// Built by an `sms*` channel.
    Sms(SmsMessage),
    /// Built by a `storage*` channel.
    Storage(StorageRecord),
}

/// Build the message a channel would deliver.
///
/// This is the real work every channel implementation shares; doubles call
/// it too so content and address faults behave identically under test.
pub fn build_channel_message(
    channel: &str,
    notification: &Notification,
    recipient: &Recipient,
) -> Result<ChannelMessage> {
    let undefined_message = || CoreError::UndefinedMessage {
        channel: channel.to_string(),
        notification: notification.name.clone(),
        recipient: recipient.identity(),
    };
    let undefined_address = || CoreError::UndefinedAddress {
        channel: channel.to_string(),
        notification: notification.name.clone(),
        recipient: recipient.identity(),
    };

    if channel.starts_with("mail") {
        let email = recipient.email.clone().ok_or_else(undefined_address)?;
        let mut message = match &notification.mail {
            Some(message) => message.clone(),
            None => {
                let subject = notification.subject.clone().ok_or_else(undefined_message)?;
                let mut message = Message::new(&notification.name).subject(subject);
                if let Some(content) = &notification.content {
                    message = message.text(content.clone());
                }
                message
            }
        };
        if message.to.is_empty() {
            message = message.to(email);
        }
        return Ok(ChannelMessage::Mail(message));
    }

    if channel.starts_with("sms") {
        let phone = recipient.phone.clone().ok_or_else(undefined_address)?;
        let text = notification
            .sms
            .clone()
            .or_else(|| notification.subject.clone())
            .ok_or_else(undefined_message)?;
        return Ok(ChannelMessage::Sms(SmsMessage { to: phone, text }));
    }

    if channel.starts_with("storage") {
        let id = recipient.id.ok_or_else(undefined_address)?;
        let data = notification.storage_data.clone().unwrap_or_else(|| {
            json!({
                "name": notification.name,
                "subject": notification.subject,
                "content": notification.content,
            })
        });
        return Ok(ChannelMessage::Storage(StorageRecord {
            name: notification.name.clone(),
            recipient_id: id,
            recipient_type: recipient.kind.clone(),
            data,
            created_at: Utc::now(),
        }));
    }

    Err(CoreError::UnknownChannel {
        name: channel.to_string(),
    })
}

/// A named delivery channel.
pub trait Channel: Send + Sync {
    /// The channel name.
    fn name(&self) -> &str;

    /// Build and deliver the message for one recipient, returning what was
    /// built.
    fn send(&self, notification: &Notification, recipient: &Recipient) -> Result<ChannelMessage>;
}

/// A channel that builds its message and delivers nowhere.
pub struct NullChannel {
    name: String,
}

impl NullChannel {
    /// Create a discarding channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Channel for NullChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, notification: &Notification, recipient: &Recipient) -> Result<ChannelMessage> {
        let message = build_channel_message(&self.name, notification, recipient)?;
        tracing::info!(
            channel = %self.name,
            notification = %notification.name,
            "notification discarded"
        );
        Ok(message)
    }
}

/// One notification delivered to one recipient, with the per-channel
/// messages that were built.
#[derive(Debug, Clone)]
pub struct SentNotification {
    /// The notification that was sent.
    pub notification: Notification,
    /// The recipient it was sent to.
    pub recipient: Recipient,
    /// Messages built per channel, in channel order.
    pub messages: Vec<(String, ChannelMessage)>,
}

impl SentNotification {
    /// The message built by a channel, if that channel was targeted.
    pub fn message(&self, channel: &str) -> Option<&ChannelMessage> {
        self.messages
            .iter()
            .find(|(name, _)| name == channel)
            .map(|(_, message)| message)
    }

    /// Names of the channels that built a message.
    pub fn channel_names(&self) -> Vec<String> {
        self.messages.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Observer invoked after each per-recipient delivery completes.
pub type NotificationObserver = Arc<dyn Fn(&SentNotification) + Send + Sync>;

/// The channel collection capability value.
#[derive(Clone)]
pub struct Channels {
    inner: Arc<RwLock<Vec<Arc<dyn Channel>>>>,
    observer: Arc<RwLock<Option<NotificationObserver>>>,
}

impl Channels {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
            observer: Arc::new(RwLock::new(None)),
        }
    }

    /// Create discarding channels for the given names.
    pub fn null_set<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels = Self::new();
        for name in names {
            channels.add(Arc::new(NullChannel::new(name)));
        }
        channels
    }

    /// Create discarding channels from the `notifier.channels` config key,
    /// falling back to [`DEFAULT_CHANNELS`].
    pub fn from_config(config: &ConfigMap) -> Self {
        let names = config
            .str_array("notifier.channels")
            .unwrap_or_else(|| DEFAULT_CHANNELS.iter().map(|s| s.to_string()).collect());
        Self::null_set(names)
    }

    /// Add a channel, replacing any existing channel with the same name.
    pub fn add(&self, channel: Arc<dyn Channel>) {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.iter_mut().find(|c| c.name() == channel.name()) {
            *existing = channel;
        } else {
            inner.push(channel);
        }
    }

    /// Look up a channel by name.
    pub fn channel(&self, name: &str) -> Result<Arc<dyn Channel>> {
        self.inner
            .read()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownChannel {
                name: name.to_string(),
            })
    }

    /// Registered channel names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().iter().map(|c| c.name().to_string()).collect()
    }

    /// Attach an observer invoked after each per-recipient delivery.
    #[must_use]
    pub fn with_observer(self, observer: NotificationObserver) -> Self {
        *self.observer.write() = Some(observer);
        self
    }

    fn notify(&self, sent: &SentNotification) {
        if let Some(observer) = self.observer.read().as_ref() {
            observer(sent);
        }
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivers notifications through the resolved channels.
pub struct Notifier {
    channels: Channels,
}

impl Notifier {
    /// Create a notifier over a channel collection.
    pub fn new(channels: Channels) -> Self {
        Self { channels }
    }

    /// Deliver a notification to each recipient through every channel the
    /// notification targets. Content and address faults abort delivery.
    pub fn send(
        &self,
        notification: &Notification,
        recipients: &[Recipient],
    ) -> Result<Vec<SentNotification>> {
        let mut deliveries = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let mut messages = Vec::with_capacity(notification.channels.len());
            for channel_name in &notification.channels {
                let channel = self.channels.channel(channel_name)?;
                let message = channel.send(notification, recipient)?;
                messages.push((channel_name.clone(), message));
            }
            let sent = SentNotification {
                notification: notification.clone(),
                recipient: recipient.clone(),
                messages,
            };
            self.channels.notify(&sent);
            deliveries.push(sent);
        }
        Ok(deliveries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shipped() -> Notification {
        Notification::new("order_shipped")
            .subject("Your order shipped")
            .content("It is on the way.")
            .channels(["mail", "sms", "storage"])
    }

    #[test]
    fn mail_message_from_generic_content() {
        let recipient = Recipient::new().email("tom@example.com");
        let message = build_channel_message("mail", &shipped(), &recipient).unwrap();

        let ChannelMessage::Mail(mail) = message else {
            panic!("expected mail message");
        };
        assert_eq!(mail.subject.as_deref(), Some("Your order shipped"));
        assert_eq!(mail.to[0].email, "tom@example.com");
    }

    #[test]
    fn missing_mail_address_is_a_fault() {
        let recipient = Recipient::new().phone("555-0100");
        let err = build_channel_message("mail", &shipped(), &recipient).unwrap_err();
        assert_eq!(err.code(), "E103");
    }

    #[test]
    fn missing_sms_content_is_a_fault() {
        let notification = Notification::new("silent").channels(["sms"]);
        let recipient = Recipient::new().phone("555-0100");
        let err = build_channel_message("sms", &notification, &recipient).unwrap_err();
        assert_eq!(err.code(), "E102");
    }

    #[test]
    fn storage_record_shape() {
        let recipient = Recipient::new().id(5);
        let message = build_channel_message("storage", &shipped(), &recipient).unwrap();

        let ChannelMessage::Storage(record) = message else {
            panic!("expected storage record");
        };
        assert_eq!(record.recipient_id, 5);
        assert_eq!(record.recipient_type, "user");
        assert_eq!(record.data["name"], "order_shipped");
    }

    #[test]
    fn prefix_matching_channels() {
        let recipient = Recipient::new().email("tom@example.com");
        let message = build_channel_message("mail/marketing", &shipped(), &recipient).unwrap();
        assert!(matches!(message, ChannelMessage::Mail(_)));

        let err = build_channel_message("pigeon", &shipped(), &recipient).unwrap_err();
        assert_eq!(err.code(), "E101");
    }

    #[test]
    fn notifier_aggregates_per_recipient() {
        let channels = Channels::null_set(["mail", "sms", "storage"]);
        let seen: Arc<RwLock<Vec<String>>> = Arc::new(RwLock::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let channels = channels.with_observer(Arc::new(move |sent: &SentNotification| {
            sink.write().push(sent.recipient.identity());
        }));

        let notifier = Notifier::new(channels);
        let recipient = Recipient::new().email("tom@example.com").phone("555-0100").id(5);
        let deliveries = notifier.send(&shipped(), &[recipient]).unwrap();

        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].channel_names(), vec!["mail", "sms", "storage"]);
        assert!(deliveries[0].message("sms").is_some());
        assert_eq!(seen.read().as_slice(), ["user:5"]);
    }
}
