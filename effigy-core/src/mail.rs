//! Mail messages, template rendering, and named mailers.
//!
//! Messages may carry a template reference; rendering happens at send time
//! so template failures surface regardless of the transport behind the
//! mailer. Templates are files under the `views` directory with `{{key}}`
//! placeholders.

use crate::config::ConfigMap;
use crate::error::{CoreError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Mailer names used when `mail.mailers` is not configured.
pub const DEFAULT_MAILERS: &[&str] = &["default"];

/// An email address with an optional display name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Address {
    /// The address itself.
    pub email: String,
    /// Optional display name.
    pub name: Option<String>,
}

impl Address {
    /// Create an address without a display name.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    /// Create an address with a display name.
    pub fn named(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }
}

/// A template reference rendered at send time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    /// Template name; resolves to `<views>/<name>.html`.
    pub name: String,
    /// Substitution data for `{{key}}` placeholders.
    pub data: Value,
}

/// Delivery parameters attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Parameter {
    /// Deliver through a queue instead of synchronously.
    Queue {
        /// Delay before processing, in seconds.
        delay_secs: u64,
    },
}

/// A mail message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Message identity, e.g. `welcome`.
    pub name: String,
    /// Sender address.
    pub from: Option<Address>,
    /// Recipient addresses.
    pub to: Vec<Address>,
    /// Carbon-copy addresses.
    pub cc: Vec<Address>,
    /// Blind-carbon-copy addresses.
    pub bcc: Vec<Address>,
    /// Reply-to address.
    pub reply_to: Option<Address>,
    /// Subject line.
    pub subject: Option<String>,
    /// Plain-text body.
    pub text: Option<String>,
    /// HTML body.
    pub html: Option<String>,
    /// Template to render into the bodies.
    pub template: Option<Template>,
    /// Delivery parameters.
    pub parameters: Vec<Parameter>,
}

impl Message {
    /// Create an empty message with a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: None,
            subject: None,
            text: None,
            html: None,
            template: None,
            parameters: Vec::new(),
        }
    }

    /// Set the sender address.
    #[must_use]
    pub fn from(mut self, email: impl Into<String>) -> Self {
        self.from = Some(Address::new(email));
        self
    }

    /// Set the sender address with a display name.
    #[must_use]
    pub fn from_named(mut self, email: impl Into<String>, name: impl Into<String>) -> Self {
        self.from = Some(Address::named(email, name));
        self
    }

    /// Add a recipient.
    #[must_use]
    pub fn to(mut self, email: impl Into<String>) -> Self {
        self.to.push(Address::new(email));
        self
    }

    /// Add a recipient with a display name.
    #[must_use]
    pub fn to_named(mut self, email: impl Into<String>, name: impl Into<String>) -> Self {
        self.to.push(Address::named(email, name));
        self
    }

    /// Add a carbon-copy recipient.
    #[must_use]
    pub fn cc(mut self, email: impl Into<String>) -> Self {
        self.cc.push(Address::new(email));
        self
    }

    /// Add a blind-carbon-copy recipient.
    #[must_use]
    pub fn bcc(mut self, email: impl Into<String>) -> Self {
        self.bcc.push(Address::new(email));
        self
    }

    /// Set the reply-to address.
    #[must_use]
    pub fn reply_to(mut self, email: impl Into<String>) -> Self {
        self.reply_to = Some(Address::new(email));
        self
    }

    /// Set the subject line.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the plain-text body.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the HTML body.
    #[must_use]
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Render the bodies from a template at send time.
    #[must_use]
    pub fn template(mut self, name: impl Into<String>, data: Value) -> Self {
        self.template = Some(Template {
            name: name.into(),
            data,
        });
        self
    }

    /// Deliver through a queue with a processing delay.
    #[must_use]
    pub fn queue(mut self, delay_secs: u64) -> Self {
        self.parameters.push(Parameter::Queue { delay_secs });
        self
    }

    /// Check whether the message carries a queue parameter.
    #[must_use]
    pub fn is_queued(&self) -> bool {
        self.parameters
            .iter()
            .any(|p| matches!(p, Parameter::Queue { .. }))
    }
}

/// Renders message templates from the `views` directory.
pub struct Renderer {
    views_dir: PathBuf,
}

impl Renderer {
    /// Create a renderer rooted at a views directory.
    pub fn new(views_dir: impl Into<PathBuf>) -> Self {
        Self {
            views_dir: views_dir.into(),
        }
    }

    /// Render a template file, substituting `{{key}}` placeholders from
    /// the data object.
    pub fn render(&self, name: &str, data: &Value) -> Result<String> {
        let path = self.views_dir.join(format!("{name}.html"));
        if !path.is_file() {
            return Err(CoreError::TemplateMissing {
                template: name.to_string(),
                path,
            });
        }
        let mut rendered =
            std::fs::read_to_string(&path).map_err(|e| CoreError::TemplateRender {
                template: name.to_string(),
                cause: e.to_string(),
            })?;
        if let Some(object) = data.as_object() {
            for (key, value) in object {
                rendered = rendered.replace(&format!("{{{{{key}}}}}"), &data_str(value));
            }
        }
        Ok(rendered)
    }

    /// Render a message's template into its bodies. Messages without a
    /// template pass through unchanged.
    pub fn render_message(&self, message: Message) -> Result<Message> {
        let Some(template) = message.template.clone() else {
            return Ok(message);
        };
        let html = self.render(&template.name, &template.data)?;
        let mut message = message;
        if message.text.is_none() {
            message.text = Some(strip_tags(&html));
        }
        message.html = Some(html);
        Ok(message)
    }
}

/// A named mail transport.
pub trait Mailer: Send + Sync {
    /// The mailer name.
    fn name(&self) -> &str;

    /// Render and send a message.
    fn send(&self, message: Message) -> Result<()>;
}

impl std::fmt::Debug for dyn Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// A transport that renders messages and discards them.
pub struct NullMailer {
    name: String,
    renderer: Arc<Renderer>,
}

impl NullMailer {
    /// Create a discarding mailer.
    pub fn new(name: impl Into<String>, renderer: Arc<Renderer>) -> Self {
        Self {
            name: name.into(),
            renderer,
        }
    }
}

impl Mailer for NullMailer {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, message: Message) -> Result<()> {
        let message = self.renderer.render_message(message)?;
        tracing::info!(mailer = %self.name, message = %message.name, "message discarded");
        Ok(())
    }
}

/// The named-mailer collection capability value.
#[derive(Clone)]
pub struct Mailers {
    inner: Arc<RwLock<Vec<Arc<dyn Mailer>>>>,
    renderer: Arc<Renderer>,
}

impl Mailers {
    /// Create an empty collection sharing a renderer.
    pub fn new(renderer: Arc<Renderer>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
            renderer,
        }
    }

    /// Create discarding mailers from the `mail.mailers` config key,
    /// falling back to [`DEFAULT_MAILERS`].
    pub fn from_config(config: &ConfigMap, renderer: Arc<Renderer>) -> Self {
        let names = config
            .str_array("mail.mailers")
            .unwrap_or_else(|| DEFAULT_MAILERS.iter().map(|s| s.to_string()).collect());
        let mailers = Self::new(Arc::clone(&renderer));
        for name in names {
            mailers.add(Arc::new(NullMailer::new(name, Arc::clone(&renderer))));
        }
        mailers
    }

    /// Add a mailer, replacing any existing mailer with the same name.
    pub fn add(&self, mailer: Arc<dyn Mailer>) {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.iter_mut().find(|m| m.name() == mailer.name()) {
            *existing = mailer;
        } else {
            inner.push(mailer);
        }
    }

    /// Look up a mailer by name.
    pub fn mailer(&self, name: &str) -> Result<Arc<dyn Mailer>> {
        self.inner
            .read()
            .iter()
            .find(|m| m.name() == name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownMailer {
                name: name.to_string(),
            })
    }

    /// Registered mailer names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().iter().map(|m| m.name().to_string()).collect()
    }

    /// The shared template renderer.
    pub fn renderer(&self) -> Arc<Renderer> {
        Arc::clone(&self.renderer)
    }
}

fn data_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn renderer_with(name: &str, content: &str) -> (tempfile::TempDir, Renderer) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(format!("{name}.html")), content).unwrap();
        let renderer = Renderer::new(dir.path());
        (dir, renderer)
    }

    #[test]
    fn render_substitutes_placeholders() {
        let (_dir, renderer) = renderer_with("welcome", "<p>Welcome, {{name}}!</p>");
        let html = renderer
            .render("welcome", &json!({"name": "Tom"}))
            .unwrap();
        assert_eq!(html, "<p>Welcome, Tom!</p>");
    }

    #[test]
    fn missing_template_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Renderer::new(dir.path());
        let err = renderer.render("absent", &json!({})).unwrap_err();
        assert_eq!(err.code(), "E061");
    }

    #[test]
    fn render_message_fills_text_and_html() {
        let (_dir, renderer) = renderer_with("welcome", "<p>Welcome, {{name}}!</p>");
        let message = Message::new("welcome")
            .to_named("tom@example.com", "Tom")
            .subject("Welcome")
            .template("welcome", json!({"name": "Tom"}));

        let rendered = renderer.render_message(message).unwrap();
        assert_eq!(rendered.html.as_deref(), Some("<p>Welcome, Tom!</p>"));
        assert_eq!(rendered.text.as_deref(), Some("Welcome, Tom!"));
    }

    #[test]
    fn queued_parameter() {
        let message = Message::new("welcome").queue(30);
        assert!(message.is_queued());
        assert!(!Message::new("welcome").is_queued());
    }

    #[test]
    fn collection_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(Renderer::new(dir.path()));

        let config = ConfigMap::new();
        let mailers = Mailers::from_config(&config, Arc::clone(&renderer));
        assert_eq!(mailers.names(), vec!["default"]);

        config.set("mail.mailers", json!(["default", "newsletter"]));
        let mailers = Mailers::from_config(&config, renderer);
        assert_eq!(mailers.names(), vec!["default", "newsletter"]);
        assert!(mailers.mailer("newsletter").is_ok());
        assert_eq!(mailers.mailer("nope").unwrap_err().code(), "E082");
    }
}
