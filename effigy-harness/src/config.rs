//! Configuration faker.

use crate::must;
use crate::registry::{Faker, FakerKind};
use effigy_core::config::ConfigOverlay;
use effigy_core::{App, FAKE_PRIORITY};
use parking_lot::RwLock;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Overrides configuration values without touching config files.
///
/// The overlay stays live: values set after the config has resolved are
/// still visible to later reads.
#[derive(Clone)]
pub struct FakeConfig {
    inner: Arc<FakeConfigInner>,
}

struct FakeConfigInner {
    app: Arc<App>,
    overlay: ConfigOverlay,
    delegate: RwLock<Option<FakeConfig>>,
}

impl FakeConfig {
    pub(crate) fn install(app: &Arc<App>) -> Self {
        Self::install_with(app, HashMap::new())
    }

    fn install_with(app: &Arc<App>, seed: HashMap<String, Value>) -> Self {
        let overlay: ConfigOverlay = Arc::new(RwLock::new(seed));
        let hook_overlay = overlay.clone();
        app.hooks().config.on_with_priority(
            move |config, _| config.with_overlay(hook_overlay.clone()),
            FAKE_PRIORITY,
        );
        Self {
            inner: Arc::new(FakeConfigInner {
                app: app.clone(),
                overlay,
                delegate: RwLock::new(None),
            }),
        }
    }

    fn newest(&self) -> FakeConfig {
        let mut current = self.clone();
        loop {
            let next = current.inner.delegate.read().clone();
            match next {
                Some(delegate) => current = delegate,
                None => return current,
            }
        }
    }

    /// Override a config value.
    pub fn with(&self, key: impl Into<String>, value: Value) -> &Self {
        self.newest().inner.overlay.write().insert(key.into(), value);
        self
    }

    /// Read a value through the app's resolved config.
    pub fn get(&self, key: &str) -> Option<Value> {
        must(self.newest().inner.app.config()).get(key)
    }

    /// Assert a config key exists.
    #[track_caller]
    pub fn assert_exists(&self, key: &str) -> &Self {
        if !must(self.newest().inner.app.config()).has(key) {
            panic!("Config doesn't have key [{key}]");
        }
        self
    }

    /// Assert a config key holds exactly a value.
    #[track_caller]
    pub fn assert_same(&self, key: &str, value: Value) -> &Self {
        match self.get(key) {
            None => panic!("Config doesn't have key [{key}]"),
            Some(found) if found == value => self,
            Some(_) => panic!("Config with key [{key}] is not equal."),
        }
    }
}

impl Faker for FakeConfig {
    fn kind(&self) -> FakerKind {
        FakerKind::Config
    }

    fn fork(&self, app: &Arc<App>) -> Arc<dyn Faker> {
        let seed = self.newest().inner.overlay.read().clone();
        let forked = FakeConfig::install_with(app, seed);
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
    use serde_json::json;

    fn test_app() -> Arc<App> {
        let dir = tempfile::tempdir().unwrap();
        let app = App::builder()
            .root(dir.path())
            .config_value("app.name", json!("effigy"))
            .build()
            .unwrap();
        Arc::new(app)
    }

    #[test]
    fn overlay_wins_over_seeded_values() {
        let app = test_app();
        let fake = FakeConfig::install(&app);
        fake.with("app.name", json!("overridden"));

        fake.assert_same("app.name", json!("overridden"));
    }

    #[test]
    fn overlay_stays_live_after_resolution() {
        let app = test_app();
        let fake = FakeConfig::install(&app);

        // Resolve first, override afterwards.
        fake.assert_same("app.name", json!("effigy"));
        fake.with("mail.default", json!("smtp"));
        fake.assert_exists("mail.default");
    }

    #[test]
    #[should_panic(expected = "Config doesn't have key [missing.key]")]
    fn missing_key_fails() {
        let app = test_app();
        FakeConfig::install(&app).assert_exists("missing.key");
    }

    #[test]
    #[should_panic(expected = "Config with key [app.name] is not equal.")]
    fn mismatched_value_fails() {
        let app = test_app();
        FakeConfig::install(&app).assert_same("app.name", json!("other"));
    }

    #[test]
    fn fork_carries_overrides_to_the_new_context() {
        let app = test_app();
        let fake = FakeConfig::install(&app);
        fake.with("queue.queues", json!(["sync", "emails"]));

        let dir = tempfile::tempdir().unwrap();
        let next = Arc::new(App::builder().root(dir.path()).build().unwrap());
        fake.fork(&next);

        // The original handle now answers through the fork.
        fake.assert_same("queue.queues", json!(["sync", "emails"]));
        assert_eq!(
            must(next.config()).str_array("queue.queues").unwrap(),
            vec!["sync".to_string(), "emails".to_string()]
        );
    }
}
