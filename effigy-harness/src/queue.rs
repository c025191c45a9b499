//! Job queue faker.

use crate::must;
use crate::recorder::{recorder_in, Recorder, RecorderMap};
use crate::registry::{Faker, FakerKind};
use effigy_core::queue::{Job, Queue, Queues};
use effigy_core::{App, Result, FAKE_PRIORITY};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;

/// A queue that records pushes but never hands jobs out for processing.
pub struct TestQueue {
    name: String,
    recorder: Recorder<Job>,
    live: Mutex<VecDeque<Job>>,
}

impl TestQueue {
    fn new(name: impl Into<String>, recorder: Recorder<Job>) -> Self {
        Self {
            name: name.into(),
            recorder,
            live: Mutex::new(VecDeque::new()),
        }
    }
}

impl Queue for TestQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn push(&self, job: Job) -> Result<Job> {
        let job = job.assigned();
        tracing::debug!(queue = %self.name, job = %job.name, "job recorded, never processed");
        self.recorder.record(job.name.clone(), job.clone());
        self.live.lock().push_back(job.clone());
        Ok(job)
    }

    fn pop(&self) -> Option<Job> {
        None
    }

    fn all(&self) -> Vec<Job> {
        self.live.lock().iter().cloned().collect()
    }

    fn size(&self) -> usize {
        self.live.lock().len()
    }

    fn clear(&self) {
        self.live.lock().clear();
    }
}

/// Replaces every configured queue with a recording one.
#[derive(Clone)]
pub struct FakeQueue {
    inner: Arc<FakeQueueInner>,
}

struct FakeQueueInner {
    app: Arc<App>,
    recorders: RecorderMap<Job>,
    delegate: RwLock<Option<FakeQueue>>,
}

impl FakeQueue {
    pub(crate) fn install(app: &Arc<App>) -> Self {
        let recorders: RecorderMap<Job> = Arc::default();
        let hook_recorders = recorders.clone();
        app.hooks().queues.on_with_priority(
            move |queues, _| {
                let faked = Queues::new();
                for name in queues.names() {
                    let recorder = recorder_in(&hook_recorders, &name);
                    faked.add(Arc::new(TestQueue::new(name, recorder)));
                }
                faked
            },
            FAKE_PRIORITY,
        );
        Self {
            inner: Arc::new(FakeQueueInner {
                app: app.clone(),
                recorders,
                delegate: RwLock::new(None),
            }),
        }
    }

    fn newest(&self) -> FakeQueue {
        let mut current = self.clone();
        loop {
            let next = current.inner.delegate.read().clone();
            match next {
                Some(delegate) => current = delegate,
                None => return current,
            }
        }
    }

    /// The resolved queue collection.
    pub fn queues(&self) -> Queues {
        must(self.newest().inner.app.queues())
    }

    /// Assertion surface for one named queue.
    pub fn queue(&self, name: &str) -> QueueDouble {
        let newest = self.newest();
        QueueDouble {
            name: name.to_string(),
            recorder: recorder_in(&newest.inner.recorders, name),
        }
    }
}

impl Faker for FakeQueue {
    fn kind(&self) -> FakerKind {
        FakerKind::Queue
    }

    fn fork(&self, app: &Arc<App>) -> Arc<dyn Faker> {
        let forked = FakeQueue::install(app);
        *self.newest().inner.delegate.write() = Some(forked.clone());
        Arc::new(forked)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Asserts over the jobs one queue received.
pub struct QueueDouble {
    name: String,
    recorder: Recorder<Job>,
}

impl QueueDouble {
    /// The queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Jobs pushed under a job name, in push order.
    pub fn pushed(&self, job: &str) -> Vec<Job> {
        self.recorder.all(job)
    }

    /// Assert a job was pushed onto this queue.
    #[track_caller]
    pub fn assert_pushed(&self, job: &str) -> &Self {
        if self.recorder.count(job) == 0 {
            panic!("The expected job [{job}] was not pushed.");
        }
        self
    }

    /// Assert a job matching a predicate was pushed.
    #[track_caller]
    pub fn assert_pushed_where<F>(&self, job: &str, predicate: F) -> &Self
    where
        F: Fn(&Job) -> bool,
    {
        if !self.recorder.has(job, predicate) {
            panic!("The expected job [{job}] was not pushed.");
        }
        self
    }

    /// Assert a job was not pushed.
    #[track_caller]
    pub fn assert_not_pushed(&self, job: &str) -> &Self {
        if self.recorder.count(job) > 0 {
            panic!("The unexpected job [{job}] was pushed.");
        }
        self
    }

    /// Assert no job matching a predicate was pushed.
    #[track_caller]
    pub fn assert_not_pushed_where<F>(&self, job: &str, predicate: F) -> &Self
    where
        F: Fn(&Job) -> bool,
    {
        if self.recorder.has(job, predicate) {
            panic!("The unexpected job [{job}] was pushed.");
        }
        self
    }

    /// Assert this queue received no jobs at all.
    #[track_caller]
    pub fn assert_nothing_pushed(&self) -> &Self {
        if !self.recorder.is_empty() {
            let jobs = self.recorder.kinds().join(", ");
            panic!("The following jobs were pushed unexpectedly: {jobs}");
        }
        self
    }

    /// Assert a job was pushed exactly `times` times.
    #[track_caller]
    pub fn assert_pushed_times(&self, job: &str, times: usize) -> &Self {
        let actual = self.recorder.count(job);
        if actual != times {
            panic!("The expected job [{job}] was sent {actual} times instead of {times} times.");
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_app() -> Arc<App> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(
            App::builder()
                .root(dir.path())
                .config_value("queue.queues", json!(["sync", "file"]))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn pushes_are_recorded_per_queue() {
        let app = test_app();
        let fake = FakeQueue::install(&app);

        let sync = app.queues().unwrap().queue("sync").unwrap();
        sync.push(Job::new("sample", json!({"key": "value"}))).unwrap();

        fake.queue("sync")
            .assert_pushed("sample")
            .assert_pushed_where("sample", |job| job.payload["key"] == json!("value"))
            .assert_pushed_times("sample", 1)
            .assert_not_pushed("other");
        fake.queue("file").assert_nothing_pushed();
    }

    #[test]
    fn jobs_are_never_handed_out() {
        let app = test_app();
        let fake = FakeQueue::install(&app);

        let sync = app.queues().unwrap().queue("sync").unwrap();
        let stored = sync.push(Job::new("sample", json!(null))).unwrap();

        assert!(stored.id.is_some());
        assert!(sync.pop().is_none());
        assert_eq!(sync.size(), 1);
        assert_eq!(fake.queue("sync").pushed("sample").len(), 1);
    }

    #[test]
    fn clear_keeps_the_record() {
        let app = test_app();
        let fake = FakeQueue::install(&app);

        let sync = app.queues().unwrap().queue("sync").unwrap();
        sync.push(Job::new("sample", json!(null))).unwrap();
        sync.clear();

        assert_eq!(sync.size(), 0);
        fake.queue("sync").assert_pushed("sample");
    }

    #[test]
    #[should_panic(expected = "The expected job [sample] was not pushed.")]
    fn missing_push_fails() {
        let app = test_app();
        FakeQueue::install(&app).queue("sync").assert_pushed("sample");
    }

    #[test]
    #[should_panic(expected = "The following jobs were pushed unexpectedly: sample")]
    fn unexpected_push_fails_with_names() {
        let app = test_app();
        let fake = FakeQueue::install(&app);
        app.queues()
            .unwrap()
            .queue("sync")
            .unwrap()
            .push(Job::new("sample", json!(null)))
            .unwrap();

        fake.queue("sync").assert_nothing_pushed();
    }
}
