//! Named job queues.
//!
//! Queue names come from the `queue.queues` config key; every queue in the
//! default implementation is an in-memory FIFO. Pushing assigns the job id.

use crate::config::ConfigMap;
use crate::error::{CoreError, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

/// Queue names used when `queue.queues` is not configured.
pub const DEFAULT_QUEUES: &[&str] = &["sync"];

/// A queued job: a name, a JSON payload, and an id assigned on push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// The job name, e.g. `sample`.
    pub name: String,
    /// Job data as JSON.
    pub payload: Value,
    /// Assigned on push; `None` until then.
    pub id: Option<String>,
}

impl Job {
    /// Create an unassigned job.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            id: None,
        }
    }

    /// Return the job with a fresh id unless one is already assigned.
    #[must_use]
    pub fn assigned(mut self) -> Self {
        if self.id.is_none() {
            self.id = Some(uuid::Uuid::new_v4().to_string());
        }
        self
    }
}

/// A named job queue.
pub trait Queue: Send + Sync {
    /// The queue name.
    fn name(&self) -> &str;

    /// Push a job, assigning its id. Returns the stored job.
    fn push(&self, job: Job) -> Result<Job>;

    /// Pop the next job, if any.
    fn pop(&self) -> Option<Job>;

    /// All jobs currently in the queue, in push order.
    fn all(&self) -> Vec<Job>;

    /// Number of jobs currently in the queue.
    fn size(&self) -> usize;

    /// Remove every job from the queue.
    fn clear(&self);
}

impl std::fmt::Debug for dyn Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// In-memory FIFO queue.
pub struct MemoryQueue {
    name: String,
    jobs: Mutex<VecDeque<Job>>,
}

impl MemoryQueue {
    /// Create an empty queue.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jobs: Mutex::new(VecDeque::new()),
        }
    }
}

impl Queue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn push(&self, job: Job) -> Result<Job> {
        let job = job.assigned();
        tracing::debug!(queue = %self.name, job = %job.name, "job pushed");
        self.jobs.lock().push_back(job.clone());
        Ok(job)
    }

    fn pop(&self) -> Option<Job> {
        self.jobs.lock().pop_front()
    }

    fn all(&self) -> Vec<Job> {
        self.jobs.lock().iter().cloned().collect()
    }

    fn size(&self) -> usize {
        self.jobs.lock().len()
    }

    fn clear(&self) {
        self.jobs.lock().clear();
    }
}

/// The named-queue collection capability value.
#[derive(Clone)]
pub struct Queues {
    inner: Arc<RwLock<Vec<Arc<dyn Queue>>>>,
}

impl Queues {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create in-memory queues for the given names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queues = Self::new();
        for name in names {
            queues.add(Arc::new(MemoryQueue::new(name)));
        }
        queues
    }

    /// Create queues from the `queue.queues` config key, falling back to
    /// [`DEFAULT_QUEUES`].
    pub fn from_config(config: &ConfigMap) -> Self {
        let names = config
            .str_array("queue.queues")
            .unwrap_or_else(|| DEFAULT_QUEUES.iter().map(|s| s.to_string()).collect());
        Self::from_names(names)
    }

    /// Add a queue, replacing any existing queue with the same name.
    pub fn add(&self, queue: Arc<dyn Queue>) {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.iter_mut().find(|q| q.name() == queue.name()) {
            *existing = queue;
        } else {
            inner.push(queue);
        }
    }

    /// Look up a queue by name.
    pub fn queue(&self, name: &str) -> Result<Arc<dyn Queue>> {
        self.inner
            .read()
            .iter()
            .find(|q| q.name() == name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownQueue {
                name: name.to_string(),
            })
    }

    /// Registered queue names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().iter().map(|q| q.name().to_string()).collect()
    }
}

impl Default for Queues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_assigns_id_and_fifo_pop() {
        let queue = MemoryQueue::new("sync");

        let stored = queue.push(Job::new("sample", json!({"key": "value"}))).unwrap();
        assert!(stored.id.is_some());
        queue.push(Job::new("second", json!(null))).unwrap();

        assert_eq!(queue.size(), 2);
        assert_eq!(queue.pop().unwrap().name, "sample");
        assert_eq!(queue.pop().unwrap().name, "second");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn clear_empties_the_queue() {
        let queue = MemoryQueue::new("sync");
        queue.push(Job::new("sample", json!(null))).unwrap();
        queue.clear();
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn collection_lookup_by_name() {
        let queues = Queues::from_names(["sync", "file"]);
        assert_eq!(queues.names(), vec!["sync", "file"]);
        assert_eq!(queues.queue("file").unwrap().name(), "file");

        let err = queues.queue("missing").unwrap_err();
        assert_eq!(err.code(), "E081");
    }

    #[test]
    fn from_config_defaults_to_sync() {
        let config = ConfigMap::new();
        let queues = Queues::from_config(&config);
        assert_eq!(queues.names(), vec!["sync"]);

        config.set("queue.queues", json!(["sync", "file"]));
        let queues = Queues::from_config(&config);
        assert_eq!(queues.names(), vec!["sync", "file"]);
    }

    #[test]
    fn add_replaces_same_name() {
        let queues = Queues::from_names(["sync"]);
        queues.add(Arc::new(MemoryQueue::new("sync")));
        assert_eq!(queues.names(), vec!["sync"]);
    }
}
