//! Activity recording for test assertions.
//!
//! Every faker writes what it intercepts into a [`Recorder`]. Entries
//! are keyed by a kind string (a job name, an event name, a file
//! operation), kept in insertion order, and never removed: clearing a
//! faked service's live state does not rewrite history.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

struct Entry<T> {
    ordinal: u64,
    item: T,
}

struct RecorderInner<T> {
    entries: HashMap<String, Vec<Entry<T>>>,
    // Kinds in first-recorded order.
    order: Vec<String>,
    next_ordinal: u64,
}

/// An append-only, kind-keyed record of intercepted activity.
///
/// Clones share the same record. Querying a kind nothing was recorded
/// under yields an empty list, never an error.
pub struct Recorder<T> {
    inner: Arc<RwLock<RecorderInner<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> Recorder<T> {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RecorderInner {
                entries: HashMap::new(),
                order: Vec::new(),
                next_ordinal: 0,
            })),
        }
    }

    /// Append an item under a kind.
    pub fn record(&self, kind: impl Into<String>, item: T) {
        let kind = kind.into();
        let mut inner = self.inner.write();
        let ordinal = inner.next_ordinal;
        inner.next_ordinal += 1;
        if !inner.entries.contains_key(&kind) {
            inner.order.push(kind.clone());
        }
        inner
            .entries
            .entry(kind)
            .or_default()
            .push(Entry { ordinal, item });
    }

    /// All items recorded under a kind, in insertion order.
    pub fn all(&self, kind: &str) -> Vec<T> {
        self.inner
            .read()
            .entries
            .get(kind)
            .map(|entries| entries.iter().map(|e| e.item.clone()).collect())
            .unwrap_or_default()
    }

    /// Items under a kind matching a predicate, in insertion order.
    pub fn query<F>(&self, kind: &str, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.inner
            .read()
            .entries
            .get(kind)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| predicate(&e.item))
                    .map(|e| e.item.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check whether anything under a kind matches a predicate.
    pub fn has<F>(&self, kind: &str, predicate: F) -> bool
    where
        F: Fn(&T) -> bool,
    {
        self.inner
            .read()
            .entries
            .get(kind)
            .is_some_and(|entries| entries.iter().any(|e| predicate(&e.item)))
    }

    /// Number of items recorded under a kind.
    pub fn count(&self, kind: &str) -> usize {
        self.inner
            .read()
            .entries
            .get(kind)
            .map_or(0, |entries| entries.len())
    }

    /// Total number of items across all kinds.
    pub fn count_all(&self) -> usize {
        self.inner
            .read()
            .entries
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Kinds in first-recorded order.
    pub fn kinds(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    /// All items across kinds, in global insertion order.
    pub fn timeline(&self) -> Vec<(String, T)> {
        let inner = self.inner.read();
        let mut all: Vec<(u64, String, T)> = inner
            .entries
            .iter()
            .flat_map(|(kind, entries)| {
                entries
                    .iter()
                    .map(|e| (e.ordinal, kind.clone(), e.item.clone()))
            })
            .collect();
        all.sort_by_key(|(ordinal, _, _)| *ordinal);
        all.into_iter().map(|(_, kind, item)| (kind, item)).collect()
    }

    /// Check whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.values().all(|e| e.is_empty())
    }
}

impl<T: Clone> Default for Recorder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One recorder per named sub-collaborator (a queue, a mailer, a storage).
pub(crate) type RecorderMap<T> = Arc<RwLock<HashMap<String, Recorder<T>>>>;

/// Fetch the recorder for a name, creating it on first use. Assertion
/// surfaces exist before the capability resolves, so both sides share
/// whichever recorder came first.
pub(crate) fn recorder_in<T: Clone>(map: &RecorderMap<T>, name: &str) -> Recorder<T> {
    map.write()
        .entry(name.to_string())
        .or_insert_with(Recorder::new)
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_retrieve() {
        let recorder: Recorder<u32> = Recorder::new();

        recorder.record("a", 1);
        recorder.record("b", 2);
        recorder.record("a", 3);

        assert_eq!(recorder.all("a"), vec![1, 3]);
        assert_eq!(recorder.count("a"), 2);
        assert_eq!(recorder.count_all(), 3);
    }

    #[test]
    fn unknown_kind_is_empty() {
        let recorder: Recorder<u32> = Recorder::new();
        assert!(recorder.all("never").is_empty());
        assert_eq!(recorder.count("never"), 0);
        assert!(!recorder.has("never", |_| true));
    }

    #[test]
    fn kinds_keep_first_recorded_order() {
        let recorder: Recorder<&'static str> = Recorder::new();
        recorder.record("second", "x");
        recorder.record("first", "y");
        recorder.record("second", "z");

        assert_eq!(recorder.kinds(), vec!["second", "first"]);
    }

    #[test]
    fn query_filters_in_order() {
        let recorder: Recorder<u32> = Recorder::new();
        for n in [1, 2, 3, 4, 5] {
            recorder.record("n", n);
        }
        assert_eq!(recorder.query("n", |n| n % 2 == 1), vec![1, 3, 5]);
        assert!(recorder.has("n", |n| *n == 4));
        assert!(!recorder.has("n", |n| *n == 9));
    }

    #[test]
    fn timeline_interleaves_kinds() {
        let recorder: Recorder<u32> = Recorder::new();
        recorder.record("a", 1);
        recorder.record("b", 2);
        recorder.record("a", 3);

        let kinds: Vec<String> = recorder.timeline().into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec!["a", "b", "a"]);
    }

    #[test]
    fn clones_share_the_record() {
        let recorder: Recorder<u32> = Recorder::new();
        let other = recorder.clone();
        other.record("a", 7);
        assert_eq!(recorder.all("a"), vec![7]);
    }
}
