//! The bounded log/event bus.
//!
//! Every log line produced anywhere in the relay — internal diagnostics,
//! the command pipeline's audit trail, captured host output — is published
//! to a single [`LogBus`]. The bus keeps the most recent
//! [`LogBus::CAPACITY`] entries (FIFO eviction by sequence number) and
//! pushes each new entry to every registered subscriber in the same global
//! order it was published.
//!
//! The bus is an explicit object passed by reference to every component
//! that publishes, rather than a process-global sink. One instance is
//! created at startup and shared behind an `Arc` for the life of the
//! process.
//!
//! # Subscriber contract
//!
//! Subscriber callbacks run inside the publish critical section so that
//! every subscriber observes entries in sequence order with no entry
//! skipped or duplicated. Callbacks must therefore be cheap and
//! non-blocking — in practice they are unbounded channel sends feeding a
//! session's writer task.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in the log bus.
///
/// Entries carry a monotonic sequence number assigned at publish time.
/// Eviction is strictly FIFO by sequence number, never by size or content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonic sequence number, unique for the lifetime of the bus.
    pub seq: u64,
    /// Wall-clock time the entry was published.
    pub timestamp: DateTime<Utc>,
    /// The log line itself.
    pub text: String,
}

/// Handle returned by [`LogBus::subscribe`], used to unsubscribe.
pub type SubscriberId = u64;

type Subscriber = Box<dyn Fn(&LogEntry) + Send + Sync>;

struct BusInner {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
    next_subscriber_id: SubscriberId,
    subscribers: Vec<(SubscriberId, Subscriber)>,
}

/// Bounded, thread-safe, multi-subscriber log bus.
pub struct LogBus {
    capacity: usize,
    inner: Mutex<BusInner>,
}

impl std::fmt::Debug for LogBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().expect("log bus lock poisoned");
        f.debug_struct("LogBus")
            .field("capacity", &self.capacity)
            .field("len", &inner.entries.len())
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl Default for LogBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBus {
    /// Maximum number of retained entries. Once exceeded, the oldest
    /// entry is evicted on every publish.
    pub const CAPACITY: usize = 1000;

    /// Creates a bus with the default capacity of [`Self::CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(Self::CAPACITY)
    }

    /// Creates a bus with a custom capacity (smaller capacities keep
    /// eviction tests fast).
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "log bus capacity must be non-zero");
        Self {
            capacity,
            inner: Mutex::new(BusInner {
                entries: VecDeque::with_capacity(capacity),
                next_seq: 1,
                next_subscriber_id: 1,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Publishes a new entry and delivers it to every subscriber.
    ///
    /// Blank text is dropped, matching the behavior operators expect from
    /// a line-oriented feed. Returns the assigned sequence number, or
    /// `None` if the text was blank.
    pub fn publish(&self, text: impl Into<String>) -> Option<u64> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }
        tracing::info!(target: "relay::log", "{text}");

        let mut inner = self.inner.lock().expect("log bus lock poisoned");
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let entry = LogEntry {
            seq,
            timestamp: Utc::now(),
            text,
        };

        if inner.entries.len() == self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry);

        // Deliver to subscribers while still holding the lock so every
        // subscriber sees the same global order with no gaps.
        let entry_ref = inner.entries.back().cloned();
        if let Some(entry) = entry_ref {
            for (_, callback) in &inner.subscribers {
                callback(&entry);
            }
        }
        Some(seq)
    }

    /// Returns an ordered copy of the retained entries.
    ///
    /// The copy is immune to concurrent mutation; the HTTP poll endpoint
    /// serves it directly.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        let inner = self.inner.lock().expect("log bus lock poisoned");
        inner.entries.iter().cloned().collect()
    }

    /// Number of currently retained entries.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("log bus lock poisoned");
        inner.entries.len()
    }

    /// True if no entries are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a callback invoked for every subsequently published entry.
    ///
    /// The callback must be cheap and non-blocking (see module docs).
    pub fn subscribe(&self, callback: impl Fn(&LogEntry) + Send + Sync + 'static) -> SubscriberId {
        let mut inner = self.inner.lock().expect("log bus lock poisoned");
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Removes a subscriber. Unknown ids are ignored (the session may
    /// already have been torn down).
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut inner = self.inner.lock().expect("log bus lock poisoned");
        inner.subscribers.retain(|(sid, _)| *sid != id);
    }

    /// Empties the buffer. The clear itself is recorded as a fresh entry
    /// so the operator feed shows when and that it happened.
    pub fn clear(&self) {
        {
            let mut inner = self.inner.lock().expect("log bus lock poisoned");
            inner.entries.clear();
        }
        self.publish("logs cleared");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_publish_assigns_monotonic_sequence_numbers() {
        let bus = LogBus::new();
        let a = bus.publish("first").unwrap();
        let b = bus.publish("second").unwrap();
        assert!(b > a, "sequence numbers must be monotonic");
    }

    #[test]
    fn test_publish_blank_text_is_dropped() {
        let bus = LogBus::new();
        assert_eq!(bus.publish("   "), None);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_snapshot_returns_entries_in_publish_order() {
        let bus = LogBus::new();
        bus.publish("one");
        bus.publish("two");
        bus.publish("three");

        let snapshot = bus.snapshot();
        let texts: Vec<&str> = snapshot.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_capacity_overflow_evicts_oldest_entry() {
        // Publishing capacity + 1 entries must leave exactly `capacity`
        // entries: the first one evicted, the rest retained in order.
        let bus = LogBus::with_capacity(1000);
        for i in 1..=1001 {
            bus.publish(format!("entry {i}"));
        }

        let snapshot = bus.snapshot();
        assert_eq!(snapshot.len(), 1000);
        assert_eq!(snapshot.first().unwrap().text, "entry 2");
        assert_eq!(snapshot.last().unwrap().text, "entry 1001");
    }

    #[test]
    fn test_eviction_is_fifo_by_sequence_number() {
        let bus = LogBus::with_capacity(3);
        for i in 1..=5 {
            bus.publish(format!("e{i}"));
        }
        let seqs: Vec<u64> = bus.snapshot().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[test]
    fn test_subscriber_receives_each_entry_once_in_order() {
        let bus = LogBus::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_cb = Arc::clone(&received);
        bus.subscribe(move |entry| {
            received_cb.lock().unwrap().push(entry.text.clone());
        });

        bus.publish("a");
        bus.publish("b");

        let got = received.lock().unwrap().clone();
        assert_eq!(got, vec!["a", "b"]);
    }

    #[test]
    fn test_subscriber_does_not_receive_entries_published_before_subscribing() {
        let bus = LogBus::new();
        bus.publish("early");

        let count = Arc::new(AtomicUsize::new(0));
        let count_cb = Arc::clone(&count);
        bus.subscribe(move |_| {
            count_cb.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish("late");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = LogBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_cb = Arc::clone(&count);
        let id = bus.subscribe(move |_| {
            count_cb.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish("before");
        bus.unsubscribe(id);
        bus.publish("after");

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_id_is_a_no_op() {
        let bus = LogBus::new();
        bus.unsubscribe(9999);
        assert!(bus.publish("still works").is_some());
    }

    #[test]
    fn test_clear_empties_buffer_and_records_a_clear_entry() {
        let bus = LogBus::new();
        bus.publish("one");
        bus.publish("two");

        bus.clear();

        let snapshot = bus.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].text, "logs cleared");
    }

    #[test]
    fn test_clear_notifies_subscribers() {
        let bus = LogBus::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_cb = Arc::clone(&received);
        bus.subscribe(move |entry| {
            received_cb.lock().unwrap().push(entry.text.clone());
        });

        bus.clear();
        assert_eq!(received.lock().unwrap().clone(), vec!["logs cleared"]);
    }

    #[test]
    fn test_concurrent_publishers_never_exceed_capacity() {
        let bus = Arc::new(LogBus::with_capacity(50));
        let mut handles = Vec::new();
        for t in 0..4 {
            let bus = Arc::clone(&bus);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    bus.publish(format!("t{t} #{i}"));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(bus.len(), 50);
        // Sequence numbers in the snapshot are strictly increasing even
        // under concurrent publishing.
        let seqs: Vec<u64> = bus.snapshot().iter().map(|e| e.seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_log_entry_serializes_to_json() {
        let bus = LogBus::new();
        bus.publish("hello");
        let entry = &bus.snapshot()[0];
        let json = serde_json::to_value(entry).unwrap();
        assert_eq!(json["text"], "hello");
        assert_eq!(json["seq"], 1);
    }
}
