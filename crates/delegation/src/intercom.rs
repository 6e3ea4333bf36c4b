//! In-process pub/sub over a closed topic set, with bounded replay rings
//! (C3).
//!
//! Generalizes the gateway's `DeliveryStore` (`RwLock<VecDeque<Delivery>>`
//! capped at `MAX_DELIVERIES` plus a `broadcast::channel` for live fan-out)
//! into a multi-topic bus: one bounded ring per topic, a bounded ring
//! across all topics, and synchronous subscriber dispatch instead of an
//! async channel, since emitters here (lifecycle transitions, background
//! task completion, nudges) need delivery to have happened by the time
//! `emit` returns, not merely queued.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

const TOPIC_RING_CAP: usize = 100;
const GLOBAL_RING_CAP: usize = 2 * TOPIC_RING_CAP;

/// The closed set of events the rest of the system may publish or
/// subscribe to. Adding a topic means touching this enum, not inventing a
/// string at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    TaskQueued,
    TaskCompleted,
    TaskFailed,
    AgentCreated,
    AgentDismissed,
    AgentRevived,
    MemoryUpdated,
    MemoryConsolidated,
    BlackboardProposal,
    BlackboardResolved,
    NudgeScheduled,
    NudgeDelivered,
    NudgeSuppressed,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::TaskQueued => "task:queued",
            Topic::TaskCompleted => "task:completed",
            Topic::TaskFailed => "task:failed",
            Topic::AgentCreated => "agent:created",
            Topic::AgentDismissed => "agent:dismissed",
            Topic::AgentRevived => "agent:revived",
            Topic::MemoryUpdated => "memory:updated",
            Topic::MemoryConsolidated => "memory:consolidated",
            Topic::BlackboardProposal => "blackboard:proposal",
            Topic::BlackboardResolved => "blackboard:resolved",
            Topic::NudgeScheduled => "nudge:scheduled",
            Topic::NudgeDelivered => "nudge:delivered",
            Topic::NudgeSuppressed => "nudge:suppressed",
        }
    }

    const ALL: [Topic; 13] = [
        Topic::TaskQueued,
        Topic::TaskCompleted,
        Topic::TaskFailed,
        Topic::AgentCreated,
        Topic::AgentDismissed,
        Topic::AgentRevived,
        Topic::MemoryUpdated,
        Topic::MemoryConsolidated,
        Topic::BlackboardProposal,
        Topic::BlackboardResolved,
        Topic::NudgeScheduled,
        Topic::NudgeDelivered,
        Topic::NudgeSuppressed,
    ];
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "topic", serialize_with = "serialize_topic")]
    pub topic: Topic,
    pub user_id: String,
    pub data: serde_json::Value,
    pub at: i64,
}

fn serialize_topic<S: serde::Serializer>(topic: &Topic, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(topic.as_str())
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Call to stop receiving further events from the subscription that
/// produced it. Idempotent only once — calling it a second time is a
/// no-op since the id has already been removed.
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

struct Inner {
    next_id: u64,
    by_topic: HashMap<Topic, Vec<(u64, Handler)>>,
    any: Vec<(u64, Handler)>,
    topic_rings: HashMap<Topic, VecDeque<Event>>,
    global_ring: VecDeque<Event>,
}

impl Inner {
    fn new() -> Self {
        Self {
            next_id: 0,
            by_topic: HashMap::new(),
            any: Vec::new(),
            topic_rings: Topic::ALL.iter().map(|t| (*t, VecDeque::new())).collect(),
            global_ring: VecDeque::new(),
        }
    }
}

/// The event bus. Construct once per process and share via `Arc`;
/// subscription handles borrow that `Arc` so they can unsubscribe later.
pub struct Intercom {
    inner: Mutex<Inner>,
}

impl Default for Intercom {
    fn default() -> Self {
        Self::new()
    }
}

impl Intercom {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::new()),
        })
    }

    /// Subscribe to one topic.
    pub fn on(
        self: &Arc<Self>,
        topic: Topic,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Unsubscribe {
        let id = {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner
                .by_topic
                .entry(topic)
                .or_default()
                .push((id, Arc::new(handler)));
            id
        };
        let this = Arc::clone(self);
        Box::new(move || {
            let mut inner = this.inner.lock();
            if let Some(v) = inner.by_topic.get_mut(&topic) {
                v.retain(|(hid, _)| *hid != id);
            }
        })
    }

    /// Subscribe to every topic.
    pub fn on_any(
        self: &Arc<Self>,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Unsubscribe {
        let id = {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.any.push((id, Arc::new(handler)));
            id
        };
        let this = Arc::clone(self);
        Box::new(move || {
            let mut inner = this.inner.lock();
            inner.any.retain(|(hid, _)| *hid != id);
        })
    }

    /// Publish `topic` and invoke every matching subscriber synchronously,
    /// in subscription order (topic-specific handlers first, then `onAny`
    /// handlers). A subscriber that panics is caught and logged; it never
    /// stops later subscribers from running or propagates to the caller.
    pub fn emit(&self, topic: Topic, user_id: impl Into<String>, data: serde_json::Value, at: i64) {
        let event = Event {
            topic,
            user_id: user_id.into(),
            data,
            at,
        };
        let (topic_handlers, any_handlers) = {
            let mut inner = self.inner.lock();
            let ring = inner.topic_rings.entry(topic).or_default();
            ring.push_back(event.clone());
            if ring.len() > TOPIC_RING_CAP {
                ring.pop_front();
            }
            inner.global_ring.push_back(event.clone());
            if inner.global_ring.len() > GLOBAL_RING_CAP {
                inner.global_ring.pop_front();
            }
            let topic_handlers: Vec<Handler> = inner
                .by_topic
                .get(&topic)
                .map(|v| v.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default();
            let any_handlers: Vec<Handler> = inner.any.iter().map(|(_, h)| h.clone()).collect();
            (topic_handlers, any_handlers)
        };
        for handler in topic_handlers.iter().chain(any_handlers.iter()) {
            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&event)));
            if outcome.is_err() {
                tracing::warn!(topic = topic.as_str(), "intercom subscriber panicked, suppressed");
            }
        }
    }

    /// Last (up to) `TOPIC_RING_CAP` events published on `topic`, oldest first.
    pub fn recent(&self, topic: Topic) -> Vec<Event> {
        self.inner
            .lock()
            .topic_rings
            .get(&topic)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Last (up to) `GLOBAL_RING_CAP` events across all topics, oldest first.
    pub fn recent_all(&self) -> Vec<Event> {
        self.inner.lock().global_ring.iter().cloned().collect()
    }

    /// Drop all replay history. Subscriptions are left intact.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for ring in inner.topic_rings.values_mut() {
            ring.clear();
        }
        inner.global_ring.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn on_receives_only_its_topic() {
        let bus = Intercom::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let _unsub = bus.on(Topic::TaskCompleted, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(Topic::TaskFailed, "u1", serde_json::json!({}), 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        bus.emit(Topic::TaskCompleted, "u1", serde_json::json!({}), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn on_any_receives_every_topic() {
        let bus = Intercom::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let _unsub = bus.on_any(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(Topic::AgentCreated, "u1", serde_json::json!({}), 1);
        bus.emit(Topic::NudgeDelivered, "u1", serde_json::json!({}), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = Intercom::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let unsub = bus.on(Topic::MemoryUpdated, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(Topic::MemoryUpdated, "u1", serde_json::json!({}), 1);
        unsub();
        bus.emit(Topic::MemoryUpdated, "u1", serde_json::json!({}), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let bus = Intercom::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let _unsub_a = bus.on(Topic::TaskFailed, |_| panic!("boom"));
        let _unsub_b = bus.on(Topic::TaskFailed, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(Topic::TaskFailed, "u1", serde_json::json!({}), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn topic_ring_evicts_oldest_past_cap() {
        let bus = Intercom::new();
        for i in 0..(TOPIC_RING_CAP + 10) {
            bus.emit(Topic::NudgeScheduled, "u1", serde_json::json!({ "i": i }), i as i64);
        }
        let recent = bus.recent(Topic::NudgeScheduled);
        assert_eq!(recent.len(), TOPIC_RING_CAP);
        assert_eq!(recent.first().unwrap().at, 10);
    }

    #[test]
    fn global_ring_spans_all_topics_at_double_capacity() {
        let bus = Intercom::new();
        for i in 0..(GLOBAL_RING_CAP + 5) {
            let topic = if i % 2 == 0 {
                Topic::TaskQueued
            } else {
                Topic::TaskCompleted
            };
            bus.emit(topic, "u1", serde_json::json!({}), i as i64);
        }
        assert_eq!(bus.recent_all().len(), GLOBAL_RING_CAP);
    }

    #[test]
    fn clear_drops_rings_but_keeps_subscribers() {
        let bus = Intercom::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let _unsub = bus.on(Topic::AgentRevived, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(Topic::AgentRevived, "u1", serde_json::json!({}), 1);
        bus.clear();
        assert!(bus.recent(Topic::AgentRevived).is_empty());
        bus.emit(Topic::AgentRevived, "u1", serde_json::json!({}), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
