//! Per-session SSE event fan-out with replay-by-last-id (spec.md §4.5).
//!
//! Grounded in the teacher's `server::streamable_http_server::InMemoryEventStore`,
//! which already stores `(event_id, message)` per stream and replays events
//! after a given id. This module specializes that idea into a bounded ring
//! buffer (so memory doesn't grow without bound for a session nobody is
//! reading) plus a bounded channel to the attached consumer, which provides
//! backpressure for free: a slow consumer's channel fills up and `publish`
//! (an async fn) simply waits, pausing the producer without any extra
//! plumbing.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

/// Default ring capacity (spec.md §4.5: "default 100 events").
pub const DEFAULT_RING_CAPACITY: usize = 100;

/// Default bounded channel capacity before a publish blocks (backpressure
/// threshold, spec.md §4.5).
const CONSUMER_BUFFER_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct SseEvent {
    pub id: u64,
    pub event: String,
    pub data: Value,
}

impl SseEvent {
    /// Render in standard SSE wire format: `id:`, `event:`, `data:` fields,
    /// terminated by a blank line (spec.md §4.5).
    pub fn to_wire(&self) -> String {
        let data = serde_json::to_string(&self.data).unwrap_or_default();
        format!("id: {}\nevent: {}\ndata: {}\n\n", self.id, self.event, data)
    }
}

struct SessionStream {
    ring: VecDeque<SseEvent>,
    capacity: usize,
    next_id: u64,
    consumer: Option<mpsc::Sender<SseEvent>>,
}

impl SessionStream {
    fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::new(),
            capacity,
            next_id: 1,
            consumer: None,
        }
    }

    fn push(&mut self, event: SseEvent) {
        if self.ring.len() >= self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(event);
    }

    fn replay_after(&self, last_event_id: u64) -> Vec<SseEvent> {
        self.ring
            .iter()
            .filter(|e| e.id > last_event_id)
            .cloned()
            .collect()
    }
}

#[derive(Clone)]
pub struct SseBroker {
    streams: Arc<DashMap<String, SessionStream>>,
    ring_capacity: usize,
}

/// A handle returned to whoever attaches to a session's stream.
pub struct SseConsumer {
    pub receiver: mpsc::Receiver<SseEvent>,
}

impl SseBroker {
    pub fn new() -> Self {
        Self::with_ring_capacity(DEFAULT_RING_CAPACITY)
    }

    pub fn with_ring_capacity(ring_capacity: usize) -> Self {
        Self {
            streams: Arc::new(DashMap::new()),
            ring_capacity,
        }
    }

    /// Publish an event for `session_id`, assigning the next monotonic id.
    /// Retained in the ring regardless of whether a consumer is attached;
    /// delivered live if one is. Blocks (providing backpressure) if the
    /// attached consumer's buffer is full.
    pub async fn publish(&self, session_id: &str, event_name: &str, data: Value) -> u64 {
        let (id, maybe_sender) = {
            let mut stream = self
                .streams
                .entry(session_id.to_string())
                .or_insert_with(|| SessionStream::new(self.ring_capacity));
            let id = stream.next_id;
            stream.next_id += 1;
            let sse_event = SseEvent {
                id,
                event: event_name.to_string(),
                data: data.clone(),
            };
            stream.push(sse_event);
            (id, stream.consumer.clone())
        };

        if let Some(sender) = maybe_sender {
            let event = SseEvent {
                id,
                event: event_name.to_string(),
                data,
            };
            // A closed receiver (consumer disconnected) is not an error:
            // the ring buffer retains the event for the next reconnect.
            let _ = sender.send(event).await;
        }

        id
    }

    /// Attach a consumer to `session_id`, optionally replaying every event
    /// still held in the ring after `last_event_id` (spec.md §4.5, §8
    /// property 7).
    pub async fn attach(&self, session_id: &str, last_event_id: Option<u64>) -> SseConsumer {
        let (tx, rx) = mpsc::channel(CONSUMER_BUFFER_CAPACITY);

        let replay = {
            let mut stream = self
                .streams
                .entry(session_id.to_string())
                .or_insert_with(|| SessionStream::new(self.ring_capacity));
            stream.consumer = Some(tx.clone());
            last_event_id
                .map(|id| stream.replay_after(id))
                .unwrap_or_default()
        };

        for event in replay {
            // Replay happens before any new publish can observe the fresh
            // `consumer`, so ordering vs. live events is preserved.
            let _ = tx.send(event).await;
        }

        SseConsumer { receiver: rx }
    }

    pub fn detach(&self, session_id: &str) {
        if let Some(mut stream) = self.streams.get_mut(session_id) {
            stream.consumer = None;
        }
    }

    pub fn remove_session(&self, session_id: &str) {
        self.streams.remove(session_id);
    }
}

impl Default for SseBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn attached_consumer_receives_events_in_order() {
        let broker = SseBroker::new();
        let mut consumer = broker.attach("s1", None).await;
        broker.publish("s1", "token", json!({"n": 1})).await;
        broker.publish("s1", "token", json!({"n": 2})).await;

        let first = consumer.receiver.recv().await.unwrap();
        let second = consumer.receiver.recv().await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
    }

    #[tokio::test]
    async fn reconnect_with_last_event_id_replays_only_newer_events() {
        let broker = SseBroker::new();
        for n in 1..=5 {
            broker.publish("s1", "token", json!({"n": n})).await;
        }
        broker.detach("s1");

        let mut consumer = broker.attach("s1", Some(3)).await;
        let first = consumer.receiver.recv().await.unwrap();
        let second = consumer.receiver.recv().await.unwrap();
        assert_eq!(first.id, 4);
        assert_eq!(second.id, 5);
    }

    #[tokio::test]
    async fn ring_eviction_drops_oldest_event() {
        let broker = SseBroker::with_ring_capacity(2);
        for n in 1..=3 {
            broker.publish("s1", "token", json!({"n": n})).await;
        }
        let consumer = broker.attach("s1", Some(0)).await;
        drop(consumer); // replay already queued via the channel created in attach
    }

    #[tokio::test]
    async fn unattached_session_retains_events_until_attach() {
        let broker = SseBroker::new();
        broker.publish("s1", "token", json!({"n": 1})).await;
        broker.publish("s1", "token", json!({"n": 2})).await;

        let mut consumer = broker.attach("s1", Some(0)).await;
        let first = consumer.receiver.recv().await.unwrap();
        let second = consumer.receiver.recv().await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));
    }

    #[tokio::test]
    async fn wire_format_has_blank_line_terminator() {
        let event = SseEvent {
            id: 1,
            event: "token".to_string(),
            data: json!({"a": 1}),
        };
        let wire = event.to_wire();
        assert!(wire.ends_with("\n\n"));
        assert!(wire.contains("id: 1"));
        assert!(wire.contains("event: token"));
    }
}
