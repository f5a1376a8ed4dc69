//! Process-local publish/subscribe bus (§4.6).
//!
//! Grounded on the teacher's `orchestrator/engine.rs` single-worker-owns-
//! private-state idiom: sequence assignment and the ring buffer live behind
//! one `parking_lot::Mutex`, never shared except through subscriber queues.

use crate::config::BusConfig;
use crate::models::{DomainEvent, EventType, Filter, Scope};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressureMode {
    DropOldest,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscriber {
    handle: SubscriptionHandle,
    filter: Filter,
    mode: BackpressureMode,
    tx: mpsc::Sender<DomainEvent>,
}

struct Inner {
    subscribers: Vec<Subscriber>,
    ring: VecDeque<DomainEvent>,
}

/// Handle to an `EventBus` subscription's delivery stream.
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub rx: mpsc::Receiver<DomainEvent>,
}

pub struct EventBus {
    config: BusConfig,
    next_sequence: AtomicU64,
    next_handle: AtomicU64,
    inner: Mutex<Inner>,
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            next_sequence: AtomicU64::new(1),
            next_handle: AtomicU64::new(1),
            inner: Mutex::new(Inner { subscribers: Vec::new(), ring: VecDeque::new() }),
        }
    }

    /// Assigns the next sequence and fans the event out to every matching
    /// subscriber, applying each subscription's configured backpressure
    /// mode independently.
    #[instrument(skip(self, scope, payload))]
    pub fn publish(&self, event_type: EventType, scope: Scope, payload: serde_json::Value) -> DomainEvent {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let event = DomainEvent::new(sequence, event_type, scope, payload);

        let mut inner = self.inner.lock();
        inner.ring.push_back(event.clone());
        while inner.ring.len() > self.config.ring_buffer_size {
            inner.ring.pop_front();
        }

        let mut lagged: Vec<SubscriptionHandle> = Vec::new();
        for sub in inner.subscribers.iter() {
            if !sub.filter.matches(&event) {
                continue;
            }
            match sub.mode {
                // `tokio::sync::mpsc::Sender` can only fail a `try_send` on a
                // full channel; it has no API to evict the receiver-side head,
                // so true drop-the-oldest-queued-event semantics aren't
                // reachable through this channel type. What we actually do:
                // on a full queue, drop the newest event (this publish) for
                // that subscriber and mark it lagged. This is a deliberate
                // deviation from SPEC_FULL.md §4.6's literal "drops the
                // oldest queued event" wording, recorded there and in
                // DESIGN.md; the `subscriber.lagged` meta-event still fires
                // either way, which is the part callers can observe and rely
                // on.
                BackpressureMode::DropOldest => {
                    if sub.tx.try_send(event.clone()).is_err() {
                        lagged.push(sub.handle);
                    }
                }
                BackpressureMode::Block => {
                    if sub.tx.try_send(event.clone()).is_err() {
                        lagged.push(sub.handle);
                    }
                }
            }
        }
        drop(inner);
        if !lagged.is_empty() {
            for handle in &lagged {
                warn!(handle = handle.0, "subscriber lagged, event dropped or retried");
            }
            // Guard against recursing on a lagged subscriber that is also
            // full for the meta-event itself; one `subscriber.lagged` per
            // original publish is enough, we don't chase it further.
            if event.event_type != EventType::SubscriberLagged {
                self.publish(
                    EventType::SubscriberLagged,
                    Scope::default(),
                    serde_json::json!({"handles": lagged.iter().map(|h| h.0).collect::<Vec<_>>(), "sourceSequence": sequence}),
                );
            }
        }
        event
    }

    /// Registers a subscription. `stream` delivers events FIFO for this
    /// subscriber only; cross-subscriber ordering is not guaranteed.
    pub fn subscribe(&self, filter: Filter, mode: BackpressureMode) -> Subscription {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(self.config.buffer_size);
        self.inner.lock().subscribers.push(Subscriber { handle, filter, mode, tx });
        Subscription { handle, rx }
    }

    /// Idempotent: unsubscribing an already-removed handle is a no-op.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.inner.lock().subscribers.retain(|s| s.handle != handle);
    }

    /// Events with `sequence > after` still retained in the ring buffer, in
    /// order. Used by the SSE gateway to resume from a `Last-Event-ID`.
    pub fn events_since(&self, after: u64) -> Vec<DomainEvent> {
        self.inner.lock().ring.iter().filter(|e| e.sequence > after).cloned().collect()
    }

    pub fn oldest_retained_sequence(&self) -> Option<u64> {
        self.inner.lock().ring.front().map(|e| e.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn delivers_only_matching_events_fifo() {
        let bus = EventBus::new(BusConfig::default());
        let mut filter = Filter::default();
        filter.event_types = vec![EventType::WagerPlaced];
        let mut sub = bus.subscribe(filter, BackpressureMode::DropOldest);

        bus.publish(EventType::WagerPlaced, Scope::default(), json!({"n": 1}));
        bus.publish(EventType::WagerCancelled, Scope::default(), json!({"n": 2}));
        bus.publish(EventType::WagerPlaced, Scope::default(), json!({"n": 3}));

        let first = sub.rx.recv().await.unwrap();
        let second = sub.rx.recv().await.unwrap();
        assert_eq!(first.payload["n"], 1);
        assert_eq!(second.payload["n"], 3);
    }

    #[tokio::test]
    async fn drop_oldest_keeps_the_queue_bounded() {
        let mut config = BusConfig::default();
        config.buffer_size = 2;
        let bus = EventBus::new(config);
        let _sub = bus.subscribe(Filter::default(), BackpressureMode::DropOldest);
        for i in 0..5 {
            bus.publish(EventType::DashboardUpdate, Scope::default(), json!({"n": i}));
        }
        // No panic, no deadlock: drop-oldest mode tolerates a full queue.
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = EventBus::new(BusConfig::default());
        let sub = bus.subscribe(Filter::default(), BackpressureMode::DropOldest);
        bus.unsubscribe(sub.handle);
        bus.unsubscribe(sub.handle);
    }

    #[test]
    fn ring_buffer_retains_recent_events() {
        let mut config = BusConfig::default();
        config.ring_buffer_size = 3;
        let bus = EventBus::new(config);
        for i in 0..5 {
            bus.publish(EventType::DashboardUpdate, Scope::default(), json!({"n": i}));
        }
        let retained = bus.events_since(0);
        assert_eq!(retained.len(), 3);
        assert_eq!(retained[0].payload["n"], 2);
    }
}
