//! SSEGateway: frames an `EventBus` subscription as the §6 text/event-stream
//! wire format, with heartbeats and `Last-Event-ID` resume.
//!
//! The framed-line-writer shape follows the teacher's thin-adapter-over-a-
//! core-stream idiom (no teacher module frames text directly, so this is
//! new code grounded on the bus's own subscription contract plus the wire
//! format the spec names literally).

use crate::config::SseConfig;
use crate::event_bus::{BackpressureMode, EventBus, SubscriptionHandle};
use crate::models::{DomainEvent, Filter};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::instrument;

/// One line-framed SSE message: `id: N\nevent: TYPE\ndata: JSON\n\n`, or a
/// bare `: heartbeat\n\n` comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event(String),
    Heartbeat,
    Resync,
}

impl Frame {
    pub fn to_wire(&self) -> String {
        match self {
            Frame::Event(s) => s.clone(),
            Frame::Heartbeat => ": heartbeat\n\n".to_string(),
            Frame::Resync => "event: resync\ndata: {}\n\n".to_string(),
        }
    }
}

fn frame_event(event: &DomainEvent) -> Frame {
    let event_name = serde_json::to_value(&event.event_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "event".to_string());
    let data = serde_json::to_string(&event.payload).unwrap_or_else(|_| "null".to_string());
    Frame::Event(format!("id: {}\nevent: {}\ndata: {}\n\n", event.sequence, event_name, data))
}

pub struct SseGateway {
    bus: Arc<EventBus>,
    config: SseConfig,
}

impl SseGateway {
    pub fn new(bus: Arc<EventBus>, config: SseConfig) -> Self {
        Self { bus, config }
    }

    /// Opens a fresh subscription with no replay. Returns the handle (for
    /// `unsubscribe` on disconnect) and a frame stream the caller drives.
    pub fn open(&self, filter: Filter) -> (SubscriptionHandle, FrameStream) {
        let sub = self.bus.subscribe(filter, BackpressureMode::DropOldest);
        (sub.handle, FrameStream { rx: sub.rx, heartbeat: interval(Duration::from_millis(self.config.heartbeat_ms)) })
    }

    /// Resumes from a client-supplied `Last-Event-ID`. If the bus no longer
    /// retains `last_event_id + 1` (ring buffer eviction), emits a single
    /// `resync` frame instead of the backlog and the caller must refetch a
    /// snapshot before relying on the live stream.
    #[instrument(skip(self))]
    pub fn resume(&self, filter: Filter, last_event_id: u64) -> (SubscriptionHandle, Vec<Frame>, FrameStream) {
        let backlog = self.bus.events_since(last_event_id);
        let needs_resync = match self.bus.oldest_retained_sequence() {
            Some(oldest) => oldest > last_event_id + 1 && last_event_id > 0,
            None => false,
        };
        let sub = self.bus.subscribe(filter.clone(), BackpressureMode::DropOldest);
        let mut frames: Vec<Frame> = Vec::new();
        if needs_resync {
            frames.push(Frame::Resync);
        } else {
            frames.extend(backlog.iter().filter(|e| filter.matches(e)).map(frame_event));
        }
        (sub.handle, frames, FrameStream { rx: sub.rx, heartbeat: interval(Duration::from_millis(self.config.heartbeat_ms)) })
    }

    /// Called on client disconnect: unsubscribes and marks the stream closed.
    pub fn close(&self, handle: SubscriptionHandle) {
        self.bus.unsubscribe(handle);
    }
}

/// Next frame to write to the client: either a live bus event or a
/// heartbeat on the configured cadence, whichever is ready first.
pub struct FrameStream {
    rx: tokio::sync::mpsc::Receiver<DomainEvent>,
    heartbeat: tokio::time::Interval,
}

impl FrameStream {
    pub async fn next_frame(&mut self) -> Option<Frame> {
        tokio::select! {
            biased;
            event = self.rx.recv() => event.as_ref().map(frame_event),
            _ = self.heartbeat.tick() => Some(Frame::Heartbeat),
        }
    }
}
