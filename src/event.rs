//! Lifecycle event channel for observability consumers
//!
//! Events are for logging and monitoring, not control flow: dropping or
//! missing an event never affects queue behavior.

use chrono::{DateTime, Utc};
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;

/// Lane lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneEvent {
    /// Event key (e.g., "envelope.dispatched", "lane.cleared")
    pub key: String,

    /// Structured event fields
    pub fields: serde_json::Map<String, serde_json::Value>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl LaneEvent {
    /// Create a new event with no fields
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a field (builder pattern)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}

/// Event emitter backed by a broadcast channel
///
/// Cloning is cheap; all clones share the same channel. Emitting with no
/// subscribers is a no-op.
#[derive(Clone)]
pub struct EventEmitter {
    sender: Arc<broadcast::Sender<LaneEvent>>,
}

impl EventEmitter {
    /// Create a new event emitter with the given buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Emit an event
    pub fn emit(&self, event: LaneEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<LaneEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to filtered events as an `EventStream` (implements `Stream`)
    pub fn subscribe_filtered(
        &self,
        filter: impl Fn(&LaneEvent) -> bool + Send + Sync + 'static,
    ) -> EventStream {
        use tokio_stream::wrappers::BroadcastStream;
        use tokio_stream::StreamExt as TokioStreamExt;
        let stream = BroadcastStream::new(self.sender.subscribe())
            .filter_map(|r: Result<LaneEvent, _>| r.ok())
            .filter(move |e| filter(e));
        EventStream {
            inner: Box::pin(stream),
        }
    }

    /// Subscribe to all events as an `EventStream` (implements `Stream`)
    pub fn subscribe_stream(&self) -> EventStream {
        self.subscribe_filtered(|_| true)
    }
}

/// Event stream implementing `futures_core::Stream<Item = LaneEvent>`.
///
/// Returned by [`EventEmitter::subscribe_filtered`] and
/// [`EventEmitter::subscribe_stream`]. Use `.next().await` via `StreamExt`
/// from `tokio_stream` or `futures`, or call the convenience
/// [`EventStream::recv`] method directly.
pub struct EventStream {
    inner: Pin<Box<dyn Stream<Item = LaneEvent> + Send>>,
}

impl Stream for EventStream {
    type Item = LaneEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl EventStream {
    /// Receive the next matching event (convenience wrapper around `Stream::poll_next`)
    pub async fn recv(&mut self) -> Option<LaneEvent> {
        use tokio_stream::StreamExt;
        self.next().await
    }
}

/// Event catalog - predefined event keys
pub mod events {
    // Lane lifecycle
    pub const LANE_CREATED: &str = "lane.created";
    pub const LANE_IDLE: &str = "lane.idle";
    pub const LANE_CLEARED: &str = "lane.cleared";
    pub const LANE_REMOVED: &str = "lane.removed";

    // Envelope lifecycle
    pub const ENVELOPE_QUEUED: &str = "envelope.queued";
    pub const ENVELOPE_DISPATCHED: &str = "envelope.dispatched";
    pub const ENVELOPE_COMPLETED: &str = "envelope.completed";
    pub const ENVELOPE_FAILED: &str = "envelope.failed";
    pub const ENVELOPE_TIMED_OUT: &str = "envelope.timed_out";

    // Group lifecycle
    pub const GROUP_SHUTDOWN: &str = "group.shutdown";
}
