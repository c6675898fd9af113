//! Event bus primitives.
//!
//! Components that announce something to connected observers receive an
//! `Arc<dyn Broadcaster>` instead of reaching for a process-wide socket
//! handle. [`ChannelBroadcaster`] fans events out over a tokio broadcast
//! channel and can be exposed as a Server-Sent Events stream;
//! [`NoopBroadcaster`] drops everything.

use std::convert::Infallible;

use axum::response::sse::Event as SseEvent;
use futures::{Stream, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

/// One named event with a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub name: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("failed to encode payload for event '{event}': {source}")]
    Encode {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Capability to announce events to every connected observer.
pub trait Broadcaster: Send + Sync {
    /// Emit `event` to current subscribers. Having no subscribers is not an
    /// error; returns how many observers the event reached.
    fn emit(&self, event: &str, payload: serde_json::Value) -> Result<usize, EventError>;
}

/// Serialize `payload` and emit it.
pub fn emit_json<P: Serialize>(
    broadcaster: &dyn Broadcaster,
    event: &str,
    payload: &P,
) -> Result<usize, EventError> {
    let payload = serde_json::to_value(payload).map_err(|source| EventError::Encode {
        event: event.to_string(),
        source,
    })?;
    broadcaster.emit(event, payload)
}

/// Broadcaster backed by a tokio broadcast channel.
#[derive(Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<Event>,
}

impl ChannelBroadcaster {
    /// Create a broadcaster buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// A stream of SSE frames for one observer. Events missed while the
    /// observer lagged are skipped.
    pub fn sse_stream(&self) -> impl Stream<Item = Result<SseEvent, Infallible>> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|item| async move {
            match item {
                Ok(event) => Some(Ok(SseEvent::default()
                    .event(event.name)
                    .data(event.payload.to_string()))),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "real-time observer lagged behind");
                    None
                }
            }
        })
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn emit(&self, event: &str, payload: serde_json::Value) -> Result<usize, EventError> {
        let delivered = self
            .tx
            .send(Event {
                name: event.to_string(),
                payload,
            })
            .unwrap_or(0);
        tracing::debug!(event, delivered, "event broadcast");
        Ok(delivered)
    }
}

/// Broadcaster that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn emit(&self, event: &str, _payload: serde_json::Value) -> Result<usize, EventError> {
        tracing::trace!(event, "event discarded");
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let broadcaster = ChannelBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();

        let delivered = broadcaster
            .emit("newOrder", json!({"orderId": "o-1"}))
            .unwrap();
        assert_eq!(delivered, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "newOrder");
        assert_eq!(event.payload["orderId"], "o-1");
    }

    #[test]
    fn emitting_without_subscribers_is_fine() {
        let broadcaster = ChannelBroadcaster::new(8);
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert_eq!(broadcaster.emit("newOrder", json!({})).unwrap(), 0);
        assert_eq!(NoopBroadcaster.emit("newOrder", json!({})).unwrap(), 0);
    }

    #[tokio::test]
    async fn emit_json_serializes_payload() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct StatusChanged {
            order_id: &'static str,
            status: &'static str,
        }

        let broadcaster = ChannelBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();
        emit_json(
            &broadcaster,
            "orderStatusUpdate",
            &StatusChanged {
                order_id: "o-1",
                status: "completed",
            },
        )
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.payload, json!({"orderId": "o-1", "status": "completed"}));
    }

    #[tokio::test]
    async fn sse_stream_yields_frames() {
        let broadcaster = ChannelBroadcaster::new(8);
        let stream = broadcaster.sse_stream();
        tokio::pin!(stream);

        broadcaster.emit("newOrder", json!({"orderId": "o-2"})).unwrap();
        let frame = stream.next().await;
        assert!(matches!(frame, Some(Ok(_))));
    }
}
