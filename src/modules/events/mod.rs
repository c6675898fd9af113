//! Real-time observer channel: every broadcast event as Server-Sent Events.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use bookstore_events::ChannelBroadcaster;
use bookstore_kernel::{InitCtx, Module};
use futures::Stream;
use serde_json::{json, Value};

pub struct EventsModule {
    channel: ChannelBroadcaster,
}

impl EventsModule {
    pub fn new(channel: ChannelBroadcaster) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Module for EventsModule {
    fn name(&self) -> &'static str {
        "events"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            channel_capacity = ctx.settings.events.channel_capacity,
            "events module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/stream", get(stream))
            .with_state(self.channel.clone())
    }

    fn openapi(&self) -> Option<Value> {
        Some(json!({
            "paths": {
                "/stream": {
                    "get": {
                        "summary": "Subscribe to real-time events",
                        "description": "Server-Sent Events. Event names: `newOrder`, `orderStatusUpdate`; data is the JSON payload.",
                        "tags": ["Events"],
                        "responses": {
                            "200": {
                                "description": "Event stream",
                                "content": { "text/event-stream": { "schema": { "type": "string" } } }
                            }
                        }
                    }
                }
            }
        }))
    }
}

async fn stream(
    State(channel): State<ChannelBroadcaster>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!(subscribers = channel.subscriber_count() + 1, "real-time observer connected");
    Sse::new(channel.sse_stream()).keep_alive(KeepAlive::default())
}

pub fn create_module(channel: ChannelBroadcaster) -> Arc<dyn Module> {
    Arc::new(EventsModule::new(channel))
}
