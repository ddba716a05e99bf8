//! Responders
//!
//! Fan-out seam between the orchestration core and whatever front ends are
//! attached. The core calls every responder for every event it broadcasts;
//! responders decide what to do with them. The contract is deliberately
//! one-way: responders never feed input back through this interface, they
//! submit through the orchestrator like any other source.
//!
//! Two implementations ship with the relay: [`ChannelResponder`] bridges
//! events onto per-subscriber channels (the building block for WebSocket
//! or SSE front ends), and [`LogResponder`] writes events to the tracing
//! stream for headless operation.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::events::ChatEvent;

/// Sink for chat events broadcast by the orchestrator
///
/// Implementations must not block the worker: hand the event off and
/// return. A slow or dead consumer is the responder's problem, never the
/// relay's.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Responder name for logging
    fn name(&self) -> &str;

    /// A user message was accepted for processing
    async fn broadcast_user_message(&self, event: &ChatEvent);

    /// One streaming response fragment arrived
    async fn broadcast_ai_chunk(&self, event: &ChatEvent);

    /// A response completed; the event carries the full text
    async fn broadcast_ai_end(&self, event: &ChatEvent);

    /// An exchange failed; the event carries the error text
    async fn broadcast_error(&self, event: &ChatEvent);
}

/// Identifier of one subscriber on a [`ChannelResponder`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

/// Responder that fans events out to per-subscriber channels
///
/// Front ends subscribe to get a stream of every broadcast event; dead
/// subscribers are pruned on the next broadcast that fails to reach them.
pub struct ChannelResponder {
    subscribers: DashMap<SubscriberId, mpsc::UnboundedSender<ChatEvent>>,
    next_id: AtomicU64,
}

impl Default for ChannelResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelResponder {
    /// Create a responder with no subscribers
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a subscriber and get its event stream
    pub fn subscribe(&self) -> (SubscriberId, UnboundedReceiverStream<ChatEvent>) {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(id, tx);
        tracing::debug!(subscriber = %id, "Subscriber registered");
        (id, UnboundedReceiverStream::new(rx))
    }

    /// Remove a subscriber
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            tracing::debug!(subscriber = %id, "Subscriber removed");
        }
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn deliver(&self, event: &ChatEvent) {
        let mut dead = Vec::new();
        for entry in &self.subscribers {
            if entry.value().send(event.clone()).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.subscribers.remove(&id);
            tracing::debug!(subscriber = %id, "Pruned dead subscriber");
        }
    }
}

#[async_trait]
impl Responder for ChannelResponder {
    fn name(&self) -> &str {
        "channel"
    }

    async fn broadcast_user_message(&self, event: &ChatEvent) {
        self.deliver(event);
    }

    async fn broadcast_ai_chunk(&self, event: &ChatEvent) {
        self.deliver(event);
    }

    async fn broadcast_ai_end(&self, event: &ChatEvent) {
        self.deliver(event);
    }

    async fn broadcast_error(&self, event: &ChatEvent) {
        self.deliver(event);
    }
}

/// Responder that writes events to the tracing stream
///
/// Chunks log at debug to keep streaming noise out of normal output.
pub struct LogResponder;

#[async_trait]
impl Responder for LogResponder {
    fn name(&self) -> &str {
        "log"
    }

    async fn broadcast_user_message(&self, event: &ChatEvent) {
        tracing::info!(
            id = %event.id,
            text = event.text().unwrap_or(""),
            "User message"
        );
    }

    async fn broadcast_ai_chunk(&self, event: &ChatEvent) {
        tracing::debug!(
            id = %event.id,
            len = event.text().map_or(0, str::len),
            "Response chunk"
        );
    }

    async fn broadcast_ai_end(&self, event: &ChatEvent) {
        tracing::info!(
            id = %event.id,
            len = event.text().map_or(0, str::len),
            "Response complete"
        );
    }

    async fn broadcast_error(&self, event: &ChatEvent) {
        tracing::warn!(
            id = %event.id,
            error = event.error_message().unwrap_or("unknown"),
            "Exchange failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CorrelationId, EventContext};
    use pretty_assertions::assert_eq;
    use tokio_stream::StreamExt;

    fn chunk_event(text: &str) -> ChatEvent {
        ChatEvent::ai_chunk(CorrelationId::new(), text, EventContext::new())
    }

    #[tokio::test]
    async fn test_subscribe_receives_broadcasts() {
        let responder = ChannelResponder::new();
        let (_id, mut stream) = responder.subscribe();

        responder.broadcast_ai_chunk(&chunk_event("hi")).await;

        let event = stream.next().await.unwrap();
        assert_eq!(event.text(), Some("hi"));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_all_receive() {
        let responder = ChannelResponder::new();
        let (_a, mut stream_a) = responder.subscribe();
        let (_b, mut stream_b) = responder.subscribe();

        responder.broadcast_ai_end(&chunk_event("done")).await;

        assert_eq!(stream_a.next().await.unwrap().text(), Some("done"));
        assert_eq!(stream_b.next().await.unwrap().text(), Some("done"));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let responder = ChannelResponder::new();
        let (id, _stream) = responder.subscribe();
        assert_eq!(responder.subscriber_count(), 1);

        responder.unsubscribe(id);
        assert_eq!(responder.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_dead_subscriber_pruned_on_broadcast() {
        let responder = ChannelResponder::new();
        let (_id, stream) = responder.subscribe();
        drop(stream);
        assert_eq!(responder.subscriber_count(), 1);

        responder.broadcast_ai_chunk(&chunk_event("x")).await;
        assert_eq!(responder.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_ids_unique() {
        let responder = ChannelResponder::new();
        let (a, _sa) = responder.subscribe();
        let (b, _sb) = responder.subscribe();
        assert_ne!(a, b);
    }
}
