//! # In-Memory Transport
//!
//! Single-process transport. Topics are typed on first use; delivery is a
//! synchronous fan-out to a snapshot of the topic's handlers, taken under
//! the lock and invoked after releasing it, so handlers may subscribe,
//! unsubscribe or publish without deadlocking.

use async_trait::async_trait;
use link_types::{BusMessage, MessageKind, TransportError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, trace};

use crate::transport::{MessageHandler, SubscriptionHandle, Transport};

struct TopicState {
    kind: MessageKind,
    handlers: Vec<(SubscriptionHandle, MessageHandler)>,
}

/// In-process implementation of [`Transport`].
pub struct InMemoryTransport {
    topics: RwLock<HashMap<String, TopicState>>,
    next_handle: AtomicU64,
    published: AtomicU64,
    closed: AtomicBool,
}

impl InMemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            published: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Stop accepting traffic. Existing subscriptions are dropped.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.topics.write().clear();
            debug!("In-memory transport closed");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Physical subscriptions currently active on `topic`.
    #[must_use]
    pub fn subscription_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map_or(0, |state| state.handlers.len())
    }

    /// Messages accepted by `publish` since creation.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_kind(topic: &str, state: &TopicState, actual: MessageKind) -> Result<(), TransportError> {
        if state.kind == actual {
            Ok(())
        } else {
            Err(TransportError::TypeMismatch {
                topic: topic.to_string(),
                expected: state.kind,
                actual,
            })
        }
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(&self, topic: &str, message: BusMessage) -> Result<usize, TransportError> {
        self.ensure_open()?;
        let kind = message.kind();

        let snapshot: Vec<MessageHandler> = {
            let mut topics = self.topics.write();
            let state = topics.entry(topic.to_string()).or_insert_with(|| TopicState {
                kind,
                handlers: Vec::new(),
            });
            Self::check_kind(topic, state, kind)?;
            state.handlers.iter().map(|(_, h)| h.clone()).collect()
        };

        self.published.fetch_add(1, Ordering::Relaxed);
        trace!(topic = %topic, kind = %kind, receivers = snapshot.len(), "Publishing message");

        let receivers = snapshot.len();
        match snapshot.split_last() {
            None => {}
            Some((last, rest)) => {
                for h in rest {
                    h(message.clone());
                }
                last(message);
            }
        }
        Ok(receivers)
    }

    fn subscribe(
        &self,
        topic: &str,
        kind: MessageKind,
        handler: MessageHandler,
    ) -> Result<SubscriptionHandle, TransportError> {
        self.ensure_open()?;
        let mut topics = self.topics.write();
        let state = topics.entry(topic.to_string()).or_insert_with(|| TopicState {
            kind,
            handlers: Vec::new(),
        });
        Self::check_kind(topic, state, kind)?;

        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        state.handlers.push((handle, handler));
        debug!(topic = %topic, handle = %handle, "Physical subscription created");
        Ok(handle)
    }

    fn unsubscribe(
        &self,
        topic: &str,
        handle: SubscriptionHandle,
    ) -> Result<bool, TransportError> {
        self.ensure_open()?;
        let mut topics = self.topics.write();
        let Some(state) = topics.get_mut(topic) else {
            return Ok(false);
        };
        let before = state.handlers.len();
        state.handlers.retain(|(h, _)| *h != handle);
        let removed = state.handlers.len() != before;
        if removed {
            debug!(topic = %topic, handle = %handle, "Physical subscription removed");
        }
        Ok(removed)
    }

    fn close(&self) {
        InMemoryTransport::close(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::handler;
    use link_types::ResponseEnvelope;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn counting_handler() -> (MessageHandler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            handler(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            count,
        )
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let transport = InMemoryTransport::new();
        let (h1, c1) = counting_handler();
        let (h2, c2) = counting_handler();
        transport.subscribe("t", MessageKind::Text, h1).unwrap();
        transport.subscribe("t", MessageKind::Text, h2).unwrap();

        let delivered = transport
            .publish("t", BusMessage::Text("hi".into()))
            .await
            .unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(c1.load(Ordering::SeqCst), 1);
        assert_eq!(c2.load(Ordering::SeqCst), 1);
        assert_eq!(transport.published_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let transport = InMemoryTransport::new();
        let delivered = transport
            .publish("nobody", BusMessage::Text(String::new()))
            .await
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_topic_kind_is_fixed_on_first_use() {
        let transport = InMemoryTransport::new();
        let (h, _) = counting_handler();
        transport.subscribe("t", MessageKind::Response, h).unwrap();

        let err = transport
            .publish("t", BusMessage::Text("x".into()))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TransportError::TypeMismatch {
                topic: "t".into(),
                expected: MessageKind::Response,
                actual: MessageKind::Text,
            }
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let transport = InMemoryTransport::new();
        let (h, count) = counting_handler();
        let handle = transport.subscribe("t", MessageKind::Response, h).unwrap();

        assert!(transport.unsubscribe("t", handle).unwrap());
        assert!(!transport.unsubscribe("t", handle).unwrap());
        transport
            .publish("t", ResponseEnvelope::default().into())
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(transport.subscription_count("t"), 0);
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_everything() {
        let transport = InMemoryTransport::new();
        transport.close();

        let (h, _) = counting_handler();
        assert_eq!(
            transport.subscribe("t", MessageKind::Text, h).unwrap_err(),
            TransportError::Closed
        );
        assert_eq!(
            transport
                .publish("t", BusMessage::Text(String::new()))
                .await
                .unwrap_err(),
            TransportError::Closed
        );
    }

    #[tokio::test]
    async fn test_handler_may_subscribe_reentrantly() {
        let transport = Arc::new(InMemoryTransport::new());
        let inner = transport.clone();
        transport
            .subscribe(
                "outer",
                MessageKind::Text,
                handler(move |_| {
                    inner
                        .subscribe("inner", MessageKind::Text, handler(|_| {}))
                        .unwrap();
                }),
            )
            .unwrap();

        transport
            .publish("outer", BusMessage::Text(String::new()))
            .await
            .unwrap();

        assert_eq!(transport.subscription_count("inner"), 1);
    }
}
