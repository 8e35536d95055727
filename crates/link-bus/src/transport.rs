//! # Transport Adapter
//!
//! The three operations the link needs from a publish/subscribe substrate.
//! Any middleware that delivers each published message to zero or more
//! subscribers, at most once per subscriber, satisfies it.

use async_trait::async_trait;
use link_types::{BusMessage, MessageKind, TransportError};
use std::fmt;
use std::sync::Arc;

/// Callback invoked for every message delivered on a subscribed topic.
///
/// Handlers run on the transport's delivery path and must not block.
pub type MessageHandler = Arc<dyn Fn(BusMessage) + Send + Sync>;

/// Wrap a closure as a [`MessageHandler`].
pub fn handler<F>(f: F) -> MessageHandler
where
    F: Fn(BusMessage) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Identifies one physical subscription on a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub(crate) u64);

impl SubscriptionHandle {
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Publish/subscribe transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish `message` on `topic`.
    ///
    /// Returns the number of subscribers the message was handed to.
    async fn publish(&self, topic: &str, message: BusMessage) -> Result<usize, TransportError>;

    /// Establish a physical subscription.
    ///
    /// The subscription is active when this returns.
    fn subscribe(
        &self,
        topic: &str,
        kind: MessageKind,
        handler: MessageHandler,
    ) -> Result<SubscriptionHandle, TransportError>;

    /// Remove a physical subscription.
    ///
    /// Returns `false` if `handle` was not subscribed on `topic`.
    fn unsubscribe(&self, topic: &str, handle: SubscriptionHandle)
        -> Result<bool, TransportError>;

    /// Release the transport. Later calls may fail with
    /// [`TransportError::Closed`].
    fn close(&self) {}
}
