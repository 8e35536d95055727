//! # Subscription Multiplexer
//!
//! Maps any number of logical callbacks onto one physical subscription per
//! topic.
//!
//! ## Entry lifecycle
//!
//! ```text
//!   add_callback (first)         remove_callback (last)        grace elapsed
//! ─────────────────────▶ ACTIVE ───────────────────────▶ DRAINING ──────────▶ (gone)
//!   physical subscribe     ▲                                 │   physical unsubscribe
//!                          └──────── add_callback ───────────┘
//!                               teardown cancelled, no churn
//! ```
//!
//! All table mutation happens under one lock, so the physical subscription
//! count per topic is always 0 or 1.
//!
//! ## Known limitation
//!
//! A message published before the first physical subscription on a topic
//! takes effect is not delivered. The subscribe happens synchronously inside
//! `add_callback`, so this only matters for transports whose subscriptions
//! become active asynchronously.

use link_types::{BusMessage, MessageKind, TransportError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::MultiplexerConfig;
use crate::transport::{MessageHandler, SubscriptionHandle, Transport};

/// Identity of a logical callback; closures have no equality of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb-{}", self.0)
    }
}

/// Result of removing a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Removed; other callbacks remain on the topic.
    Removed,
    /// Removed the last callback; physical teardown is scheduled.
    TeardownScheduled,
    /// The topic has no active subscription. Reported, not fatal.
    NotSubscribed,
    /// The topic is subscribed but this callback is not registered on it.
    UnknownCallback,
}

impl RemoveOutcome {
    /// True for the two no-op outcomes.
    #[must_use]
    pub fn is_noop(self) -> bool {
        matches!(self, RemoveOutcome::NotSubscribed | RemoveOutcome::UnknownCallback)
    }
}

type CallbackSet = Arc<RwLock<Vec<(CallbackId, MessageHandler)>>>;

struct ScheduledTeardown {
    at: Instant,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

struct TopicEntry {
    kind: MessageKind,
    callbacks: CallbackSet,
    physical: Option<SubscriptionHandle>,
    teardown: Option<ScheduledTeardown>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    config: MultiplexerConfig,
    entries: Mutex<HashMap<String, TopicEntry>>,
    next_callback: AtomicU64,
    generation: AtomicU64,
    physical_subscribes: AtomicU64,
    physical_unsubscribes: AtomicU64,
    shut_down: AtomicBool,
}

/// Reference-counted subscription table keyed by topic.
#[derive(Clone)]
pub struct SubscriptionMultiplexer {
    inner: Arc<Inner>,
}

impl SubscriptionMultiplexer {
    pub fn new(transport: Arc<dyn Transport>, config: MultiplexerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                entries: Mutex::new(HashMap::new()),
                next_callback: AtomicU64::new(1),
                generation: AtomicU64::new(0),
                physical_subscribes: AtomicU64::new(0),
                physical_unsubscribes: AtomicU64::new(0),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Register `handler` for messages of `kind` on `topic`.
    ///
    /// The first callback on a topic establishes the physical subscription
    /// before this returns. A callback added while teardown is pending
    /// cancels the teardown and reuses the existing subscription.
    ///
    /// # Errors
    ///
    /// The transport's error if the physical subscribe fails, a
    /// `TypeMismatch` if the topic is already multiplexed for another kind,
    /// and `Closed` after [`shutdown`](Self::shutdown).
    pub fn add_callback(
        &self,
        topic: &str,
        kind: MessageKind,
        handler: MessageHandler,
    ) -> Result<CallbackId, TransportError> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let id = CallbackId(self.inner.next_callback.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.inner.entries.lock();

        if let Some(entry) = entries.get_mut(topic) {
            if entry.kind != kind {
                return Err(TransportError::TypeMismatch {
                    topic: topic.to_string(),
                    expected: entry.kind,
                    actual: kind,
                });
            }
            entry.callbacks.write().push((id, handler));
            if let Some(teardown) = entry.teardown.take() {
                if let Some(task) = teardown.task {
                    task.abort();
                }
                debug!(topic = %topic, "Deferred unsubscribe cancelled");
            }
            debug!(topic = %topic, callback = %id, "Callback added to existing subscription");
            return Ok(id);
        }

        let callbacks: CallbackSet = Arc::new(RwLock::new(vec![(id, handler)]));
        let dispatch = dispatcher(callbacks.clone());
        let physical = self.inner.transport.subscribe(topic, kind, dispatch)?;
        self.inner.physical_subscribes.fetch_add(1, Ordering::Relaxed);

        entries.insert(
            topic.to_string(),
            TopicEntry {
                kind,
                callbacks,
                physical: Some(physical),
                teardown: None,
            },
        );
        debug!(topic = %topic, callback = %id, handle = %physical, "Subscribed");
        Ok(id)
    }

    /// Remove a callback. Removing the last one schedules teardown after
    /// the grace window instead of unsubscribing immediately.
    pub fn remove_callback(&self, topic: &str, id: CallbackId) -> RemoveOutcome {
        let mut entries = self.inner.entries.lock();
        let Some(entry) = entries.get_mut(topic) else {
            warn!(topic = %topic, callback = %id, "Remove callback on topic with no subscription");
            return RemoveOutcome::NotSubscribed;
        };

        let now_empty = {
            let mut callbacks = entry.callbacks.write();
            let Some(pos) = callbacks.iter().position(|(cb, _)| *cb == id) else {
                warn!(topic = %topic, callback = %id, "Remove of unknown callback");
                return RemoveOutcome::UnknownCallback;
            };
            callbacks.remove(pos);
            callbacks.is_empty()
        };

        if !now_empty {
            debug!(topic = %topic, callback = %id, "Callback removed");
            return RemoveOutcome::Removed;
        }

        self.schedule_teardown(&mut entries, topic);
        RemoveOutcome::TeardownScheduled
    }

    /// Drop every callback on `topic` and schedule teardown.
    pub fn unsubscribe_topic(&self, topic: &str) -> RemoveOutcome {
        let mut entries = self.inner.entries.lock();
        let Some(entry) = entries.get_mut(topic) else {
            warn!(topic = %topic, "Unsubscribe on topic with no subscription");
            return RemoveOutcome::NotSubscribed;
        };
        if entry.teardown.is_some() {
            return RemoveOutcome::TeardownScheduled;
        }
        entry.callbacks.write().clear();
        self.schedule_teardown(&mut entries, topic);
        RemoveOutcome::TeardownScheduled
    }

    /// Cancel every pending teardown and remove every physical subscription
    /// now. Later `add_callback` calls fail with `Closed`.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<(String, TopicEntry)> = self.inner.entries.lock().drain().collect();
        let count = drained.len();
        for (topic, mut entry) in drained {
            if let Some(task) = entry.teardown.take().and_then(|t| t.task) {
                task.abort();
            }
            entry.callbacks.write().clear();
            self.inner.unsubscribe_physical(&topic, entry.physical.take());
        }
        info!(topics = count, "Subscription multiplexer shut down");
    }

    fn schedule_teardown(&self, entries: &mut HashMap<String, TopicEntry>, topic: &str) {
        let grace = self.inner.config.teardown_grace;
        let runtime = tokio::runtime::Handle::try_current().ok();

        let (Some(runtime), false) = (runtime, grace.is_zero()) else {
            if let Some(mut entry) = entries.remove(topic) {
                self.inner.unsubscribe_physical(topic, entry.physical.take());
            }
            return;
        };

        let Some(entry) = entries.get_mut(topic) else {
            return;
        };
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let owned_topic = topic.to_string();
        let task = runtime.spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = weak.upgrade() {
                inner.finish_teardown(&owned_topic, generation);
            }
        });

        entry.teardown = Some(ScheduledTeardown {
            at: Instant::now() + grace,
            generation,
            task: Some(task),
        });
        debug!(
            topic = %topic,
            grace_ms = grace.as_millis() as u64,
            "Deferred unsubscribe scheduled"
        );
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn is_physically_subscribed(&self, topic: &str) -> bool {
        self.inner
            .entries
            .lock()
            .get(topic)
            .is_some_and(|e| e.physical.is_some())
    }

    #[must_use]
    pub fn callback_count(&self, topic: &str) -> usize {
        self.inner
            .entries
            .lock()
            .get(topic)
            .map_or(0, |e| e.callbacks.read().len())
    }

    /// When the pending teardown of `topic` fires, if one is scheduled.
    #[must_use]
    pub fn teardown_scheduled_at(&self, topic: &str) -> Option<Instant> {
        self.inner
            .entries
            .lock()
            .get(topic)
            .and_then(|e| e.teardown.as_ref().map(|t| t.at))
    }

    /// Topics with an entry (active or draining).
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Physical subscribes issued since creation.
    #[must_use]
    pub fn physical_subscribes(&self) -> u64 {
        self.inner.physical_subscribes.load(Ordering::Relaxed)
    }

    /// Physical unsubscribes issued since creation.
    #[must_use]
    pub fn physical_unsubscribes(&self) -> u64 {
        self.inner.physical_unsubscribes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn config(&self) -> &MultiplexerConfig {
        &self.inner.config
    }
}

impl Inner {
    fn finish_teardown(&self, topic: &str, generation: u64) {
        let mut entries = self.entries.lock();
        let due = entries.get(topic).is_some_and(|e| {
            e.teardown.as_ref().is_some_and(|t| t.generation == generation)
                && e.callbacks.read().is_empty()
        });
        if !due {
            return;
        }
        if let Some(mut entry) = entries.remove(topic) {
            self.unsubscribe_physical(topic, entry.physical.take());
            info!(topic = %topic, "Deferred unsubscribe executed");
        }
    }

    fn unsubscribe_physical(&self, topic: &str, handle: Option<SubscriptionHandle>) {
        let Some(handle) = handle else {
            return;
        };
        self.physical_unsubscribes.fetch_add(1, Ordering::Relaxed);
        match self.transport.unsubscribe(topic, handle) {
            Ok(true) => debug!(topic = %topic, handle = %handle, "Unsubscribed"),
            Ok(false) => warn!(topic = %topic, handle = %handle, "Transport had no such subscription"),
            Err(e) => warn!(topic = %topic, handle = %handle, error = %e, "Physical unsubscribe failed"),
        }
    }
}

/// Build the single physical handler that fans a message out to the
/// topic's logical callbacks.
fn dispatcher(callbacks: CallbackSet) -> MessageHandler {
    Arc::new(move |message: BusMessage| {
        let snapshot: Vec<MessageHandler> =
            callbacks.read().iter().map(|(_, h)| h.clone()).collect();
        for h in snapshot {
            h(message.clone());
        }
    })
}
