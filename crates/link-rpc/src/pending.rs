//! Pending Call Table - one entry per in-flight reply-expecting request.
//!
//! Resolution is "whoever removes the entry first": a response calls
//! [`PendingCallTable::complete`], a timeout calls
//! [`PendingCallTable::expire`], a dropped caller calls
//! [`PendingCallTable::cancel`]. `DashMap::remove` is atomic per key, so
//! exactly one of them observes the entry.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use link_types::{LinkError, ResponseEnvelope};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::correlation::{CorrelationId, IdAllocator};

/// A reply-expecting request awaiting resolution.
struct PendingCall {
    sender: oneshot::Sender<ResponseEnvelope>,
    created_at: Instant,
    api_id: u32,
}

/// Counters for the pending-call table.
#[derive(Debug, Default)]
pub struct PendingStats {
    pub registered: AtomicU64,
    pub completed: AtomicU64,
    pub remote_errors: AtomicU64,
    pub timeouts: AtomicU64,
    pub cancelled: AtomicU64,
    /// Responses whose id matched no pending call.
    pub stale_dropped: AtomicU64,
}

/// Point-in-time copy of [`PendingStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub registered: u64,
    pub completed: u64,
    pub remote_errors: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub stale_dropped: u64,
    pub pending: u64,
}

pub struct PendingCallTable {
    pending: DashMap<CorrelationId, PendingCall>,
    stats: PendingStats,
}

impl PendingCallTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            stats: PendingStats::default(),
        }
    }

    /// Register a call under a fresh id from `ids`, skipping ids that are
    /// still pending.
    pub fn register(
        &self,
        ids: &IdAllocator,
        api_id: u32,
        timeout: Duration,
    ) -> (CorrelationId, oneshot::Receiver<ResponseEnvelope>) {
        loop {
            let id = ids.next_candidate();
            if let Ok(rx) = self.try_insert(id, api_id, timeout) {
                return (id, rx);
            }
            debug!(correlation_id = %id, "Correlation id still pending, skipping");
        }
    }

    /// Register a call under a caller-chosen id.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if `id` is already pending.
    pub fn register_pinned(
        &self,
        id: CorrelationId,
        api_id: u32,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<ResponseEnvelope>, LinkError> {
        self.try_insert(id, api_id, timeout).map_err(|()| {
            LinkError::InvalidRequest(format!("correlation id {id} is already pending"))
        })
    }

    fn try_insert(
        &self,
        id: CorrelationId,
        api_id: u32,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<ResponseEnvelope>, ()> {
        match self.pending.entry(id) {
            Entry::Occupied(_) => Err(()),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(PendingCall {
                    sender: tx,
                    created_at: Instant::now(),
                    api_id,
                });
                self.stats.registered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %id,
                    api_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Registered pending call"
                );
                Ok(rx)
            }
        }
    }

    /// Resolve the call matching `response`'s correlation id.
    ///
    /// Returns `false` if no call is pending under that id; the response is
    /// then dropped and counted as stale.
    pub fn complete(&self, response: ResponseEnvelope) -> bool {
        let id = CorrelationId::new(response.correlation_id());
        let Some((_, call)) = self.pending.remove(&id) else {
            self.stats.stale_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(correlation_id = %id, "Dropping response with no pending call");
            return false;
        };

        let elapsed = call.created_at.elapsed();
        match call.sender.send(response) {
            Ok(()) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %id,
                    api_id = call.api_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Response received"
                );
                true
            }
            Err(_) => {
                self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %id, "Caller gone before response arrived");
                false
            }
        }
    }

    /// Remove a call whose deadline passed. `false` if it was already resolved.
    pub fn expire(&self, id: CorrelationId) -> bool {
        if self.pending.remove(&id).is_some() {
            self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Remove a call abandoned by its caller. `false` if it was already resolved.
    pub fn cancel(&self, id: CorrelationId) -> bool {
        if self.pending.remove(&id).is_some() {
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(correlation_id = %id, "Pending call cancelled");
            true
        } else {
            false
        }
    }

    /// Drop every pending call. Waiting callers observe a closed channel.
    pub fn drain(&self) -> usize {
        let ids: Vec<CorrelationId> = self.pending.iter().map(|e| *e.key()).collect();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    #[must_use]
    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.pending.contains_key(&id)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            registered: self.stats.registered.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
            remote_errors: self.stats.remote_errors.load(Ordering::Relaxed),
            timeouts: self.stats.timeouts.load(Ordering::Relaxed),
            cancelled: self.stats.cancelled.load(Ordering::Relaxed),
            stale_dropped: self.stats.stale_dropped.load(Ordering::Relaxed),
            pending: self.pending.len() as u64,
        }
    }
}

impl Default for PendingCallTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use link_types::RequestIdentity;

    fn response_for(id: CorrelationId) -> ResponseEnvelope {
        ResponseEnvelope::success(
            RequestIdentity {
                id: id.value(),
                api_id: 1001,
            },
            "",
        )
    }

    #[tokio::test]
    async fn test_register_and_complete() {
        let table = PendingCallTable::new();
        let ids = IdAllocator::starting_at(10);

        let (id, rx) = table.register(&ids, 1001, Duration::from_secs(1));
        assert_eq!(id.value(), 10);
        assert!(table.is_pending(id));

        assert!(table.complete(response_for(id)));
        let response = rx.await.unwrap();
        assert_eq!(response.correlation_id(), 10);
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_second_resolution_is_noop() {
        let table = PendingCallTable::new();
        let ids = IdAllocator::starting_at(1);
        let (id, _rx) = table.register(&ids, 1001, Duration::from_secs(1));

        assert!(table.complete(response_for(id)));
        assert!(!table.complete(response_for(id)));
        assert!(!table.expire(id));
        assert!(!table.cancel(id));

        let stats = table.snapshot();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.stale_dropped, 1);
        assert_eq!(stats.timeouts, 0);
    }

    #[tokio::test]
    async fn test_expired_call_ignores_late_response() {
        let table = PendingCallTable::new();
        let ids = IdAllocator::starting_at(1);
        let (id, mut rx) = table.register(&ids, 1001, Duration::from_secs(1));

        assert!(table.expire(id));
        assert!(!table.complete(response_for(id)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_register_skips_pending_ids() {
        let table = PendingCallTable::new();
        let ids = IdAllocator::starting_at(5);
        let _pinned = table
            .register_pinned(CorrelationId::new(5), 1001, Duration::from_secs(1))
            .unwrap();

        let (id, _rx) = table.register(&ids, 1001, Duration::from_secs(1));
        assert_eq!(id.value(), 6);
    }

    #[tokio::test]
    async fn test_pinned_duplicate_rejected() {
        let table = PendingCallTable::new();
        let _rx = table
            .register_pinned(CorrelationId::new(9), 1001, Duration::from_secs(1))
            .unwrap();
        let err = table
            .register_pinned(CorrelationId::new(9), 1001, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, LinkError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_drain_closes_receivers() {
        let table = PendingCallTable::new();
        let ids = IdAllocator::starting_at(1);
        let (_, rx1) = table.register(&ids, 1001, Duration::from_secs(1));
        let (_, rx2) = table.register(&ids, 1002, Duration::from_secs(1));

        assert_eq!(table.drain(), 2);
        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
        assert_eq!(table.snapshot().cancelled, 2);
    }
}
