//! # Correlator
//!
//! Awaitable request/reply on top of publish/subscribe. One instance serves
//! any number of concurrent calls; each call is isolated by its correlation
//! id.

use link_bus::{handler, CallbackId, SubscriptionMultiplexer, Transport};
use link_types::{
    describe_status, response_topic_for, BusMessage, LinkError, LinkResult, MessageKind,
    RequestEnvelope, RequestIdentity, RequestPolicy, ResponseEnvelope,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::CorrelatorConfig;
use crate::correlation::{CorrelationId, IdAllocator};
use crate::pending::{PendingCallTable, StatsSnapshot};

/// Per-call options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Priority hint passed to the remote side.
    pub priority: u8,
    /// Publish and return without waiting for a response.
    pub no_reply: bool,
    /// Overrides the configured default timeout.
    pub timeout: Option<Duration>,
    /// Use this correlation id instead of allocating one.
    pub correlation_id: Option<u32>,
}

impl CallOptions {
    #[must_use]
    pub fn no_reply() -> Self {
        Self {
            no_reply: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, id: u32) -> Self {
        self.correlation_id = Some(id);
        self
    }
}

/// How a successful call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// A matching response with status 0.
    Replied(ResponseEnvelope),
    /// `no_reply` request published; nothing to wait for.
    Sent { correlation_id: u32 },
}

impl CallOutcome {
    pub fn into_response(self) -> Option<ResponseEnvelope> {
        match self {
            CallOutcome::Replied(r) => Some(r),
            CallOutcome::Sent { .. } => None,
        }
    }

    #[must_use]
    pub fn correlation_id(&self) -> u32 {
        match self {
            CallOutcome::Replied(r) => r.correlation_id(),
            CallOutcome::Sent { correlation_id } => *correlation_id,
        }
    }
}

/// One multiplexer callback per response topic, shared by every call
/// waiting on that topic. Each delivered response reaches the pending-call
/// table exactly once, so unmatched ids are seen and counted.
struct ResponseRoute {
    callback: CallbackId,
    calls: usize,
}

/// Request/reply engine.
pub struct Correlator {
    transport: Arc<dyn Transport>,
    mux: SubscriptionMultiplexer,
    pending: Arc<PendingCallTable>,
    routes: Mutex<HashMap<String, ResponseRoute>>,
    ids: IdAllocator,
    config: CorrelatorConfig,
    shut_down: AtomicBool,
}

impl Correlator {
    pub fn new(
        transport: Arc<dyn Transport>,
        mux: SubscriptionMultiplexer,
        config: CorrelatorConfig,
    ) -> Self {
        Self::with_ids(transport, mux, config, IdAllocator::random())
    }

    /// Build with a specific id source (deterministic tests).
    pub fn with_ids(
        transport: Arc<dyn Transport>,
        mux: SubscriptionMultiplexer,
        config: CorrelatorConfig,
        ids: IdAllocator,
    ) -> Self {
        Self {
            transport,
            mux,
            pending: Arc::new(PendingCallTable::new()),
            routes: Mutex::new(HashMap::new()),
            ids,
            config,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Issue a call with a JSON parameter. `None` sends an empty parameter.
    ///
    /// # Errors
    ///
    /// `Decode` if the parameter cannot be serialized, otherwise as
    /// [`call`](Self::call).
    pub async fn call_json<P: Serialize + ?Sized>(
        &self,
        topic: &str,
        api_id: u32,
        parameter: Option<&P>,
        options: CallOptions,
    ) -> LinkResult<CallOutcome> {
        let parameter = match parameter {
            Some(p) => serde_json::to_string(p)?,
            None => String::new(),
        };
        self.call(topic, api_id, parameter, options).await
    }

    /// Issue a call and wait for its response.
    ///
    /// `topic` must end with `/request`; the response is expected on the
    /// same topic with `/response` substituted.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: bad topic, bad timeout, or pinned id already pending
    /// - `TransportUnavailable`: subscribe or publish rejected
    /// - `Timeout`: no matching response before the deadline
    /// - `RemoteError`: matching response with a nonzero status
    /// - `Cancelled`: the correlator was shut down while waiting
    pub async fn call(
        &self,
        topic: &str,
        api_id: u32,
        parameter: String,
        options: CallOptions,
    ) -> LinkResult<CallOutcome> {
        if self.is_shut_down() {
            return Err(LinkError::Cancelled);
        }
        let response_topic = response_topic_for(topic).ok_or_else(|| {
            LinkError::InvalidRequest(format!("topic {topic} does not end with /request"))
        })?;
        let timeout = self.config.resolve_timeout(options.timeout)?;
        let policy = RequestPolicy {
            priority: options.priority,
            no_reply: options.no_reply,
        };

        if options.no_reply {
            let id = options
                .correlation_id
                .map_or_else(|| self.unused_id(), CorrelationId::new);
            let request = RequestEnvelope::new(
                RequestIdentity {
                    id: id.value(),
                    api_id,
                },
                policy,
                parameter,
            );
            self.transport.publish(topic, request.into()).await?;
            info!(topic = %topic, correlation_id = %id, api_id, "Request sent (no reply)");
            return Ok(CallOutcome::Sent {
                correlation_id: id.value(),
            });
        }

        let (id, mut rx) = match options.correlation_id {
            Some(raw) => {
                let id = CorrelationId::new(raw);
                (id, self.pending.register_pinned(id, api_id, timeout)?)
            }
            None => self.pending.register(&self.ids, api_id, timeout),
        };

        // Releases the route and the pending entry on every exit path,
        // including the caller dropping this future.
        let mut guard = CallGuard {
            correlator: self,
            topic: response_topic.as_str(),
            id,
            routed: false,
        };

        // A shutdown that drained the table before this registration.
        if self.is_shut_down() {
            debug!(correlation_id = %id, "Registered after shutdown");
            return Err(LinkError::Cancelled);
        }

        self.acquire_route(&response_topic)?;
        guard.routed = true;

        let request = RequestEnvelope::new(
            RequestIdentity {
                id: id.value(),
                api_id,
            },
            policy,
            parameter,
        );
        self.transport.publish(topic, request.into()).await?;
        info!(topic = %topic, correlation_id = %id, api_id, "Request sent");

        let response = match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                debug!(correlation_id = %id, "Pending call drained");
                return Err(LinkError::Cancelled);
            }
            Err(_) => {
                if self.pending.expire(id) {
                    warn!(
                        topic = %topic,
                        correlation_id = %id,
                        api_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Request timed out"
                    );
                    return Err(LinkError::Timeout {
                        topic: topic.to_string(),
                        timeout,
                    });
                }
                // The response won the race against the deadline.
                match rx.try_recv() {
                    Ok(response) => response,
                    Err(_) => return Err(LinkError::Cancelled),
                }
            }
        };
        drop(guard);

        self.resolve(topic, response)
    }

    fn acquire_route(&self, response_topic: &str) -> LinkResult<()> {
        let mut routes = self.routes.lock();
        if let Some(route) = routes.get_mut(response_topic) {
            route.calls += 1;
            return Ok(());
        }

        let table = Arc::clone(&self.pending);
        let callback = self.mux.add_callback(
            response_topic,
            MessageKind::Response,
            handler(move |message: BusMessage| {
                if let Some(response) = message.into_response() {
                    table.complete(response);
                }
            }),
        )?;
        routes.insert(
            response_topic.to_string(),
            ResponseRoute { callback, calls: 1 },
        );
        debug!(topic = %response_topic, "Response route opened");
        Ok(())
    }

    fn release_route(&self, response_topic: &str) {
        let mut routes = self.routes.lock();
        let Some(route) = routes.get_mut(response_topic) else {
            return;
        };
        route.calls -= 1;
        if route.calls == 0 {
            if let Some(route) = routes.remove(response_topic) {
                self.mux.remove_callback(response_topic, route.callback);
                debug!(topic = %response_topic, "Response route released");
            }
        }
    }

    fn unused_id(&self) -> CorrelationId {
        loop {
            let id = self.ids.next_candidate();
            if !self.pending.is_pending(id) {
                return id;
            }
        }
    }

    fn resolve(&self, topic: &str, response: ResponseEnvelope) -> LinkResult<CallOutcome> {
        if response.is_success() {
            return Ok(CallOutcome::Replied(response));
        }
        let code = response.status_code();
        let description = describe_status(code);
        self.pending
            .stats()
            .remote_errors
            .fetch_add(1, Ordering::Relaxed);
        error!(
            topic = %topic,
            correlation_id = response.correlation_id(),
            api_id = response.header.identity.api_id,
            code,
            description,
            "Remote returned error status"
        );
        Err(LinkError::RemoteError {
            code,
            description: description.to_string(),
        })
    }

    /// Resolve every waiting call with `Cancelled` and refuse new calls.
    pub fn shutdown(&self) -> usize {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let drained = self.pending.drain();
        info!(drained, "Correlator shut down");
        drained
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.pending.snapshot()
    }

    #[must_use]
    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    #[must_use]
    pub fn multiplexer(&self) -> &SubscriptionMultiplexer {
        &self.mux
    }
}

struct CallGuard<'a> {
    correlator: &'a Correlator,
    topic: &'a str,
    id: CorrelationId,
    routed: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.correlator.pending.cancel(self.id);
        if self.routed {
            self.correlator.release_route(self.topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use link_bus::{InMemoryTransport, MultiplexerConfig};
    use link_types::status::codes;
    use link_types::{RequestIdentity, TransportError};

    const REQUEST: &str = "rt/api/sport/request";
    const RESPONSE: &str = "rt/api/sport/response";

    fn setup() -> (Arc<InMemoryTransport>, Arc<Correlator>) {
        let transport = Arc::new(InMemoryTransport::new());
        let mux = SubscriptionMultiplexer::new(transport.clone(), MultiplexerConfig::default());
        let correlator = Correlator::with_ids(
            transport.clone(),
            mux,
            CorrelatorConfig::default(),
            IdAllocator::starting_at(100),
        );
        (transport, Arc::new(correlator))
    }

    /// Answer every request on REQUEST with `code` and the request's
    /// parameter echoed as data.
    fn echo_responder(transport: &Arc<InMemoryTransport>, code: i32) {
        let publisher = transport.clone();
        transport
            .subscribe(
                REQUEST,
                MessageKind::Request,
                handler(move |message| {
                    let Some(request) = message.as_request() else {
                        return;
                    };
                    let mut response = ResponseEnvelope::success(
                        request.header.identity,
                        request.parameter.clone(),
                    );
                    response.header.status.code = code;
                    let publisher = publisher.clone();
                    tokio::spawn(async move {
                        let _ = publisher.publish(RESPONSE, response.into()).await;
                    });
                }),
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_call_resolves_with_matching_response() {
        let (transport, correlator) = setup();
        echo_responder(&transport, 0);

        let outcome = correlator
            .call(REQUEST, 1016, "hello".into(), CallOptions::default())
            .await
            .unwrap();

        let response = outcome.into_response().unwrap();
        assert_eq!(response.correlation_id(), 100);
        assert_eq!(response.data, "hello");
        assert_eq!(correlator.pending_count(), 0);
        assert_eq!(correlator.multiplexer().callback_count(RESPONSE), 0);
    }

    #[tokio::test]
    async fn test_remote_error_carries_code_and_description() {
        let (transport, correlator) = setup();
        echo_responder(&transport, codes::API_NOT_REGISTERED);

        let err = correlator
            .call(REQUEST, 1016, String::new(), CallOptions::default())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LinkError::RemoteError {
                code: 3103,
                description: "API not registered".into(),
            }
        );
        assert_eq!(correlator.stats().remote_errors, 1);
        assert_eq!(correlator.multiplexer().callback_count(RESPONSE), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_subscriber() {
        let (_transport, correlator) = setup();

        let err = correlator
            .call(
                REQUEST,
                1001,
                String::new(),
                CallOptions::default().with_timeout(Duration::from_millis(200)),
            )
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(correlator.pending_count(), 0);
        assert_eq!(correlator.stats().timeouts, 1);
        assert_eq!(correlator.multiplexer().callback_count(RESPONSE), 0);
    }

    #[tokio::test]
    async fn test_no_reply_returns_immediately() {
        let (transport, correlator) = setup();

        let outcome = correlator
            .call(REQUEST, 1003, String::new(), CallOptions::no_reply())
            .await
            .unwrap();

        assert_eq!(outcome, CallOutcome::Sent { correlation_id: 100 });
        assert_eq!(correlator.pending_count(), 0);
        assert!(!correlator.multiplexer().is_physically_subscribed(RESPONSE));
        assert_eq!(transport.published_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_topic_rejected_before_publish() {
        let (transport, correlator) = setup();

        let err = correlator
            .call("rt/api/sport", 1001, String::new(), CallOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LinkError::InvalidRequest(_)));
        assert_eq!(transport.published_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_timeout_rejected() {
        let (_transport, correlator) = setup();
        let err = correlator
            .call(
                REQUEST,
                1001,
                String::new(),
                CallOptions::default().with_timeout(Duration::ZERO),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_closed_transport_is_unavailable() {
        let (transport, correlator) = setup();
        transport.close();

        let err = correlator
            .call(REQUEST, 1001, String::new(), CallOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err, LinkError::TransportUnavailable(TransportError::Closed));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_pinned_correlation_id() {
        let (transport, correlator) = setup();
        echo_responder(&transport, 0);

        let outcome = correlator
            .call(
                REQUEST,
                1001,
                String::new(),
                CallOptions::default().with_correlation_id(7),
            )
            .await
            .unwrap();

        assert_eq!(outcome.correlation_id(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_waiting_calls() {
        let (_transport, correlator) = setup();

        let waiting = {
            let correlator = correlator.clone();
            tokio::spawn(async move {
                correlator
                    .call(REQUEST, 1001, String::new(), CallOptions::default())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(correlator.pending_count(), 1);

        assert_eq!(correlator.shutdown(), 1);
        assert_eq!(waiting.await.unwrap(), Err(LinkError::Cancelled));

        let err = correlator
            .call(REQUEST, 1001, String::new(), CallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, LinkError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_call_releases_resources() {
        let (_transport, correlator) = setup();

        let abandoned = {
            let correlator = correlator.clone();
            tokio::spawn(async move {
                correlator
                    .call(REQUEST, 1001, String::new(), CallOptions::default())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(correlator.multiplexer().callback_count(RESPONSE), 1);

        abandoned.abort();
        let _ = abandoned.await;

        assert_eq!(correlator.pending_count(), 0);
        assert_eq!(correlator.multiplexer().callback_count(RESPONSE), 0);
        assert_eq!(correlator.stats().cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmatched_and_duplicate_responses_counted_stale() {
        let (transport, correlator) = setup();

        let waiting = {
            let correlator = correlator.clone();
            tokio::spawn(async move {
                correlator
                    .call(REQUEST, 1001, String::new(), CallOptions::default())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let foreign = ResponseEnvelope::success(RequestIdentity { id: 999, api_id: 1001 }, "");
        let matching = ResponseEnvelope::success(RequestIdentity { id: 100, api_id: 1001 }, "ok");
        transport.publish(RESPONSE, foreign.into()).await.unwrap();
        transport
            .publish(RESPONSE, matching.clone().into())
            .await
            .unwrap();
        transport.publish(RESPONSE, matching.into()).await.unwrap();

        let outcome = waiting.await.unwrap().unwrap();
        assert_eq!(outcome.correlation_id(), 100);

        let stats = correlator.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.stale_dropped, 2);
        assert_eq!(correlator.multiplexer().callback_count(RESPONSE), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_share_one_route() {
        let (_transport, correlator) = setup();

        let calls: Vec<_> = (0..4)
            .map(|_| {
                let correlator = correlator.clone();
                tokio::spawn(async move {
                    correlator
                        .call(REQUEST, 1001, String::new(), CallOptions::default())
                        .await
                })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(correlator.pending_count(), 4);
        assert_eq!(correlator.multiplexer().callback_count(RESPONSE), 1);

        correlator.shutdown();
        for call in calls {
            assert_eq!(call.await.unwrap(), Err(LinkError::Cancelled));
        }
        assert_eq!(correlator.multiplexer().callback_count(RESPONSE), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_calls_racing_shutdown_resolve_cancelled() {
        for _ in 0..50 {
            let (_transport, correlator) = setup();
            let calls: Vec<_> = (0..8)
                .map(|_| {
                    let correlator = correlator.clone();
                    tokio::spawn(async move {
                        correlator
                            .call(REQUEST, 1001, String::new(), CallOptions::default())
                            .await
                    })
                })
                .collect();
            tokio::task::yield_now().await;
            correlator.shutdown();

            for call in calls {
                let outcome = tokio::time::timeout(Duration::from_secs(2), call)
                    .await
                    .expect("call outlived shutdown")
                    .unwrap();
                assert_eq!(outcome, Err(LinkError::Cancelled));
            }
            assert_eq!(correlator.pending_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_call_json_serializes_parameter() {
        let (transport, correlator) = setup();
        echo_responder(&transport, 0);

        let response = correlator
            .call_json(
                REQUEST,
                1007,
                Some(&serde_json::json!({"x": 0.1, "y": 0.0, "z": 0.0})),
                CallOptions::default(),
            )
            .await
            .unwrap()
            .into_response()
            .unwrap();

        let echoed: serde_json::Value = response.decode_data().unwrap();
        assert_eq!(echoed["x"], 0.1);
    }
}
