//! Property tests for correlation isolation and single resolution.

use link_bus::{handler, InMemoryTransport, MultiplexerConfig, SubscriptionMultiplexer, Transport};
use link_rpc::{CallOptions, Correlator, CorrelatorConfig, IdAllocator};
use link_types::{LinkError, MessageKind, RequestEnvelope, ResponseEnvelope};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const REQUEST: &str = "rt/api/motion_switcher/request";
const RESPONSE: &str = "rt/api/motion_switcher/response";

struct Harness {
    transport: Arc<InMemoryTransport>,
    correlator: Arc<Correlator>,
    requests: mpsc::UnboundedReceiver<RequestEnvelope>,
}

fn harness(start_id: u32) -> Harness {
    let transport = Arc::new(InMemoryTransport::new());
    let mux = SubscriptionMultiplexer::new(transport.clone(), MultiplexerConfig::default());
    let correlator = Arc::new(Correlator::with_ids(
        transport.clone(),
        mux,
        CorrelatorConfig::default(),
        IdAllocator::starting_at(start_id),
    ));

    let (tx, requests) = mpsc::unbounded_channel();
    transport
        .subscribe(
            REQUEST,
            MessageKind::Request,
            handler(move |message| {
                if let Some(request) = message.as_request() {
                    let _ = tx.send(request.clone());
                }
            }),
        )
        .expect("subscribe requests");

    Harness {
        transport,
        correlator,
        requests,
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Each concurrent call resolves only with the response carrying its own
    /// id, whatever order the responses arrive in, and duplicates are inert.
    #[test]
    fn prop_responses_reach_only_their_caller(
        order in (1usize..12).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle()),
        start_id in prop_oneof![Just(u32::MAX - 4), 0u32..1_000_000],
        duplicate in any::<bool>(),
    ) {
        let n = order.len();
        let results = runtime().block_on(async move {
            let mut h = harness(start_id);

            let calls: Vec<_> = (0..n)
                .map(|i| {
                    let correlator = h.correlator.clone();
                    tokio::spawn(async move {
                        correlator
                            .call(REQUEST, 1001, format!("call-{i}"), CallOptions::default())
                            .await
                    })
                })
                .collect();

            let mut received = Vec::with_capacity(n);
            for _ in 0..n {
                received.push(h.requests.recv().await.expect("request"));
            }

            for &index in &order {
                let request = &received[index];
                let response = ResponseEnvelope::success(
                    request.header.identity,
                    request.parameter.clone(),
                );
                h.transport.publish(RESPONSE, response.clone().into()).await.expect("publish");
                if duplicate {
                    h.transport.publish(RESPONSE, response.into()).await.expect("publish");
                }
            }

            let mut results = Vec::with_capacity(n);
            for (i, call) in calls.into_iter().enumerate() {
                let response = call
                    .await
                    .expect("join")
                    .expect("call")
                    .into_response()
                    .expect("reply");
                results.push((i, response.data));
            }
            assert_eq!(h.correlator.pending_count(), 0);
            results
        });

        for (i, data) in results {
            prop_assert_eq!(data, format!("call-{i}"));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_late_response_after_timeout_is_dropped() {
    let mut h = harness(500);

    let call = {
        let correlator = h.correlator.clone();
        tokio::spawn(async move {
            correlator
                .call(
                    REQUEST,
                    1003,
                    String::new(),
                    CallOptions::default().with_timeout(Duration::from_millis(100)),
                )
                .await
        })
    };
    let request = h.requests.recv().await.expect("request");

    let result = call.await.expect("join");
    assert!(matches!(result, Err(LinkError::Timeout { .. })));

    // Keep the response topic alive so the late reply is actually delivered.
    let _keepalive = h
        .correlator
        .multiplexer()
        .add_callback(RESPONSE, MessageKind::Response, handler(|_| {}))
        .expect("keepalive");
    h.transport
        .publish(RESPONSE, ResponseEnvelope::success(request.header.identity, "late").into())
        .await
        .expect("publish");

    let stats = h.correlator.stats();
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.completed, 0);
    assert_eq!(h.correlator.pending_count(), 0);
}

#[tokio::test]
async fn test_unrelated_traffic_is_ignored() {
    let mut h = harness(1);

    let call = {
        let correlator = h.correlator.clone();
        tokio::spawn(async move {
            correlator
                .call(REQUEST, 1001, String::new(), CallOptions::default())
                .await
        })
    };
    let request = h.requests.recv().await.expect("request");

    let mut stranger = request.header.identity;
    stranger.id = stranger.id.wrapping_add(1000);
    h.transport
        .publish(RESPONSE, ResponseEnvelope::success(stranger, "not yours").into())
        .await
        .expect("publish");
    h.transport
        .publish(RESPONSE, ResponseEnvelope::success(request.header.identity, "yours").into())
        .await
        .expect("publish");

    let response = call
        .await
        .expect("join")
        .expect("call")
        .into_response()
        .expect("reply");
    assert_eq!(response.data, "yours");
}

#[tokio::test(start_paused = true)]
async fn test_sequential_calls_reuse_one_physical_subscription() {
    let mut h = harness(1);

    for _ in 0..5 {
        let call = {
            let correlator = h.correlator.clone();
            tokio::spawn(async move {
                correlator
                    .call(REQUEST, 1001, String::new(), CallOptions::default())
                    .await
            })
        };
        let request = h.requests.recv().await.expect("request");
        h.transport
            .publish(RESPONSE, ResponseEnvelope::success(request.header.identity, "").into())
            .await
            .expect("publish");
        call.await.expect("join").expect("call");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let mux = h.correlator.multiplexer();
    assert_eq!(mux.physical_subscribes(), 1);
    assert_eq!(mux.physical_unsubscribes(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(mux.physical_unsubscribes(), 1);
    assert_eq!(h.transport.subscription_count(RESPONSE), 0);
}
