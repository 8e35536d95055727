//! # Request/Reply Integration
//!
//! Service clients → correlator → multiplexer → transport → loopback
//! actuator, and back.
//!
//! ## Flows Tested
//!
//! 1. Concurrent calls on two services resolved out of order
//! 2. One physical response subscription per service, torn down after the
//!    grace window
//! 3. Remote status codes, decoded payloads and transport failures surface
//!    as typed errors

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use link_clients::api::{motion_switcher, sport};
    use link_clients::{Ack, Service, SportMotion};
    use link_rpc::CallOptions;
    use link_runtime::{LinkRuntime, LoopbackActuator, Reply, RuntimeConfig};
    use link_types::status::codes;
    use link_types::topics::{MOTION_SWITCHER_REQUEST, SPORT_REQUEST};
    use link_types::{LinkError, TransportError};
    use serde_json::json;

    const SPORT_RESPONSE: &str = "rt/api/sport/response";

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn setup() -> (Arc<LinkRuntime>, Arc<LoopbackActuator>) {
        let runtime = Arc::new(LinkRuntime::new(RuntimeConfig::default()).unwrap());
        let actuator = Arc::new(LoopbackActuator::new(runtime.transport_handle()));
        for service in [Service::Sport, Service::MotionSwitcher, Service::RobotState] {
            actuator.serve(service.request_topic()).unwrap();
        }
        (runtime, actuator)
    }

    // =============================================================================
    // CORRELATION
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_resolved_out_of_order() {
        let (runtime, actuator) = setup();
        actuator.set_reply(
            SPORT_REQUEST,
            sport::HELLO,
            Reply::ok("hello").after(Duration::from_millis(300)),
        );
        actuator.set_reply(
            SPORT_REQUEST,
            sport::STRETCH,
            Reply::ok("stretch").after(Duration::from_millis(100)),
        );
        actuator.set_reply(
            MOTION_SWITCHER_REQUEST,
            motion_switcher::GET_MODE,
            Reply::ok(r#"{"name":"advanced"}"#).after(Duration::from_millis(200)),
        );

        let sport_service = runtime.sport().service();
        let (hello, stretch, mode) = tokio::join!(
            sport_service.request::<()>(sport::HELLO, None),
            sport_service.request::<()>(sport::STRETCH, None),
            runtime.motion_switcher().get_mode(),
        );

        assert_eq!(hello.unwrap().data, "hello");
        assert_eq!(stretch.unwrap().data, "stretch");
        assert_eq!(mode.unwrap().name.as_deref(), Some("advanced"));
        assert_eq!(runtime.correlator().stats().completed, 3);
        assert_eq!(runtime.correlator().pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_calls_share_one_response_subscription() {
        let (runtime, actuator) = setup();
        actuator.set_default_reply(Reply::ok("").after(Duration::from_millis(50)));

        let calls = (0..16).map(|_| runtime.sport().perform(SportMotion::Hello, Ack::Wait));
        let started = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            runtime.in_memory().unwrap().subscription_count(SPORT_RESPONSE)
        };
        let (results, subscriptions) = tokio::join!(futures::future::join_all(calls), started);

        assert_eq!(subscriptions, 1);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(runtime.multiplexer().physical_subscribes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_subscription_outlives_call_by_grace() {
        let (runtime, _actuator) = setup();
        let mux = runtime.multiplexer();

        runtime.sport().perform(SportMotion::Hello, Ack::Wait).await.unwrap();
        assert!(mux.is_physically_subscribed(SPORT_RESPONSE));
        assert!(mux.teardown_scheduled_at(SPORT_RESPONSE).is_some());

        // Reuse inside the grace window: no resubscribe.
        tokio::time::sleep(Duration::from_millis(500)).await;
        runtime.sport().perform(SportMotion::Stretch, Ack::Wait).await.unwrap();
        assert_eq!(mux.physical_subscribes(), 1);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!mux.is_physically_subscribed(SPORT_RESPONSE));
        assert_eq!(runtime.in_memory().unwrap().subscription_count(SPORT_RESPONSE), 0);
        assert_eq!(mux.physical_unsubscribes(), 1);
    }

    #[tokio::test]
    async fn test_pinned_correlation_id_round_trip() {
        let (runtime, _actuator) = setup();

        let outcome = runtime
            .correlator()
            .call(
                SPORT_REQUEST,
                sport::HELLO,
                String::new(),
                CallOptions::default().with_correlation_id(42),
            )
            .await
            .unwrap();

        assert_eq!(outcome.correlation_id(), 42);
    }

    // =============================================================================
    // ERRORS
    // =============================================================================

    #[tokio::test]
    async fn test_remote_code_reaches_client() {
        let (runtime, actuator) = setup();
        actuator.set_reply(
            SPORT_REQUEST,
            sport::BOUND,
            Reply::error(codes::API_NOT_REGISTERED),
        );

        let err = runtime
            .sport()
            .perform(SportMotion::Bound, Ack::Wait)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LinkError::RemoteError {
                code: 3103,
                description: "API not registered".into(),
            }
        );
        assert_eq!(runtime.correlator().stats().remote_errors, 1);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_decode_error() {
        let (runtime, actuator) = setup();
        actuator.set_reply(SPORT_REQUEST, sport::GET_STATE, Reply::ok("not json"));

        let err = runtime.sport().get_state().await.unwrap_err();

        assert!(matches!(err, LinkError::Decode(_)));
    }

    #[tokio::test]
    async fn test_get_state_through_loopback() {
        let (runtime, actuator) = setup();
        let data = json!({
            "state": {"data": "sit"},
            "gait": {"data": 2}
        });
        actuator.set_reply(SPORT_REQUEST, sport::GET_STATE, Reply::ok(data.to_string()));

        let report = runtime.sport().get_state().await.unwrap();

        assert_eq!(report.state, Some(json!("sit")));
        assert_eq!(report.gait, Some(json!(2)));
        assert_eq!(report.dance, None);
    }

    #[tokio::test]
    async fn test_closed_transport_is_unavailable() {
        let (runtime, _actuator) = setup();
        runtime.in_memory().unwrap().close();

        let err = runtime
            .sport()
            .perform(SportMotion::StandUp, Ack::Wait)
            .await
            .unwrap_err();

        assert_eq!(err, LinkError::TransportUnavailable(TransportError::Closed));
        assert_eq!(runtime.correlator().pending_count(), 0);
    }
}
