//! # Shutdown Integration
//!
//! Ordered teardown of a runtime with a command stream running and calls in
//! flight.
//!
//! ## Shutdown Sequence Verified
//!
//! 1. Command stream stops; nothing is published afterwards
//! 2. Waiting callers resolve with `Cancelled`
//! 3. Multiplexer and transport refuse new work

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use link_clients::api::sport;
    use link_clients::{Ack, SportMotion};
    use link_runtime::{LinkRuntime, LoopbackActuator, Reply, RuntimeConfig};
    use link_types::topics::SPORT_REQUEST;
    use link_types::{LinkError, TransportError};

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_with_stream_and_calls_in_flight() {
        let runtime = Arc::new(LinkRuntime::new(RuntimeConfig::default()).unwrap());
        let actuator = Arc::new(LoopbackActuator::new(runtime.transport_handle()));
        actuator.serve(SPORT_REQUEST).unwrap();
        actuator.accept_commands().unwrap();
        actuator.set_reply(SPORT_REQUEST, sport::DANCE1, Reply::Ignore);
        actuator.set_reply(SPORT_REQUEST, sport::DANCE2, Reply::Ignore);

        runtime.low_level().start_streaming(|_| {}).unwrap();

        let calls: Vec<_> = [SportMotion::Dance1, SportMotion::Dance2]
            .into_iter()
            .map(|motion| {
                let runtime = runtime.clone();
                tokio::spawn(async move { runtime.sport().perform(motion, Ack::Wait).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runtime.correlator().pending_count(), 2);

        let report = runtime.shutdown().await;
        assert!(report.stream_stopped);
        assert_eq!(report.cancelled_calls, 2);

        for call in calls {
            assert_eq!(call.await.unwrap().unwrap_err(), LinkError::Cancelled);
        }

        let sent = actuator.stats().commands_verified;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(actuator.stats().commands_verified, sent);
        assert_eq!(runtime.low_level().stats().commands_sent, sent);

        assert!(runtime.in_memory().unwrap().is_closed());
        assert_eq!(runtime.multiplexer().topic_count(), 0);
        assert_eq!(
            runtime.low_level().subscribe_state().unwrap_err(),
            LinkError::TransportUnavailable(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_calls_after_shutdown_cancelled_without_publishing() {
        let runtime = LinkRuntime::new(RuntimeConfig::default()).unwrap();
        runtime.shutdown().await;
        let published = runtime.in_memory().unwrap().published_count();

        let err = runtime
            .sport()
            .perform(SportMotion::StandUp, Ack::FireAndForget)
            .await
            .unwrap_err();

        assert_eq!(err, LinkError::Cancelled);
        assert_eq!(runtime.in_memory().unwrap().published_count(), published);
    }
}
