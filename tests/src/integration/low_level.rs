//! # Low-Level Channel Integration
//!
//! Signed command stream from the low-level client to the loopback
//! actuator, and sealed state back.
//!
//! ## Flows Tested
//!
//! 1. Every streamed command passes the actuator's frame check
//! 2. State on the low-rate topic reaches the client when configured
//! 3. A corrupted state is dropped, counted, and never replaces the last
//!    verified state
//! 4. A failing transport drives the command stream to degraded health

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use link_bus::{InMemoryTransport, MultiplexerConfig, SubscriptionMultiplexer, Transport};
    use link_lowlevel::{
        frame, HealthCallback, LowLevelClient, LowLevelConfig, PublisherHealth, StateRate,
    };
    use link_runtime::{LinkRuntime, LoopbackActuator, RuntimeConfig};
    use link_types::topics::{LOW_STATE, LOW_STATE_LF};
    use parking_lot::Mutex;

    fn runtime_with(rate: StateRate) -> (Arc<LinkRuntime>, Arc<LoopbackActuator>) {
        let mut config = RuntimeConfig::default();
        config.low_level.state_rate = rate;
        config.low_level.command_interval = Duration::from_millis(4);
        let runtime = Arc::new(LinkRuntime::new(config).unwrap());
        let actuator = Arc::new(LoopbackActuator::new(runtime.transport_handle()));
        actuator.accept_commands().unwrap();
        (runtime, actuator)
    }

    #[tokio::test(start_paused = true)]
    async fn test_streamed_commands_pass_frame_check() {
        let (runtime, actuator) = runtime_with(StateRate::High);
        let low_level = runtime.low_level();

        low_level
            .start_streaming(|cmd| {
                for motor in cmd.motor_cmd.iter_mut() {
                    motor.q += 0.01;
                }
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        low_level.stop_streaming().await;

        let sent = low_level.stats().commands_sent;
        assert!(sent >= 10);
        assert_eq!(actuator.stats().commands_verified, sent);
        assert_eq!(actuator.stats().commands_rejected, 0);

        let last = actuator.last_command().unwrap();
        assert_eq!(frame(&last), last.crc);
        assert_eq!(last, low_level.command_snapshot());
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_rate_state_reaches_client() {
        let (runtime, actuator) = runtime_with(StateRate::Low);
        let mut rx = runtime.low_level().subscribe_state().unwrap();

        actuator
            .start_state_stream(LOW_STATE_LF, Duration::from_millis(50))
            .unwrap();
        rx.changed().await.unwrap();

        let state = rx.borrow().clone().unwrap();
        assert_eq!(state.tick, 0);
        assert_eq!(runtime.low_level().stats().states_accepted, 1);
        assert_eq!(runtime.in_memory().unwrap().subscription_count(LOW_STATE), 0);
        actuator.stop_state_stream();
    }

    #[tokio::test]
    async fn test_corrupted_state_dropped() {
        let (runtime, actuator) = runtime_with(StateRate::High);
        let low_level = runtime.low_level();
        low_level.subscribe_state().unwrap();

        actuator.publish_state(LOW_STATE, 7).await.unwrap();
        let mut corrupted = actuator.current_state(8);
        corrupted.motor_state[2].tau_est = 3.5;
        runtime
            .transport_handle()
            .publish(LOW_STATE, corrupted.into())
            .await
            .unwrap();

        let stats = low_level.stats();
        assert_eq!(stats.states_accepted, 1);
        assert_eq!(stats.checksum_failures, 1);
        assert_eq!(low_level.latest_state().unwrap().tick, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_transport_degrades_stream() {
        let transport = Arc::new(InMemoryTransport::new());
        let mux = SubscriptionMultiplexer::new(transport.clone(), MultiplexerConfig::default());
        let transitions: Arc<Mutex<Vec<PublisherHealth>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = transitions.clone();
        let callback: HealthCallback = Arc::new(move |health| seen.lock().push(health));
        let config = LowLevelConfig {
            command_interval: Duration::from_millis(10),
            ..LowLevelConfig::default()
        };
        let client =
            LowLevelClient::new(transport.clone(), mux, config).with_health_callback(callback);

        client.start_streaming(|_| {}).unwrap();
        tokio::time::sleep(Duration::from_millis(35)).await;
        transport.close();
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.stop_streaming().await;

        assert!(matches!(
            client.publisher().health(),
            PublisherHealth::Degraded { .. }
        ));
        assert_eq!(
            transitions.lock().first(),
            Some(&PublisherHealth::Degraded {
                consecutive_failures: 3
            })
        );
    }
}
