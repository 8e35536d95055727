//! # Link Runtime
//!
//! Builds the component graph around one transport handle and tears it down
//! in dependency order.
//!
//! ## Initialization Order
//!
//! 1. Transport
//! 2. Subscription multiplexer (shared by every subscriber)
//! 3. Correlator
//! 4. Service clients and the low-level client
//!
//! ## Shutdown Sequence
//!
//! 1. Stop the low-level command stream and release the state subscription
//! 2. Release the service-state and sport-state subscriptions
//! 3. Drain pending calls (waiting callers see `Cancelled`)
//! 4. Shut down the multiplexer
//! 5. Close the transport

use link_bus::{InMemoryTransport, SubscriptionMultiplexer, Transport};
use link_clients::{
    MotionSwitcherClient, RobotStateClient, Service, ServiceClient, SportClient,
    SportStateClient,
};
use link_lowlevel::LowLevelClient;
use link_rpc::Correlator;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::config::{ConfigError, RuntimeConfig};

/// What [`LinkRuntime::shutdown`] cleaned up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Calls that were waiting for a response.
    pub cancelled_calls: usize,
    /// Whether the low-level command stream was running.
    pub stream_stopped: bool,
}

/// The main runtime owning every link component.
pub struct LinkRuntime {
    config: RuntimeConfig,
    transport: Arc<dyn Transport>,
    /// Set when the runtime built its own in-process transport.
    in_memory: Option<Arc<InMemoryTransport>>,
    mux: SubscriptionMultiplexer,
    correlator: Arc<Correlator>,
    sport: SportClient,
    motion_switcher: MotionSwitcherClient,
    robot_state: RobotStateClient,
    sport_state: SportStateClient,
    low_level: LowLevelClient,
    shut_down: AtomicBool,
}

impl LinkRuntime {
    /// Build a runtime over a fresh in-process transport.
    ///
    /// # Errors
    ///
    /// The first configuration section that fails validation.
    pub fn new(config: RuntimeConfig) -> Result<Self, ConfigError> {
        let memory = Arc::new(InMemoryTransport::new());
        Self::build(config, memory.clone(), Some(memory))
    }

    /// Build a runtime over any transport implementation.
    ///
    /// # Errors
    ///
    /// The first configuration section that fails validation.
    pub fn with_transport(
        config: RuntimeConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        Self::build(config, transport, None)
    }

    fn build(
        config: RuntimeConfig,
        shared: Arc<dyn Transport>,
        in_memory: Option<Arc<InMemoryTransport>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(in_process = in_memory.is_some(), "Creating actuator link runtime");

        let mux = SubscriptionMultiplexer::new(shared.clone(), config.multiplexer.clone());
        let correlator = Arc::new(Correlator::new(
            shared.clone(),
            mux.clone(),
            config.correlator.clone(),
        ));

        let sport = SportClient::new(ServiceClient::new(correlator.clone(), Service::Sport));
        let motion_switcher = MotionSwitcherClient::new(ServiceClient::new(
            correlator.clone(),
            Service::MotionSwitcher,
        ));
        let robot_state = RobotStateClient::new(
            ServiceClient::new(correlator.clone(), Service::RobotState),
            mux.clone(),
            config.service_status,
        );
        let sport_state = SportStateClient::new(mux.clone(), config.sport_state_rate);
        let low_level = LowLevelClient::new(shared.clone(), mux.clone(), config.low_level.clone());

        info!(
            default_timeout_ms = config.correlator.default_timeout.as_millis() as u64,
            teardown_grace_ms = config.multiplexer.teardown_grace.as_millis() as u64,
            command_interval_us = config.low_level.command_interval.as_micros() as u64,
            state_topic = config.low_level.state_rate.topic(),
            sport_state_topic = config.sport_state_rate.topic(),
            "Runtime components initialized"
        );

        Ok(Self {
            config,
            transport: shared,
            in_memory,
            mux,
            correlator,
            sport,
            motion_switcher,
            robot_state,
            sport_state,
            low_level,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The in-process transport, when the runtime created one. Used for
    /// introspection in tests and the demo.
    pub fn in_memory(&self) -> Option<Arc<InMemoryTransport>> {
        self.in_memory.clone()
    }

    /// The shared transport handle.
    pub fn transport_handle(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn multiplexer(&self) -> &SubscriptionMultiplexer {
        &self.mux
    }

    pub fn correlator(&self) -> Arc<Correlator> {
        Arc::clone(&self.correlator)
    }

    pub fn sport(&self) -> &SportClient {
        &self.sport
    }

    pub fn motion_switcher(&self) -> &MotionSwitcherClient {
        &self.motion_switcher
    }

    pub fn robot_state(&self) -> &RobotStateClient {
        &self.robot_state
    }

    pub fn sport_state(&self) -> &SportStateClient {
        &self.sport_state
    }

    pub fn low_level(&self) -> &LowLevelClient {
        &self.low_level
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Shut down every component. A second call is a no-op.
    pub async fn shutdown(&self) -> ShutdownReport {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return ShutdownReport::default();
        }
        info!("Initiating graceful shutdown...");

        let stream_stopped = self.low_level.stop_streaming().await;
        self.low_level.unsubscribe_state();
        self.robot_state.unsubscribe_service_state();
        self.sport_state.unsubscribe();

        let cancelled_calls = self.correlator.shutdown();
        self.mux.shutdown();
        self.transport.close();

        info!(cancelled_calls, stream_stopped, "Shutdown complete");
        ShutdownReport {
            cancelled_calls,
            stream_stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use link_bus::{MessageHandler, SubscriptionHandle};
    use link_lowlevel::StateRate;
    use link_types::{topics, BusMessage, MessageKind, TransportError};
    use std::time::Duration;

    /// Delegates to an in-process transport and records `close`.
    struct RecordingTransport {
        inner: InMemoryTransport,
        closed: AtomicBool,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn publish(
            &self,
            topic: &str,
            message: BusMessage,
        ) -> Result<usize, TransportError> {
            self.inner.publish(topic, message).await
        }

        fn subscribe(
            &self,
            topic: &str,
            kind: MessageKind,
            handler: MessageHandler,
        ) -> Result<SubscriptionHandle, TransportError> {
            self.inner.subscribe(topic, kind, handler)
        }

        fn unsubscribe(
            &self,
            topic: &str,
            handle: SubscriptionHandle,
        ) -> Result<bool, TransportError> {
            self.inner.unsubscribe(topic, handle)
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
            self.inner.close();
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = RuntimeConfig::default();
        config.low_level.command_interval = Duration::ZERO;
        assert!(matches!(
            LinkRuntime::new(config),
            Err(ConfigError::LowLevel(_))
        ));
    }

    #[tokio::test]
    async fn test_components_share_one_transport() {
        let runtime = LinkRuntime::new(RuntimeConfig::default()).unwrap();
        runtime.low_level().subscribe_state().unwrap();
        runtime.robot_state().subscribe_service_state().unwrap();

        let transport = runtime.in_memory().unwrap();
        assert_eq!(transport.subscription_count(topics::LOW_STATE), 1);
        assert_eq!(transport.subscription_count(topics::SERVICE_STATE), 1);
        assert_eq!(runtime.multiplexer().topic_count(), 2);
    }

    #[tokio::test]
    async fn test_low_rate_state_topic() {
        let mut config = RuntimeConfig::default();
        config.low_level.state_rate = StateRate::Low;
        let runtime = LinkRuntime::new(config).unwrap();
        runtime.low_level().subscribe_state().unwrap();
        assert_eq!(runtime.in_memory().unwrap().subscription_count(topics::LOW_STATE_LF), 1);
    }

    #[tokio::test]
    async fn test_sport_state_follows_configured_rate() {
        let runtime = LinkRuntime::new(RuntimeConfig::default()).unwrap();
        runtime.sport_state().subscribe().unwrap();
        let transport = runtime.in_memory().unwrap();
        assert_eq!(transport.subscription_count(topics::SPORT_MODE_STATE_LF), 1);
        assert_eq!(transport.subscription_count(topics::SPORT_MODE_STATE), 0);

        runtime.shutdown().await;
        assert!(!runtime.sport_state().is_subscribed());
        assert_eq!(transport.subscription_count(topics::SPORT_MODE_STATE_LF), 0);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_closes_transport() {
        let runtime = LinkRuntime::new(RuntimeConfig::default()).unwrap();
        runtime.low_level().subscribe_state().unwrap();

        let first = runtime.shutdown().await;
        assert_eq!(first.cancelled_calls, 0);
        assert!(runtime.is_shut_down());
        assert!(runtime.in_memory().unwrap().is_closed());
        assert_eq!(runtime.in_memory().unwrap().subscription_count(topics::LOW_STATE), 0);
        assert_eq!(runtime.correlator().pending_count(), 0);

        assert_eq!(runtime.shutdown().await, ShutdownReport::default());
    }

    #[tokio::test]
    async fn test_runs_over_any_transport() {
        let transport = Arc::new(RecordingTransport {
            inner: InMemoryTransport::new(),
            closed: AtomicBool::new(false),
        });
        let runtime =
            LinkRuntime::with_transport(RuntimeConfig::default(), transport.clone()).unwrap();
        assert!(runtime.in_memory().is_none());

        runtime.low_level().subscribe_state().unwrap();
        assert_eq!(transport.inner.subscription_count(topics::LOW_STATE), 1);

        runtime.shutdown().await;
        assert!(transport.closed.load(Ordering::SeqCst));
        assert!(transport.inner.is_closed());
    }
}
