//! # Low-Level Client
//!
//! Owns the outgoing command record and the incoming state stream.
//!
//! ```text
//! update(cmd) ─▶ sign(cmd) ─▶ publish rt/lowcmd          (every command_interval)
//! rt/lowstate ─▶ verify ─┬─▶ watch channel ─▶ consumers
//!                        └─▶ dropped + counted on mismatch
//! ```

use link_bus::{handler, CallbackId, SubscriptionMultiplexer, Transport};
use link_types::topics::LOW_CMD;
use link_types::{BusMessage, LinkError, LinkResult, LowCmd, LowState, MessageKind};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::checksum::{sign, verify_checked};
use crate::config::LowLevelConfig;
use crate::periodic::{HealthCallback, PeriodicPublisher};

/// Latest verified state, if any has arrived.
pub type StateReceiver = watch::Receiver<Option<Arc<LowState>>>;

#[derive(Debug, Default)]
struct Counters {
    commands_sent: AtomicU64,
    states_accepted: AtomicU64,
    checksum_failures: AtomicU64,
}

/// Point-in-time counters of the low-level channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LowLevelStats {
    pub commands_sent: u64,
    pub states_accepted: u64,
    pub checksum_failures: u64,
}

pub struct LowLevelClient {
    transport: Arc<dyn Transport>,
    mux: SubscriptionMultiplexer,
    config: LowLevelConfig,
    command: Arc<Mutex<LowCmd>>,
    state_tx: Arc<watch::Sender<Option<Arc<LowState>>>>,
    state_subscription: Mutex<Option<(&'static str, CallbackId)>>,
    counters: Arc<Counters>,
    publisher: PeriodicPublisher,
}

impl LowLevelClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        mux: SubscriptionMultiplexer,
        config: LowLevelConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(None);
        let publisher = PeriodicPublisher::new("lowcmd", config.degraded_after);
        Self {
            transport,
            mux,
            config,
            command: Arc::new(Mutex::new(LowCmd::with_header())),
            state_tx: Arc::new(state_tx),
            state_subscription: Mutex::new(None),
            counters: Arc::new(Counters::default()),
            publisher,
        }
    }

    /// Report command-stream health transitions to `callback`.
    #[must_use]
    pub fn with_health_callback(mut self, callback: HealthCallback) -> Self {
        self.publisher = PeriodicPublisher::new("lowcmd", self.config.degraded_after)
            .with_health_callback(callback);
        self
    }

    // ------------------------------------------------------------------------
    // Command side
    // ------------------------------------------------------------------------

    /// Mutate the pending command in place.
    pub fn update_command<R>(&self, f: impl FnOnce(&mut LowCmd) -> R) -> R {
        let mut cmd = self.command.lock();
        f(&mut *cmd)
    }

    /// Copy of the pending command, including the last stored checksum.
    #[must_use]
    pub fn command_snapshot(&self) -> LowCmd {
        self.command.lock().clone()
    }

    /// Sign the pending command and publish it on `rt/lowcmd`.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` if the publish is rejected.
    pub async fn publish_with_checksum(&self) -> LinkResult<u32> {
        let cmd = {
            let mut cmd = self.command.lock();
            sign(&mut *cmd);
            cmd.clone()
        };
        let crc = cmd.crc;
        publish_command(self.transport.as_ref(), &self.counters, cmd).await?;
        Ok(crc)
    }

    /// Stream the command every `command_interval`, applying `update`
    /// before each signature.
    ///
    /// Returns `Ok(false)` if already streaming.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when called outside a Tokio runtime.
    pub fn start_streaming<F>(&self, mut update: F) -> LinkResult<bool>
    where
        F: FnMut(&mut LowCmd) + Send + 'static,
    {
        let command = self.command.clone();
        let transport = self.transport.clone();
        let counters = self.counters.clone();

        self.publisher.start(self.config.command_interval, move || {
            let cmd = {
                let mut cmd = command.lock();
                update(&mut *cmd);
                sign(&mut *cmd);
                cmd.clone()
            };
            let transport = transport.clone();
            let counters = counters.clone();
            async move { publish_command(transport.as_ref(), &counters, cmd).await }
        })
    }

    /// Stop the command stream. No command is published after this returns.
    pub async fn stop_streaming(&self) -> bool {
        self.publisher.stop().await
    }

    #[must_use]
    pub fn publisher(&self) -> &PeriodicPublisher {
        &self.publisher
    }

    // ------------------------------------------------------------------------
    // State side
    // ------------------------------------------------------------------------

    /// Subscribe to the configured state stream. Idempotent.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` if the subscription cannot be established.
    pub fn subscribe_state(&self) -> LinkResult<StateReceiver> {
        let mut subscription = self.state_subscription.lock();
        if subscription.is_some() {
            return Ok(self.state_tx.subscribe());
        }

        let topic = self.config.state_rate.topic();
        let state_tx = self.state_tx.clone();
        let counters = self.counters.clone();
        let id = self.mux.add_callback(
            topic,
            MessageKind::LowState,
            handler(move |message: BusMessage| {
                if let BusMessage::LowState(state) = message {
                    accept_state(&state_tx, &counters, *state);
                }
            }),
        )?;
        *subscription = Some((topic, id));
        info!(topic = %topic, "Subscribed to low-level state");
        Ok(self.state_tx.subscribe())
    }

    /// Release the state subscription. Returns `false` if none was active.
    pub fn unsubscribe_state(&self) -> bool {
        match self.state_subscription.lock().take() {
            Some((topic, id)) => {
                self.mux.remove_callback(topic, id);
                true
            }
            None => false,
        }
    }

    /// A new receiver for verified state.
    #[must_use]
    pub fn state_receiver(&self) -> StateReceiver {
        self.state_tx.subscribe()
    }

    /// The most recent verified state.
    #[must_use]
    pub fn latest_state(&self) -> Option<Arc<LowState>> {
        self.state_tx.borrow().clone()
    }

    #[must_use]
    pub fn stats(&self) -> LowLevelStats {
        LowLevelStats {
            commands_sent: self.counters.commands_sent.load(Ordering::Relaxed),
            states_accepted: self.counters.states_accepted.load(Ordering::Relaxed),
            checksum_failures: self.counters.checksum_failures.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn config(&self) -> &LowLevelConfig {
        &self.config
    }

    /// Stop streaming and release the state subscription.
    pub async fn shutdown(&self) {
        self.stop_streaming().await;
        self.unsubscribe_state();
    }
}

async fn publish_command(
    transport: &dyn Transport,
    counters: &Counters,
    cmd: LowCmd,
) -> Result<(), LinkError> {
    let crc = cmd.crc;
    transport.publish(LOW_CMD, cmd.into()).await?;
    counters.commands_sent.fetch_add(1, Ordering::Relaxed);
    debug!(crc = format_args!("{crc:#010x}"), "Low-level command sent");
    Ok(())
}

fn accept_state(
    state_tx: &watch::Sender<Option<Arc<LowState>>>,
    counters: &Counters,
    state: LowState,
) {
    match verify_checked(&state) {
        Ok(()) => {
            counters.states_accepted.fetch_add(1, Ordering::Relaxed);
            state_tx.send_replace(Some(Arc::new(state)));
        }
        Err(LinkError::ChecksumMismatch { expected, computed }) => {
            counters.checksum_failures.fetch_add(1, Ordering::Relaxed);
            error!(
                expected = format_args!("{expected:#010x}"),
                computed = format_args!("{computed:#010x}"),
                tick = state.tick,
                "CRC mismatch, low-level state dropped"
            );
        }
        Err(e) => {
            counters.checksum_failures.fetch_add(1, Ordering::Relaxed);
            error!(error = %e, "Low-level state rejected");
        }
    }
}
