//! # Sport State Client
//!
//! Tracks the sport service's state report. The remote publishes it at three
//! rates on separate topics; the client subscribes to exactly one.
//!
//! ```text
//! rt/sportmodestate     hf
//! rt/mf/sportmodestate  mf
//! rt/lf/sportmodestate  lf  (default)
//! ```

use link_bus::{handler, CallbackId, SubscriptionMultiplexer};
use link_types::topics::{SPORT_MODE_STATE, SPORT_MODE_STATE_LF, SPORT_MODE_STATE_MF};
use link_types::{BusMessage, LinkError, LinkResult, MessageKind, SportModeState};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Which of the three report streams to follow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SportStateRate {
    #[serde(rename = "hf")]
    High,
    #[serde(rename = "mf")]
    Medium,
    #[default]
    #[serde(rename = "lf")]
    Low,
}

impl SportStateRate {
    #[must_use]
    pub fn topic(self) -> &'static str {
        match self {
            SportStateRate::High => SPORT_MODE_STATE,
            SportStateRate::Medium => SPORT_MODE_STATE_MF,
            SportStateRate::Low => SPORT_MODE_STATE_LF,
        }
    }
}

impl FromStr for SportStateRate {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hf" | "high" => Ok(SportStateRate::High),
            "mf" | "medium" => Ok(SportStateRate::Medium),
            "lf" | "low" => Ok(SportStateRate::Low),
            other => Err(LinkError::InvalidRequest(format!(
                "unknown sport state rate {other:?}"
            ))),
        }
    }
}

/// Latest report, if any has arrived.
pub type SportStateReceiver = watch::Receiver<Option<Arc<SportModeState>>>;

pub struct SportStateClient {
    mux: SubscriptionMultiplexer,
    rate: SportStateRate,
    state_tx: Arc<watch::Sender<Option<Arc<SportModeState>>>>,
    subscription: Mutex<Option<CallbackId>>,
    received: Arc<AtomicU64>,
}

impl SportStateClient {
    pub fn new(mux: SubscriptionMultiplexer, rate: SportStateRate) -> Self {
        let (state_tx, _) = watch::channel(None);
        Self {
            mux,
            rate,
            state_tx: Arc::new(state_tx),
            subscription: Mutex::new(None),
            received: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn rate(&self) -> SportStateRate {
        self.rate
    }

    /// Follow the configured stream. Idempotent.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` if the subscription cannot be established.
    pub fn subscribe(&self) -> LinkResult<SportStateReceiver> {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return Ok(self.state_tx.subscribe());
        }

        let topic = self.rate.topic();
        let state_tx = self.state_tx.clone();
        let received = self.received.clone();
        let id = self.mux.add_callback(
            topic,
            MessageKind::SportModeState,
            handler(move |message: BusMessage| {
                if let BusMessage::SportModeState(state) = message {
                    received.fetch_add(1, Ordering::Relaxed);
                    debug!(mode = state.mode, gait = state.gait_type, "Sport state updated");
                    state_tx.send_replace(Some(Arc::from(state)));
                }
            }),
        )?;
        *subscription = Some(id);
        info!(topic = %topic, "Subscribed to sport state");
        Ok(self.state_tx.subscribe())
    }

    /// Stop following. Returns `false` if not subscribed.
    pub fn unsubscribe(&self) -> bool {
        match self.subscription.lock().take() {
            Some(id) => {
                self.mux.remove_callback(self.rate.topic(), id);
                info!(topic = %self.rate.topic(), "Unsubscribed from sport state");
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().is_some()
    }

    #[must_use]
    pub fn latest(&self) -> Option<Arc<SportModeState>> {
        self.state_tx.borrow().clone()
    }

    /// Wait for the next report, subscribing first if needed.
    ///
    /// # Errors
    ///
    /// `Timeout` if no report arrives within `timeout`.
    pub async fn next_state(&self, timeout: Duration) -> LinkResult<Arc<SportModeState>> {
        let mut rx = self.subscribe()?;
        rx.borrow_and_update();
        let waited = tokio::time::timeout(timeout, async {
            if rx.changed().await.is_err() {
                return Err(LinkError::Cancelled);
            }
            let state = rx.borrow_and_update().clone();
            state.ok_or(LinkError::Cancelled)
        })
        .await;
        waited.unwrap_or_else(|_| {
            Err(LinkError::Timeout {
                topic: self.rate.topic().to_string(),
                timeout,
            })
        })
    }

    /// Reports received since creation.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}
