//! # Robot State Client
//!
//! Toggles on-board services, sets the report cadence of `rt/servicestate`
//! and tracks the service list published there.
//!
//! The remote reports each service's `status` flag inverted relative to
//! "running". Interpretation happens at this boundary under an explicit
//! [`ServiceStatusPolicy`]; callers only ever see [`ServiceState::running`].

use link_bus::{handler, CallbackId, SubscriptionMultiplexer};
use link_rpc::CallOutcome;
use link_types::topics::SERVICE_STATE;
use link_types::{BusMessage, LinkError, LinkResult, MessageKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::api::robot_state as api;
use crate::service::{Ack, ServiceClient};

/// How the remote `status` flag maps onto "running".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatusPolicy {
    /// `status == 0` means running.
    #[default]
    InvertRemoteFlag,
    /// `status != 0` means running.
    AsReported,
}

impl ServiceStatusPolicy {
    #[must_use]
    pub fn running(self, remote_status: bool) -> bool {
        match self {
            ServiceStatusPolicy::InvertRemoteFlag => !remote_status,
            ServiceStatusPolicy::AsReported => remote_status,
        }
    }
}

/// One entry of the service list, after policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceState {
    pub name: String,
    pub protect: bool,
    pub running: bool,
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct RemoteService {
    name: String,
    #[serde(default)]
    protect: Value,
    #[serde(default)]
    status: Value,
    #[serde(default)]
    version: String,
}

/// `0`/`1`, `true`/`false` and `"0"`/`"1"` all occur on the wire.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !matches!(s.as_str(), "" | "0" | "false"),
        _ => false,
    }
}

/// Parse a service-list document.
///
/// # Errors
///
/// `Decode` if `json` is not an array of service objects.
pub fn parse_service_list(
    json: &str,
    policy: ServiceStatusPolicy,
) -> LinkResult<Vec<ServiceState>> {
    let remote: Vec<RemoteService> = serde_json::from_str(json)?;
    Ok(remote
        .into_iter()
        .map(|s| ServiceState {
            running: policy.running(truthy(&s.status)),
            protect: truthy(&s.protect),
            name: s.name,
            version: s.version,
        })
        .collect())
}

#[derive(Debug, Serialize)]
struct SwitchParam<'a> {
    name: &'a str,
    switch: u8,
}

#[derive(Debug, Serialize)]
struct ReportFreqParam {
    interval: u32,
    duration: u32,
}

/// Receiver for service-list updates.
pub type ServiceListReceiver = watch::Receiver<Arc<Vec<ServiceState>>>;

pub struct RobotStateClient {
    service: ServiceClient,
    mux: SubscriptionMultiplexer,
    policy: ServiceStatusPolicy,
    services_tx: Arc<watch::Sender<Arc<Vec<ServiceState>>>>,
    subscription: Mutex<Option<CallbackId>>,
    parse_failures: Arc<AtomicU64>,
}

impl RobotStateClient {
    /// Robot-state requests go out with priority 1.
    pub fn new(
        service: ServiceClient,
        mux: SubscriptionMultiplexer,
        policy: ServiceStatusPolicy,
    ) -> Self {
        let (services_tx, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            service: service.with_priority(1),
            mux,
            policy,
            services_tx: Arc::new(services_tx),
            subscription: Mutex::new(None),
            parse_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn policy(&self) -> ServiceStatusPolicy {
        self.policy
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Start or stop an on-board service by name.
    #[instrument(skip(self))]
    pub async fn service_switch(
        &self,
        name: &str,
        on: bool,
        ack: Ack,
    ) -> LinkResult<CallOutcome> {
        if name.is_empty() {
            return Err(LinkError::InvalidRequest("service name is empty".into()));
        }
        let param = SwitchParam {
            name,
            switch: u8::from(on),
        };
        self.service
            .command(api::SERVICE_SWITCH, Some(&param), ack)
            .await
    }

    /// Publish the service list every `interval_s` seconds for `duration_s`
    /// seconds.
    #[instrument(skip(self))]
    pub async fn set_report_frequency(
        &self,
        interval_s: u32,
        duration_s: u32,
        ack: Ack,
    ) -> LinkResult<CallOutcome> {
        if interval_s == 0 {
            return Err(LinkError::InvalidRequest(
                "report interval must be positive".into(),
            ));
        }
        let param = ReportFreqParam {
            interval: interval_s,
            duration: duration_s,
        };
        self.service
            .command(api::SET_REPORT_FREQ, Some(&param), ack)
            .await
    }

    /// Ask for the service list directly instead of waiting for a report.
    #[instrument(skip(self))]
    pub async fn get_service_list(&self) -> LinkResult<Vec<ServiceState>> {
        let response = self
            .service
            .request::<()>(api::GET_SERVICE_LIST, None)
            .await?;
        parse_service_list(&response.data, self.policy)
    }

    // ------------------------------------------------------------------------
    // Service-state stream
    // ------------------------------------------------------------------------

    /// Track `rt/servicestate`. Idempotent.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` if the subscription cannot be established.
    pub fn subscribe_service_state(&self) -> LinkResult<ServiceListReceiver> {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return Ok(self.services_tx.subscribe());
        }

        let services_tx = self.services_tx.clone();
        let failures = self.parse_failures.clone();
        let policy = self.policy;
        let id = self.mux.add_callback(
            SERVICE_STATE,
            MessageKind::Text,
            handler(move |message: BusMessage| {
                let BusMessage::Text(json) = message else {
                    return;
                };
                match parse_service_list(&json, policy) {
                    Ok(list) => {
                        debug!(services = list.len(), "Service list updated");
                        services_tx.send_replace(Arc::new(list));
                    }
                    Err(e) => {
                        failures.fetch_add(1, Ordering::Relaxed);
                        error!(error = %e, "Failed to parse service list");
                    }
                }
            }),
        )?;
        *subscription = Some(id);
        info!(topic = SERVICE_STATE, "Subscribed to service state");
        Ok(self.services_tx.subscribe())
    }

    /// Stop tracking. Returns `false` if not subscribed.
    pub fn unsubscribe_service_state(&self) -> bool {
        match self.subscription.lock().take() {
            Some(id) => {
                self.mux.remove_callback(SERVICE_STATE, id);
                true
            }
            None => false,
        }
    }

    /// Last service list received on the stream.
    #[must_use]
    pub fn services(&self) -> Arc<Vec<ServiceState>> {
        self.services_tx.borrow().clone()
    }

    /// Whether `name` is running, per the last list. `None` if unknown.
    #[must_use]
    pub fn service_running(&self, name: &str) -> Option<bool> {
        self.services_tx
            .borrow()
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.running)
    }

    /// Wait until the stream reports `name`, subscribing first if needed.
    ///
    /// # Errors
    ///
    /// `Timeout` if no report mentioning `name` arrives within `timeout`.
    #[instrument(skip(self))]
    pub async fn wait_service_running(&self, name: &str, timeout: Duration) -> LinkResult<bool> {
        let mut rx = self.subscribe_service_state()?;
        let waited = tokio::time::timeout(timeout, async {
            loop {
                let found = rx
                    .borrow_and_update()
                    .iter()
                    .find(|s| s.name == name)
                    .map(|s| s.running);
                if let Some(running) = found {
                    return Ok(running);
                }
                if rx.changed().await.is_err() {
                    return Err(LinkError::Cancelled);
                }
            }
        })
        .await;
        waited.unwrap_or_else(|_| {
            Err(LinkError::Timeout {
                topic: SERVICE_STATE.to_string(),
                timeout,
            })
        })
    }

    #[must_use]
    pub fn parse_failures(&self) -> u64 {
        self.parse_failures.load(Ordering::Relaxed)
    }
}
