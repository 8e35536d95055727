//! # Loopback Actuator
//!
//! An in-process stand-in for the remote actuator. It answers requests on
//! the service topics it serves, accepts signed low-level commands and
//! publishes sealed low-level state that mirrors the last accepted command.
//!
//! ```text
//! rt/api/<svc>/request ──▶ [reply table] ──▶ rt/api/<svc>/response
//! rt/lowcmd ──▶ [frame check] ──▶ last command ──▶ rt/lowstate (sealed)
//! ```

use link_bus::{handler, SubscriptionHandle, Transport};
use link_lowlevel::{frame, seal};
use link_types::topics::{LOW_CMD, SERVICE_STATE};
use link_types::{
    response_topic_for, BusMessage, LinkError, LinkResult, LowCmd, LowState, MessageKind,
    RequestEnvelope, ResponseEnvelope, SportModeState, TransportError,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How the actuator answers one API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Publish a response with `code` and `data`, optionally after `delay`.
    Respond {
        code: i32,
        data: String,
        delay: Option<Duration>,
    },
    /// Never answer.
    Ignore,
}

impl Reply {
    pub fn ok(data: impl Into<String>) -> Self {
        Reply::Respond {
            code: 0,
            data: data.into(),
            delay: None,
        }
    }

    pub fn error(code: i32) -> Self {
        Reply::Respond {
            code,
            data: String::new(),
            delay: None,
        }
    }

    /// Delay the response. No effect on [`Reply::Ignore`].
    #[must_use]
    pub fn after(self, delay: Duration) -> Self {
        match self {
            Reply::Respond { code, data, .. } => Reply::Respond {
                code,
                data,
                delay: Some(delay),
            },
            Reply::Ignore => Reply::Ignore,
        }
    }
}

impl Default for Reply {
    fn default() -> Self {
        Reply::ok("")
    }
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    responses: AtomicU64,
    commands_verified: AtomicU64,
    commands_rejected: AtomicU64,
    states_published: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActuatorStats {
    pub requests: u64,
    pub responses: u64,
    pub commands_verified: u64,
    pub commands_rejected: u64,
    pub states_published: u64,
}

type ReplyTable = RwLock<HashMap<(String, u32), Reply>>;

pub struct LoopbackActuator {
    transport: Arc<dyn Transport>,
    replies: Arc<ReplyTable>,
    default_reply: Arc<RwLock<Reply>>,
    subscriptions: Mutex<Vec<(String, SubscriptionHandle)>>,
    last_command: Arc<Mutex<Option<LowCmd>>>,
    counters: Arc<Counters>,
    state_task: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackActuator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            replies: Arc::new(RwLock::new(HashMap::new())),
            default_reply: Arc::new(RwLock::new(Reply::default())),
            subscriptions: Mutex::new(Vec::new()),
            last_command: Arc::new(Mutex::new(None)),
            counters: Arc::new(Counters::default()),
            state_task: Mutex::new(None),
        }
    }

    // ------------------------------------------------------------------------
    // Request/reply
    // ------------------------------------------------------------------------

    /// Answer requests published on `request_topic`.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if the topic does not end with `/request`,
    /// `TransportUnavailable` if the subscription fails.
    pub fn serve(&self, request_topic: &str) -> LinkResult<()> {
        let response_topic = response_topic_for(request_topic).ok_or_else(|| {
            LinkError::InvalidRequest(format!("{request_topic} is not a request topic"))
        })?;

        let transport = self.transport.clone();
        let replies = self.replies.clone();
        let default_reply = self.default_reply.clone();
        let counters = self.counters.clone();
        let served = request_topic.to_string();

        let handle = self.transport.subscribe(
            request_topic,
            MessageKind::Request,
            handler(move |message: BusMessage| {
                let BusMessage::Request(request) = message else {
                    return;
                };
                counters.requests.fetch_add(1, Ordering::Relaxed);
                if !request.expects_reply() {
                    debug!(topic = %served, api_id = request.api_id(), "No-reply request consumed");
                    return;
                }
                let reply = replies
                    .read()
                    .get(&(served.clone(), request.api_id()))
                    .cloned()
                    .unwrap_or_else(|| default_reply.read().clone());
                respond(
                    transport.clone(),
                    counters.clone(),
                    response_topic.clone(),
                    &request,
                    reply,
                );
            }),
        )?;
        self.subscriptions
            .lock()
            .push((request_topic.to_string(), handle));
        info!(topic = %request_topic, "Loopback actuator serving");
        Ok(())
    }

    /// Configure the answer for one API of one request topic.
    pub fn set_reply(&self, request_topic: &str, api_id: u32, reply: Reply) {
        self.replies
            .write()
            .insert((request_topic.to_string(), api_id), reply);
    }

    /// Answer for APIs without an explicit reply. Success with empty data
    /// unless changed.
    pub fn set_default_reply(&self, reply: Reply) {
        *self.default_reply.write() = reply;
    }

    // ------------------------------------------------------------------------
    // Low-level channel
    // ------------------------------------------------------------------------

    /// Accept commands on `rt/lowcmd`, counting those whose checksum holds.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` if the subscription fails.
    pub fn accept_commands(&self) -> LinkResult<()> {
        let last_command = self.last_command.clone();
        let counters = self.counters.clone();
        let handle = self.transport.subscribe(
            LOW_CMD,
            MessageKind::LowCmd,
            handler(move |message: BusMessage| {
                let BusMessage::LowCmd(cmd) = message else {
                    return;
                };
                let computed = frame(&cmd);
                if computed == cmd.crc {
                    counters.commands_verified.fetch_add(1, Ordering::Relaxed);
                    *last_command.lock() = Some(*cmd);
                } else {
                    counters.commands_rejected.fetch_add(1, Ordering::Relaxed);
                    error!(
                        expected = format_args!("{:#010x}", cmd.crc),
                        computed = format_args!("{computed:#010x}"),
                        "CRC mismatch, low-level command rejected"
                    );
                }
            }),
        )?;
        self.subscriptions.lock().push((LOW_CMD.to_string(), handle));
        Ok(())
    }

    /// The last command that passed the checksum check.
    pub fn last_command(&self) -> Option<LowCmd> {
        self.last_command.lock().clone()
    }

    /// State that mirrors the last accepted command, sealed.
    pub fn current_state(&self, tick: u32) -> LowState {
        let mut state = LowState {
            head: link_types::lowlevel::FRAME_HEAD,
            level_flag: link_types::lowlevel::LEVEL_FLAG_LOW,
            tick,
            ..LowState::default()
        };
        if let Some(cmd) = self.last_command.lock().as_ref() {
            for (motor, target) in state.motor_state.iter_mut().zip(cmd.motor_cmd.iter()) {
                motor.mode = target.mode;
                motor.q = target.q;
                motor.dq = target.dq;
                motor.tau_est = target.tau;
            }
        }
        seal(&mut state);
        state
    }

    /// Publish one sealed state on `topic`.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` if the publish is rejected.
    pub async fn publish_state(&self, topic: &str, tick: u32) -> LinkResult<()> {
        let state = self.current_state(tick);
        self.transport.publish(topic, state.into()).await?;
        self.counters.states_published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Publish sealed state on `topic` every `interval` until
    /// [`stop_state_stream`](Self::stop_state_stream). Returns `false` if a
    /// stream is already running.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for a zero interval or outside a Tokio runtime.
    pub fn start_state_stream(
        self: &Arc<Self>,
        topic: &'static str,
        interval: Duration,
    ) -> LinkResult<bool> {
        if interval.is_zero() {
            return Err(LinkError::InvalidRequest("state interval must be positive".into()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| LinkError::InvalidRequest("no Tokio runtime for state stream".into()))?;

        let mut task = self.state_task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(false);
        }
        let actuator = Arc::downgrade(self);
        *task = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut tick: u32 = 0;
            loop {
                ticker.tick().await;
                let Some(actuator) = actuator.upgrade() else {
                    break;
                };
                if let Err(e) = actuator.publish_state(topic, tick).await {
                    warn!(error = %e, "State stream stopped");
                    break;
                }
                tick = tick.wrapping_add(1);
            }
        }));
        info!(topic = %topic, interval_ms = interval.as_millis() as u64, "State stream started");
        Ok(true)
    }

    pub fn stop_state_stream(&self) -> bool {
        match self.state_task.lock().take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Publish a service list on `rt/servicestate`.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` if the publish is rejected.
    pub async fn publish_service_list(&self, json: impl Into<String>) -> LinkResult<()> {
        self.transport
            .publish(SERVICE_STATE, BusMessage::Text(json.into()))
            .await?;
        Ok(())
    }

    /// Publish one sport-state report on `topic`.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` if the publish is rejected.
    pub async fn publish_sport_state(&self, topic: &str, state: SportModeState) -> LinkResult<()> {
        self.transport.publish(topic, state.into()).await?;
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> ActuatorStats {
        ActuatorStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            responses: self.counters.responses.load(Ordering::Relaxed),
            commands_verified: self.counters.commands_verified.load(Ordering::Relaxed),
            commands_rejected: self.counters.commands_rejected.load(Ordering::Relaxed),
            states_published: self.counters.states_published.load(Ordering::Relaxed),
        }
    }

    /// Stop the state stream and drop every subscription.
    pub fn shutdown(&self) {
        self.stop_state_stream();
        for (topic, handle) in self.subscriptions.lock().drain(..) {
            match self.transport.unsubscribe(&topic, handle) {
                Ok(_) | Err(TransportError::Closed) => {}
                Err(e) => warn!(topic = %topic, error = %e, "Loopback unsubscribe failed"),
            }
        }
    }
}

impl Drop for LoopbackActuator {
    fn drop(&mut self) {
        if let Some(task) = self.state_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Publish `reply` for `request` on `response_topic`. Runs on the current
/// Tokio runtime; without one the reply is dropped.
fn respond(
    transport: Arc<dyn Transport>,
    counters: Arc<Counters>,
    response_topic: String,
    request: &RequestEnvelope,
    reply: Reply,
) {
    let Reply::Respond { code, data, delay } = reply else {
        debug!(api_id = request.api_id(), "Request ignored");
        return;
    };
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!(api_id = request.api_id(), "No Tokio runtime, reply dropped");
        return;
    };
    let mut response = ResponseEnvelope::success(request.header.identity, data);
    response.header.status.code = code;
    runtime.spawn(async move {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match transport.publish(&response_topic, response.into()).await {
            Ok(_) => {
                counters.responses.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!(topic = %response_topic, error = %e, "Loopback reply failed"),
        }
    });
}
