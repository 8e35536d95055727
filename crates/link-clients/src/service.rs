//! # Service Client
//!
//! One request topic, one correlator, one timeout. The typed clients in this
//! crate are thin layers over [`ServiceClient`].

use link_rpc::{CallOptions, CallOutcome, Correlator};
use link_types::{response_topic_for, LinkError, LinkResult, ResponseEnvelope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::api::Service;

/// Whether a command waits for the remote acknowledgement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Ack {
    /// Wait for the response and surface remote errors.
    #[default]
    Wait,
    /// Publish with `no_reply` set and return immediately.
    FireAndForget,
}

#[derive(Clone)]
pub struct ServiceClient {
    correlator: Arc<Correlator>,
    service: Service,
    timeout: Option<Duration>,
    priority: u8,
}

impl ServiceClient {
    pub fn new(correlator: Arc<Correlator>, service: Service) -> Self {
        Self {
            correlator,
            service,
            timeout: None,
            priority: 0,
        }
    }

    /// Override the correlator's default timeout for every call.
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

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn topic(&self) -> &'static str {
        self.service.request_topic()
    }

    /// Topic responses arrive on.
    pub fn response_topic(&self) -> Option<String> {
        response_topic_for(self.topic())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn options(&self, ack: Ack) -> CallOptions {
        let options = CallOptions {
            priority: self.priority,
            timeout: self.timeout,
            ..CallOptions::default()
        };
        match ack {
            Ack::Wait => options,
            Ack::FireAndForget => CallOptions {
                no_reply: true,
                ..options
            },
        }
    }

    /// Send a command. With [`Ack::Wait`] a nonzero remote status is an error.
    ///
    /// # Errors
    ///
    /// Any [`LinkError`] surfaced by the correlator.
    pub async fn command<P: Serialize + ?Sized>(
        &self,
        api_id: u32,
        parameter: Option<&P>,
        ack: Ack,
    ) -> LinkResult<CallOutcome> {
        let outcome = self
            .correlator
            .call_json(self.topic(), api_id, parameter, self.options(ack))
            .await?;
        info!(
            topic = %self.topic(),
            api_id,
            api = self.service.api_name(api_id).unwrap_or("unknown"),
            correlation_id = outcome.correlation_id(),
            "Command accepted"
        );
        Ok(outcome)
    }

    /// Send a request and return the matching response.
    ///
    /// # Errors
    ///
    /// Any [`LinkError`] surfaced by the correlator.
    pub async fn request<P: Serialize + ?Sized>(
        &self,
        api_id: u32,
        parameter: Option<&P>,
    ) -> LinkResult<ResponseEnvelope> {
        let outcome = self
            .correlator
            .call_json(self.topic(), api_id, parameter, self.options(Ack::Wait))
            .await?;
        outcome.into_response().ok_or_else(|| {
            LinkError::InvalidRequest(format!("api {api_id} completed without a response"))
        })
    }

    /// Send a request and decode the response's `data` as JSON.
    ///
    /// # Errors
    ///
    /// `Decode` if the data does not parse as `T`, otherwise as
    /// [`request`](Self::request).
    pub async fn request_data<P, T>(&self, api_id: u32, parameter: Option<&P>) -> LinkResult<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(api_id, parameter).await?;
        debug!(api_id, bytes = response.data.len(), "Decoding response data");
        response.decode_data()
    }
}

/// `{"data": value}`, the parameter shape shared by most setters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, serde::Deserialize)]
pub struct DataParam<T> {
    pub data: T,
}

impl<T> DataParam<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Encode a boolean flag the way the remote expects it (`0`/`1`).
pub fn flag(value: bool) -> DataParam<u8> {
    DataParam::new(u8::from(value))
}

/// Reject `value` outside `min..=max` with `InvalidRequest`.
///
/// # Errors
///
/// `InvalidRequest` naming the parameter and its range.
pub fn check_range<T>(name: &str, value: T, min: T, max: T) -> LinkResult<T>
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    if value >= min && value <= max {
        Ok(value)
    } else {
        Err(LinkError::InvalidRequest(format!(
            "{name} {value} is outside [{min}, {max}]"
        )))
    }
}
