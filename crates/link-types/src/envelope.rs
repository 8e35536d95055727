//! # Request / Response Envelopes
//!
//! The wire shape of every correlated call:
//!
//! ```text
//! Request  { header: { identity: { id, apiId }, lease: { id }, policy: { priority, noReply } },
//!            parameter, binary }
//! Response { header: { identity: { id, apiId }, status: { code } }, data, binary }
//! ```
//!
//! `identity.id` is the correlation id. The remote side echoes it in the
//! response; nothing else links a response to its request.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::LinkError;
use crate::status::SUCCESS;

/// Correlation id plus the API being invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestIdentity {
    /// Correlation id, unique among in-flight calls of one correlator.
    pub id: u32,
    /// Numeric API identifier on the remote service.
    pub api_id: u32,
}

/// Reserved capability token. Opaque to the link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLease {
    pub id: u32,
}

/// Delivery hints for the remote side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPolicy {
    /// Priority hint. Not an ordering contract.
    pub priority: u8,
    /// The remote side must not answer.
    pub no_reply: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub identity: RequestIdentity,
    pub lease: RequestLease,
    pub policy: RequestPolicy,
}

/// A request as published on a `.../request` topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub header: RequestHeader,
    /// Caller-supplied parameter, usually JSON text. Empty when absent.
    pub parameter: String,
    /// Auxiliary payload, usually empty.
    pub binary: Vec<u8>,
}

impl RequestEnvelope {
    /// Build a request with the given identity and policy and no lease.
    pub fn new(identity: RequestIdentity, policy: RequestPolicy, parameter: String) -> Self {
        Self {
            header: RequestHeader {
                identity,
                lease: RequestLease::default(),
                policy,
            },
            parameter,
            binary: Vec::new(),
        }
    }

    #[must_use]
    pub fn correlation_id(&self) -> u32 {
        self.header.identity.id
    }

    #[must_use]
    pub fn api_id(&self) -> u32 {
        self.header.identity.api_id
    }

    /// True unless the policy asks the remote side not to answer.
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        !self.header.policy.no_reply
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseStatus {
    /// 0 on success; anything else is looked up in the status table.
    pub code: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub identity: RequestIdentity,
    pub status: ResponseStatus,
}

/// A response as published on a `.../response` topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub header: ResponseHeader,
    /// Result payload, usually JSON text.
    pub data: String,
    pub binary: Vec<u8>,
}

impl ResponseEnvelope {
    /// Successful response echoing `identity`.
    pub fn success(identity: RequestIdentity, data: impl Into<String>) -> Self {
        Self {
            header: ResponseHeader {
                identity,
                status: ResponseStatus { code: SUCCESS },
            },
            data: data.into(),
            binary: Vec::new(),
        }
    }

    /// Failed response echoing `identity` with a nonzero status code.
    pub fn failure(identity: RequestIdentity, code: i32) -> Self {
        Self {
            header: ResponseHeader {
                identity,
                status: ResponseStatus { code },
            },
            data: String::new(),
            binary: Vec::new(),
        }
    }

    #[must_use]
    pub fn correlation_id(&self) -> u32 {
        self.header.identity.id
    }

    #[must_use]
    pub fn status_code(&self) -> i32 {
        self.header.status.code
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.header.status.code == SUCCESS
    }

    /// Interpret `data` as JSON of shape `T`.
    ///
    /// # Errors
    ///
    /// `LinkError::Decode` if `data` is not valid JSON for `T`.
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T, LinkError> {
        serde_json::from_str(&self.data).map_err(|e| {
            LinkError::Decode(format!(
                "response {} (api {}): {}",
                self.header.identity.id, self.header.identity.api_id, e
            ))
        })
    }
}
