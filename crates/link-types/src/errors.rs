//! # Error Types
//!
//! Failure kinds surfaced by the correlator, the checksum framer and the
//! transport. Every failure caused by remote input is converted into one of
//! these kinds and returned; nothing here is allowed to take the process down.

use std::time::Duration;
use thiserror::Error;

use crate::message::MessageKind;

/// Errors raised by a Transport Adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport was closed and accepts no more traffic.
    #[error("transport closed")]
    Closed,

    /// The topic is already bound to a different message kind.
    #[error("topic {topic} carries {expected} messages, not {actual}")]
    TypeMismatch {
        topic: String,
        expected: MessageKind,
        actual: MessageKind,
    },

    /// The underlying middleware refused the operation.
    #[error("transport rejected operation: {0}")]
    Rejected(String),
}

/// Unified error kind returned to callers of the link.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LinkError {
    /// No matching response arrived before the deadline.
    #[error("no response on {topic} within {timeout:?}")]
    Timeout { topic: String, timeout: Duration },

    /// The remote side answered with a nonzero status code.
    #[error("remote returned status {code}: {description}")]
    RemoteError { code: i32, description: String },

    /// A low-level state record failed checksum verification.
    #[error("checksum mismatch: carried {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    /// A response payload could not be interpreted as the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The Transport Adapter rejected a publish or subscribe.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(#[from] TransportError),

    /// The call was abandoned before resolution (shutdown drain or dropped future).
    #[error("call cancelled")]
    Cancelled,

    /// The request was malformed before anything was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl LinkError {
    /// Remote status code, if this is a remote error.
    #[must_use]
    pub fn remote_code(&self) -> Option<i32> {
        match self {
            LinkError::RemoteError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True for `Timeout`.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout { .. })
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(e: serde_json::Error) -> Self {
        LinkError::Decode(e.to_string())
    }
}

/// Result type for link operations.
pub type LinkResult<T> = Result<T, LinkError>;
