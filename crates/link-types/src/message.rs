//! # Bus Messages
//!
//! The closed set of payloads the transport carries. A topic is bound to a
//! single [`MessageKind`]; the transport rejects traffic of any other kind.

use std::fmt;

use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::lowlevel::{LowCmd, LowState};
use crate::sport_state::SportModeState;

/// Payload discriminant used to type topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    Response,
    LowCmd,
    LowState,
    SportModeState,
    Text,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::LowCmd => "low_cmd",
            MessageKind::LowState => "low_state",
            MessageKind::SportModeState => "sport_mode_state",
            MessageKind::Text => "text",
        };
        f.write_str(name)
    }
}

/// A message published on the transport.
///
/// Low-level records are boxed; they are large and copied on every tick.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    Request(RequestEnvelope),
    Response(ResponseEnvelope),
    LowCmd(Box<LowCmd>),
    LowState(Box<LowState>),
    SportModeState(Box<SportModeState>),
    /// Free-form string payload (service state reports and similar).
    Text(String),
}

impl BusMessage {
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            BusMessage::Request(_) => MessageKind::Request,
            BusMessage::Response(_) => MessageKind::Response,
            BusMessage::LowCmd(_) => MessageKind::LowCmd,
            BusMessage::LowState(_) => MessageKind::LowState,
            BusMessage::SportModeState(_) => MessageKind::SportModeState,
            BusMessage::Text(_) => MessageKind::Text,
        }
    }

    pub fn as_response(&self) -> Option<&ResponseEnvelope> {
        match self {
            BusMessage::Response(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_request(&self) -> Option<&RequestEnvelope> {
        match self {
            BusMessage::Request(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<ResponseEnvelope> {
        match self {
            BusMessage::Response(r) => Some(r),
            _ => None,
        }
    }
}

impl From<RequestEnvelope> for BusMessage {
    fn from(r: RequestEnvelope) -> Self {
        BusMessage::Request(r)
    }
}

impl From<ResponseEnvelope> for BusMessage {
    fn from(r: ResponseEnvelope) -> Self {
        BusMessage::Response(r)
    }
}

impl From<LowCmd> for BusMessage {
    fn from(c: LowCmd) -> Self {
        BusMessage::LowCmd(Box::new(c))
    }
}

impl From<LowState> for BusMessage {
    fn from(s: LowState) -> Self {
        BusMessage::LowState(Box::new(s))
    }
}

impl From<SportModeState> for BusMessage {
    fn from(s: SportModeState) -> Self {
        BusMessage::SportModeState(Box::new(s))
    }
}
