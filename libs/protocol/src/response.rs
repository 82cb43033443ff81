//! Response Envelopes
//!
//! Every dispatched message resolves to exactly one [`ResponseMessage`]:
//! either a success value or the [`ActorError`] raised remotely.

use crate::{ActorError, MessageId, Result, DEFAULT_PROTOCOL};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Successful call result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub message_id: MessageId,
    pub result: Value,
    pub protocol: u8,
}

/// Failed call, carrying the error raised by the remote side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message_id: MessageId,
    /// Address of the pool that raised the error
    pub address: String,
    /// Process id of the pool that raised the error
    pub pid: u32,
    pub error: ActorError,
    pub protocol: u8,
}

/// Response to a dispatched message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseMessage {
    Result(ResultMessage),
    Error(ErrorMessage),
}

impl ResponseMessage {
    /// Successful response
    pub fn ok(message_id: MessageId, result: impl Into<Value>) -> Self {
        Self::Result(ResultMessage {
            message_id,
            result: result.into(),
            protocol: DEFAULT_PROTOCOL,
        })
    }

    /// Error response raised by the pool at `address`
    pub fn error(message_id: MessageId, address: impl Into<String>, error: ActorError) -> Self {
        Self::Error(ErrorMessage {
            message_id,
            address: address.into(),
            pid: std::process::id(),
            error,
            protocol: DEFAULT_PROTOCOL,
        })
    }

    pub fn message_id(&self) -> MessageId {
        match self {
            Self::Result(r) => r.message_id,
            Self::Error(e) => e.message_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Unwrap into the result value, re-raising the remote error unchanged
    pub fn into_result(self) -> Result<Value> {
        match self {
            Self::Result(r) => Ok(r.result),
            Self::Error(e) => Err(e.error),
        }
    }
}
