//! Actor Call Error Types
//!
//! Errors raised by actor calls. Every variant is serializable so that an
//! [`ErrorMessage`](crate::ErrorMessage) can carry it back from the remote
//! pool and the caller observes the same variant it was raised with.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main actor call error type
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ActorError {
    /// The target actor is not hosted by the pool
    #[error("Actor {uid} does not exist at {address}")]
    ActorNotExist { address: String, uid: String },

    /// An actor with the requested uid is already hosted by the pool
    #[error("Actor {uid} already exists at {address}")]
    ActorAlreadyExist { address: String, uid: String },

    /// A cancel request arrived after the target call had already finished
    #[error("Cannot cancel task: {message}")]
    CannotCancelTask { message: String },

    /// The call was cancelled before it produced a result
    #[error("Call cancelled: {message}")]
    Cancelled { message: String },

    /// Killing an actor that lives directly on its main pool
    #[error("Cannot kill actor {uid} on main pool {address}")]
    MainPoolKill { address: String, uid: String },

    /// A waiting send back into the current call chain would deadlock
    #[error("Cycle send detected: {message}")]
    CycleSend { message: String },

    /// Any other failure raised by the remote side, kind preserved
    #[error("Remote error ({kind}): {message}")]
    Remote { kind: String, message: String },

    /// The transport could not deliver the message or its response
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The response did not have the expected shape
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Invalid local configuration
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },
}

/// Result type alias for actor calls
pub type Result<T> = std::result::Result<T, ActorError>;

impl ActorError {
    /// Create an actor-not-exist error
    pub fn actor_not_exist(address: impl Into<String>, uid: impl Into<String>) -> Self {
        Self::ActorNotExist {
            address: address.into(),
            uid: uid.into(),
        }
    }

    /// Create an actor-already-exist error
    pub fn actor_already_exist(address: impl Into<String>, uid: impl Into<String>) -> Self {
        Self::ActorAlreadyExist {
            address: address.into(),
            uid: uid.into(),
        }
    }

    /// Create a cannot-cancel error
    pub fn cannot_cancel(message: impl Into<String>) -> Self {
        Self::CannotCancelTask {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create a main pool kill error
    pub fn main_pool_kill(address: impl Into<String>, uid: impl Into<String>) -> Self {
        Self::MainPoolKill {
            address: address.into(),
            uid: uid.into(),
        }
    }

    /// Create a cycle send error
    pub fn cycle_send(message: impl Into<String>) -> Self {
        Self::CycleSend {
            message: message.into(),
        }
    }

    /// Create a remote error with the remote error kind
    pub fn remote(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Check if this error reports a cancelled call
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Check if this error reports a cancel that arrived too late
    pub fn is_cannot_cancel(&self) -> bool {
        matches!(self, Self::CannotCancelTask { .. })
    }

    /// Check if this error was raised locally without any remote call
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::MainPoolKill { .. } | Self::CycleSend { .. } | Self::Configuration { .. }
        )
    }
}

impl From<serde_json::Error> for ActorError {
    fn from(err: serde_json::Error) -> Self {
        ActorError::protocol(format!("Malformed result payload: {}", err))
    }
}
