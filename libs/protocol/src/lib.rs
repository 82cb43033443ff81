//! Actor Call Protocol
//!
//! Typed envelopes exchanged between a caller and a remote actor pool:
//! actor lifecycle (create, destroy, has, lookup), method calls (send, tell),
//! cancellation and pool control. Each message carries a unique id used to
//! correlate its response and to cancel it.

pub mod actor_ref;
pub mod control;
pub mod error;
pub mod message;
pub mod response;
pub mod strategy;

pub use actor_ref::ActorRef;
pub use control::{
    ControlMessage, ControlMessageType, DEFAULT_STOP_TIMEOUT_SECS, MAIN_POOL_ADDRESS_FIELD,
};
pub use error::{ActorError, Result};
pub use message::{
    new_message_id, CallContent, Message, MessageId, MessagePayload, MessageType,
    ProfilingContext,
};
pub use response::{ErrorMessage, ResponseMessage, ResultMessage};
pub use strategy::AllocateStrategy;

/// Protocol version stamped on every message
pub const DEFAULT_PROTOCOL: u8 = 0;
