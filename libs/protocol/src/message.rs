//! Actor Call Messages
//!
//! Typed envelopes sent from a caller to an actor pool. Every message carries
//! a fresh [`MessageId`], which is the only key used to correlate the response
//! and to cancel that specific call later.

use crate::{ActorRef, AllocateStrategy, ControlMessage, DEFAULT_PROTOCOL};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Unique message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a fresh message id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Generate a unique message id
pub fn new_message_id() -> MessageId {
    MessageId::new()
}

/// Profiling scope a send belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilingContext {
    pub task_id: String,
}

impl ProfilingContext {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
        }
    }
}

/// Method invocation carried by Send and Tell messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallContent {
    pub method: String,
    pub batch: bool,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl CallContent {
    /// Call `method` with no arguments
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            batch: false,
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Replace positional arguments
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Add a keyword argument
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Mark as a batched call
    pub fn batched(mut self) -> Self {
        self.batch = true;
        self
    }
}

impl fmt::Display for CallContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(args={}, kwargs={})",
            self.method,
            Value::Array(self.args.clone()),
            Value::Object(self.kwargs.clone())
        )
    }
}

/// Message kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    CreateActor,
    DestroyActor,
    HasActor,
    ActorRef,
    Send,
    Tell,
    Cancel,
    Control,
}

/// Typed message payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePayload {
    CreateActor {
        actor_cls: String,
        uid: Option<Bytes>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        allocate_strategy: AllocateStrategy,
    },
    DestroyActor {
        actor_ref: ActorRef,
    },
    HasActor {
        actor_ref: ActorRef,
    },
    ActorRef {
        actor_ref: ActorRef,
    },
    Send {
        actor_ref: ActorRef,
        content: CallContent,
        profiling_context: Option<ProfilingContext>,
    },
    Tell {
        actor_ref: ActorRef,
        content: CallContent,
    },
    Cancel {
        address: String,
        cancel_message_id: MessageId,
    },
    Control(ControlMessage),
}

/// Message envelope sent to an actor pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    message_id: MessageId,
    protocol: u8,
    payload: MessagePayload,
}

impl Message {
    /// Wrap a payload with a fresh message id
    pub fn new(payload: MessagePayload) -> Self {
        Self {
            message_id: new_message_id(),
            protocol: DEFAULT_PROTOCOL,
            payload,
        }
    }

    pub fn create_actor(
        actor_cls: impl Into<String>,
        uid: Option<Bytes>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        allocate_strategy: AllocateStrategy,
    ) -> Self {
        Self::new(MessagePayload::CreateActor {
            actor_cls: actor_cls.into(),
            uid,
            args,
            kwargs,
            allocate_strategy,
        })
    }

    pub fn destroy_actor(actor_ref: ActorRef) -> Self {
        Self::new(MessagePayload::DestroyActor { actor_ref })
    }

    pub fn has_actor(actor_ref: ActorRef) -> Self {
        Self::new(MessagePayload::HasActor { actor_ref })
    }

    pub fn actor_ref_lookup(actor_ref: ActorRef) -> Self {
        Self::new(MessagePayload::ActorRef { actor_ref })
    }

    pub fn send(
        actor_ref: ActorRef,
        content: CallContent,
        profiling_context: Option<ProfilingContext>,
    ) -> Self {
        Self::new(MessagePayload::Send {
            actor_ref,
            content,
            profiling_context,
        })
    }

    pub fn tell(actor_ref: ActorRef, content: CallContent) -> Self {
        Self::new(MessagePayload::Tell { actor_ref, content })
    }

    pub fn cancel(address: impl Into<String>, cancel_message_id: MessageId) -> Self {
        Self::new(MessagePayload::Cancel {
            address: address.into(),
            cancel_message_id,
        })
    }

    pub fn control(control: ControlMessage) -> Self {
        Self::new(MessagePayload::Control(control))
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    pub fn payload(&self) -> &MessagePayload {
        &self.payload
    }

    pub fn message_type(&self) -> MessageType {
        match &self.payload {
            MessagePayload::CreateActor { .. } => MessageType::CreateActor,
            MessagePayload::DestroyActor { .. } => MessageType::DestroyActor,
            MessagePayload::HasActor { .. } => MessageType::HasActor,
            MessagePayload::ActorRef { .. } => MessageType::ActorRef,
            MessagePayload::Send { .. } => MessageType::Send,
            MessagePayload::Tell { .. } => MessageType::Tell,
            MessagePayload::Cancel { .. } => MessageType::Cancel,
            MessagePayload::Control(_) => MessageType::Control,
        }
    }

    /// Target actor, for actor-level messages
    pub fn actor_ref(&self) -> Option<&ActorRef> {
        match &self.payload {
            MessagePayload::DestroyActor { actor_ref }
            | MessagePayload::HasActor { actor_ref }
            | MessagePayload::ActorRef { actor_ref }
            | MessagePayload::Send { actor_ref, .. }
            | MessagePayload::Tell { actor_ref, .. } => Some(actor_ref),
            _ => None,
        }
    }

    /// Method invocation, for Send and Tell
    pub fn call_content(&self) -> Option<&CallContent> {
        match &self.payload {
            MessagePayload::Send { content, .. } | MessagePayload::Tell { content, .. } => {
                Some(content)
            }
            _ => None,
        }
    }

    /// Whether this message invokes an actor method (Send or Tell)
    pub fn is_actor_call(&self) -> bool {
        matches!(self.message_type(), MessageType::Send | MessageType::Tell)
    }
}
