//! Actor References
//!
//! An [`ActorRef`] names one actor instance: the pool address hosting it and
//! a uid unique within that pool.

use crate::{ActorError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

/// Reference to an actor hosted by a pool
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorRef {
    address: String,
    uid: Bytes,
}

impl ActorRef {
    /// Create a new actor reference
    pub fn new(address: impl Into<String>, uid: impl Into<Bytes>) -> Self {
        Self {
            address: address.into(),
            uid: uid.into(),
        }
    }

    /// Pool address hosting the actor
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Raw uid
    pub fn uid(&self) -> &Bytes {
        &self.uid
    }

    /// Uid rendered as text (lossy for non UTF-8 uids)
    pub fn uid_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.uid)
    }

    /// Same actor, different hosting address
    pub fn with_address(&self, address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            uid: self.uid.clone(),
        }
    }

    /// Encode as a result payload
    pub fn to_value(&self) -> Value {
        // Serializing a struct of a string and bytes cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Decode from a result payload
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| ActorError::protocol(format!("Expected an actor ref: {}", e)))
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorRef(uid={}, address={})", self.uid_str(), self.address)
    }
}
