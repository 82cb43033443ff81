//! Pool Control Messages
//!
//! Administrative requests that target a pool rather than an actor.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Config field holding the address of a pool's main pool
pub const MAIN_POOL_ADDRESS_FIELD: &str = "main_pool_address";

/// Timeout handed to the main pool when stopping a sub pool
pub const DEFAULT_STOP_TIMEOUT_SECS: f64 = 3.0;

/// Control operation requested from a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMessageType {
    /// Read the whole pool config, or one field of it
    GetConfig,
    /// Tear down a sub pool
    Stop,
    /// Block until a crashed sub pool has restarted
    WaitPoolRecovered,
}

/// Control message payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Pool the operation applies to
    pub address: String,
    pub control_type: ControlMessageType,
    pub args: Value,
}

impl ControlMessage {
    pub fn new(address: impl Into<String>, control_type: ControlMessageType, args: Value) -> Self {
        Self {
            address: address.into(),
            control_type,
            args,
        }
    }

    /// Fetch the full config (`field = None`) or a single field
    pub fn get_config(address: impl Into<String>, field: Option<&str>) -> Self {
        let args = field.map(|f| Value::String(f.to_string())).unwrap_or(Value::Null);
        Self::new(address, ControlMessageType::GetConfig, args)
    }

    /// Stop the sub pool at `address`, args are `[timeout, force]`
    pub fn stop(address: impl Into<String>, timeout_secs: f64, force: bool) -> Self {
        Self::new(address, ControlMessageType::Stop, json!([timeout_secs, force]))
    }

    /// Wait until the sub pool at `address` has recovered
    pub fn wait_pool_recovered(address: impl Into<String>) -> Self {
        Self::new(address, ControlMessageType::WaitPoolRecovered, Value::Null)
    }

    /// Requested config field, for get_config messages
    pub fn config_field(&self) -> Option<&str> {
        match self.control_type {
            ControlMessageType::GetConfig => self.args.as_str(),
            _ => None,
        }
    }

    /// `(timeout, force)`, for stop messages
    pub fn stop_args(&self) -> Option<(f64, bool)> {
        if self.control_type != ControlMessageType::Stop {
            return None;
        }
        let timeout = self.args.get(0)?.as_f64()?;
        let force = self.args.get(1)?.as_bool()?;
        Some((timeout, force))
    }
}
