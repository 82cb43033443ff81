//! Allocation Strategies
//!
//! Placement policy a pool applies when creating an actor.

use serde::{Deserialize, Serialize};

/// Where a newly created actor should be placed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum AllocateStrategy {
    /// Pin to an explicit pool address
    AddressSpecified { address: String },
    /// The main pool of the receiving pool group
    MainPool,
    /// Any sub pool, chosen at random
    RandomSubPool,
    /// The sub pool with the given process index
    ProcessIndex { index: usize },
    /// An idle sub pool carrying `label`, marked with `mark` once used
    IdleLabel { label: String, mark: String },
}

impl AllocateStrategy {
    /// Pin to `address`
    pub fn address_specified(address: impl Into<String>) -> Self {
        Self::AddressSpecified {
            address: address.into(),
        }
    }

    /// Explicit address this strategy pins to, if any
    pub fn pinned_address(&self) -> Option<&str> {
        match self {
            Self::AddressSpecified { address } => Some(address),
            _ => None,
        }
    }
}
