//! Local Actor Registry
//!
//! Actors hosted by pools running in this process. A reference to one of
//! them is resolved without a network round trip.

use bytes::Bytes;
use dashmap::DashSet;
use once_cell::sync::Lazy;
use protocol::ActorRef;
use std::sync::Arc;
use tracing::debug;

static GLOBAL: Lazy<LocalActorRegistry> = Lazy::new(LocalActorRegistry::new);

/// Set of in-process actors, keyed by address and uid
#[derive(Debug, Clone, Default)]
pub struct LocalActorRegistry {
    actors: Arc<DashSet<ActorRef>>,
}

impl LocalActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by every pool in this process
    pub fn global() -> &'static LocalActorRegistry {
        &GLOBAL
    }

    /// Record that `actor_ref` is hosted in this process
    pub fn register(&self, actor_ref: ActorRef) {
        debug!(actor = %actor_ref, "Registering local actor");
        self.actors.insert(actor_ref);
    }

    /// Forget `actor_ref`, returning whether it was registered
    pub fn unregister(&self, actor_ref: &ActorRef) -> bool {
        let removed = self.actors.remove(actor_ref).is_some();
        if removed {
            debug!(actor = %actor_ref, "Unregistered local actor");
        }
        removed
    }

    pub fn contains(&self, actor_ref: &ActorRef) -> bool {
        self.actors.contains(actor_ref)
    }

    /// Local reference for `(address, uid)` if hosted here
    pub fn resolve(&self, address: &str, uid: &Bytes) -> Option<ActorRef> {
        let actor_ref = ActorRef::new(address, uid.clone());
        self.contains(&actor_ref).then_some(actor_ref)
    }

    /// Actors hosted at `address`
    pub fn actors_at(&self, address: &str) -> Vec<ActorRef> {
        self.actors
            .iter()
            .filter(|r| r.address() == address)
            .map(|r| r.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}
