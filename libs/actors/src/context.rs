//! Actor Context
//!
//! Turns actor operations into protocol messages, dispatches them through an
//! [`ActorCaller`] and unwraps the responses. Every awaited response goes
//! through the cancellation-safe wait in [`crate::wait`].

use crate::caller::{ActorCaller, PendingResponse};
use crate::config::ContextConfig;
use crate::debug::{detect_cycle_send, log_on_timeout, truncate_repr};
use crate::local::LocalActorRegistry;
use crate::wait::wait_response;
use bytes::Bytes;
use profiling::ProfilingData;
use protocol::{
    ActorError, ActorRef, AllocateStrategy, CallContent, Message, MessageId, ProfilingContext,
    Result,
};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Placement options of [`ActorContext::create_actor`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateActorOptions {
    /// Uid of the new actor; the pool picks one when `None`
    pub uid: Option<Bytes>,
    /// Pool to send the request to
    pub address: Option<String>,
    /// Placement policy, pinned to the target address when `None`
    pub allocate_strategy: Option<AllocateStrategy>,
}

impl CreateActorOptions {
    pub fn with_uid(mut self, uid: impl Into<Bytes>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_allocate_strategy(mut self, strategy: AllocateStrategy) -> Self {
        self.allocate_strategy = Some(strategy);
        self
    }
}

/// Result of [`ActorContext::send`]
#[derive(Debug)]
pub enum SendOutcome {
    /// The call was awaited and returned this value
    Response(Value),
    /// The call was dispatched without waiting
    Pending(PendingResponse),
}

impl SendOutcome {
    pub fn into_response(self) -> Option<Value> {
        match self {
            Self::Response(value) => Some(value),
            Self::Pending(_) => None,
        }
    }

    pub fn into_pending(self) -> Option<PendingResponse> {
        match self {
            Self::Response(_) => None,
            Self::Pending(pending) => Some(pending),
        }
    }

    /// Value of the call, awaiting it if it is still pending
    pub async fn resolve(self) -> Result<Value> {
        match self {
            Self::Response(value) => Ok(value),
            Self::Pending(pending) => pending.await?.into_result(),
        }
    }
}

/// Owns the caller; releases its in-flight calls with the last context
struct CallerHandle {
    caller: Arc<dyn ActorCaller>,
}

impl Drop for CallerHandle {
    fn drop(&mut self) {
        self.caller.cancel_tasks();
    }
}

/// Client-side entry point for actor operations
///
/// Cheap to clone. Clones share the underlying caller; the caller's
/// `cancel_tasks` runs when the last clone is dropped.
#[derive(Clone)]
pub struct ActorContext {
    handle: Arc<CallerHandle>,
    address: Option<String>,
    config: Arc<ContextConfig>,
    local: LocalActorRegistry,
    profiling: Option<ProfilingData>,
    cancel_token: Option<CancellationToken>,
}

impl fmt::Debug for ActorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorContext")
            .field("address", &self.address)
            .field("config", &self.config)
            .field("profiling", &self.profiling.is_some())
            .field("cancellable", &self.cancel_token.is_some())
            .finish()
    }
}

impl ActorContext {
    pub fn new(caller: Arc<dyn ActorCaller>) -> Self {
        Self {
            handle: Arc::new(CallerHandle { caller }),
            address: None,
            config: Arc::new(ContextConfig::default()),
            local: LocalActorRegistry::global().clone(),
            profiling: None,
            cancel_token: None,
        }
    }

    /// Default pool for operations that do not name one
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_config(mut self, config: ContextConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Registry used for local reference resolution
    pub fn with_local_registry(mut self, local: LocalActorRegistry) -> Self {
        self.local = local;
        self
    }

    /// Clone whose waits are bound to `token`
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel_token: Some(token),
            ..self.clone()
        }
    }

    /// Clone reporting Send/Tell durations to `registry`
    pub fn with_profiling(&self, registry: ProfilingData) -> Self {
        Self {
            profiling: Some(registry),
            ..self.clone()
        }
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancel_token.as_ref()
    }

    pub(crate) fn caller(&self) -> &Arc<dyn ActorCaller> {
        &self.handle.caller
    }

    /// Create an actor of `actor_cls`
    ///
    /// The request goes to the explicit address, else the context's address,
    /// else the caller's external address.
    pub async fn create_actor(
        &self,
        actor_cls: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        options: CreateActorOptions,
    ) -> Result<ActorRef> {
        let address = options
            .address
            .or_else(|| self.address.clone())
            .or_else(|| self.caller().external_address())
            .ok_or_else(|| {
                ActorError::configuration("No address to create the actor on", Some("address"))
            })?;
        let strategy = options
            .allocate_strategy
            .unwrap_or_else(|| AllocateStrategy::address_specified(address.as_str()));

        let message = Message::create_actor(actor_cls, options.uid, args, kwargs, strategy);
        let value = self.call_and_wait(&address, message).await?;
        ActorRef::from_value(value)
    }

    pub async fn has_actor(&self, actor_ref: &ActorRef) -> Result<bool> {
        let message = Message::has_actor(actor_ref.clone());
        let value = self.call_and_wait(actor_ref.address(), message).await?;
        value
            .as_bool()
            .ok_or_else(|| ActorError::protocol(format!("Expected a boolean, got {}", value)))
    }

    pub async fn destroy_actor(&self, actor_ref: &ActorRef) -> Result<Value> {
        let message = Message::destroy_actor(actor_ref.clone());
        self.call_and_wait(actor_ref.address(), message).await
    }

    /// Canonical reference of `actor_ref`
    ///
    /// Actors hosted in this process resolve locally without a call.
    pub async fn actor_ref(&self, actor_ref: &ActorRef) -> Result<ActorRef> {
        if let Some(local) = self.local.resolve(actor_ref.address(), actor_ref.uid()) {
            debug!(actor = %local, "Resolved actor ref locally");
            return Ok(local);
        }
        let message = Message::actor_ref_lookup(actor_ref.clone());
        let value = self.call_and_wait(actor_ref.address(), message).await?;
        ActorRef::from_value(value)
    }

    /// Call `content` on `actor_ref`
    ///
    /// With `wait_response` the call is awaited and its value returned;
    /// otherwise the pending handle is returned right after dispatch. A call
    /// running past the configured threshold is logged but not aborted.
    pub async fn send(
        &self,
        actor_ref: &ActorRef,
        content: CallContent,
        wait_response: bool,
        profiling_context: Option<ProfilingContext>,
    ) -> Result<SendOutcome> {
        let describe = {
            let repr = content.to_string();
            let max_len = self.config.max_repr_len;
            let actor_ref = actor_ref.clone();
            move || {
                format!(
                    "Calling {} on {} at {} timed out",
                    truncate_repr(&repr, max_len),
                    actor_ref.uid_str(),
                    actor_ref.address()
                )
            }
        };
        let message = Message::send(actor_ref.clone(), content, profiling_context);

        log_on_timeout(self.config.call_timeout_threshold, describe, async {
            if self.config.detect_cycle_send {
                detect_cycle_send(&message, wait_response)?;
            }
            if wait_response {
                let value = self.call_and_wait(actor_ref.address(), message).await?;
                Ok::<_, ActorError>(SendOutcome::Response(value))
            } else {
                let pending = self.dispatch(actor_ref.address(), message).await?;
                Ok::<_, ActorError>(SendOutcome::Pending(pending))
            }
        })
        .await
    }

    /// [`send`](Self::send) that waits and returns the value
    pub async fn call(&self, actor_ref: &ActorRef, content: CallContent) -> Result<Value> {
        match self.send(actor_ref, content, true, None).await? {
            SendOutcome::Response(value) => Ok(value),
            SendOutcome::Pending(pending) => pending.await?.into_result(),
        }
    }

    /// Fire-and-forget call; waits only for the pool's acknowledgement
    pub async fn tell(&self, actor_ref: &ActorRef, content: CallContent) -> Result<()> {
        let message = Message::tell(actor_ref.clone(), content);
        self.call_and_wait(actor_ref.address(), message).await?;
        Ok(())
    }

    /// Ask the pool at `address` to cancel the call `cancel_message_id`
    ///
    /// Awaited plainly: a cancel request is never itself cancelled.
    pub async fn cancel(&self, address: &str, cancel_message_id: MessageId) -> Result<Value> {
        let message = Message::cancel(address, cancel_message_id);
        self.dispatch(address, message).await?.await?.into_result()
    }

    pub(crate) async fn dispatch(&self, address: &str, message: Message) -> Result<PendingResponse> {
        debug!(
            address,
            message_id = %message.message_id(),
            message_type = ?message.message_type(),
            "Dispatching actor message"
        );
        self.caller().call(address, message).await
    }

    /// Dispatch, wait cancellation-safely, unwrap the value
    pub(crate) async fn call_and_wait(&self, address: &str, message: Message) -> Result<Value> {
        let message_id = message.message_id();
        let profiled = match &self.profiling {
            Some(registry) if message.is_actor_call() => Some((registry.clone(), message.clone())),
            _ => None,
        };

        let started = Instant::now();
        let pending = self.dispatch(address, message).await?;
        let response = wait_response(
            self.caller(),
            address,
            message_id,
            pending,
            self.cancel_token.as_ref(),
        )
        .await;

        if let (Some((registry, message)), Ok(_)) = (&profiled, &response) {
            registry.collect_actor_call(message, started.elapsed().as_secs_f64());
        }
        response?.into_result()
    }
}
