//! In-Process Test Pool
//!
//! [`TestPool`] implements [`ActorCaller`] for a simulated pool group (one
//! main pool plus sub pools) living entirely in memory. It hosts fake
//! actors, runs a few built-in methods, honours Cancel and Control messages
//! and records every message it receives. ActorRef lookups can be redirected
//! to another pool with [`TestPool::add_alias`].
//!
//! Built-in methods:
//!
//! | method | behaviour |
//! |---|---|
//! | `echo` | returns its first argument |
//! | `sleep` | sleeps `args[0]` seconds, returns `args[1]`; cancellable |
//! | `shielded_sleep` | as `sleep`, but ignores cancel requests |
//! | `fail` | raises a remote error of kind `args[0]` with message `args[1]` |
//! | `call` | calls method `args[1]` on the actor ref `args[0]` and waits |

use crate::caller::{ActorCaller, PendingResponse, ResponseSender};
use crate::context::ActorContext;
use crate::debug::with_call_chain;
use crate::local::LocalActorRegistry;
use async_trait::async_trait;
use parking_lot::Mutex;
use protocol::{
    ActorError, ActorRef, AllocateStrategy, CallContent, ControlMessage, ControlMessageType,
    Message, MessageId, MessagePayload, MessageType, ResponseMessage, Result,
    MAIN_POOL_ADDRESS_FIELD,
};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

struct InFlight {
    sender: ResponseSender,
    abort: Option<AbortHandle>,
    cancellable: bool,
}

/// Simulated pool group
pub struct TestPool {
    me: Weak<TestPool>,
    main_address: String,
    sub_addresses: Mutex<Vec<String>>,
    actors: Mutex<HashSet<ActorRef>>,
    in_flight: Mutex<HashMap<MessageId, InFlight>>,
    aliases: Mutex<HashMap<ActorRef, ActorRef>>,
    received: Mutex<Vec<(String, Message)>>,
    cancel_failure: Mutex<Option<ActorError>>,
    recover_delay: Mutex<Duration>,
    local: Option<LocalActorRegistry>,
    next_uid: AtomicUsize,
    cancel_tasks_calls: AtomicUsize,
}

impl std::fmt::Debug for TestPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestPool")
            .field("main_address", &self.main_address)
            .field("sub_addresses", &*self.sub_addresses.lock())
            .field("actors", &self.actors.lock().len())
            .finish()
    }
}

impl TestPool {
    /// Pool group with `main_address` and the given sub pools
    pub fn new(main_address: &str, sub_addresses: &[&str]) -> Arc<Self> {
        Self::build(main_address, sub_addresses, None)
    }

    /// Pool group that also registers its actors in `local`
    pub fn with_local_registry(
        main_address: &str,
        sub_addresses: &[&str],
        local: LocalActorRegistry,
    ) -> Arc<Self> {
        Self::build(main_address, sub_addresses, Some(local))
    }

    fn build(
        main_address: &str,
        sub_addresses: &[&str],
        local: Option<LocalActorRegistry>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            main_address: main_address.to_string(),
            sub_addresses: Mutex::new(sub_addresses.iter().map(|a| a.to_string()).collect()),
            actors: Mutex::new(HashSet::new()),
            in_flight: Mutex::new(HashMap::new()),
            aliases: Mutex::new(HashMap::new()),
            received: Mutex::new(Vec::new()),
            cancel_failure: Mutex::new(None),
            recover_delay: Mutex::new(Duration::ZERO),
            local,
            next_uid: AtomicUsize::new(0),
            cancel_tasks_calls: AtomicUsize::new(0),
        })
    }

    /// Context dispatching through this pool, isolated from the process-wide
    /// local registry
    pub fn context(self: &Arc<Self>) -> ActorContext {
        let caller: Arc<dyn ActorCaller> = self.clone();
        ActorContext::new(caller).with_local_registry(LocalActorRegistry::new())
    }

    pub fn main_address(&self) -> &str {
        &self.main_address
    }

    pub fn sub_addresses(&self) -> Vec<String> {
        self.sub_addresses.lock().clone()
    }

    /// Host `actor_ref` directly, bypassing CreateActor
    pub fn add_actor(&self, actor_ref: ActorRef) {
        if let Some(local) = &self.local {
            local.register(actor_ref.clone());
        }
        self.actors.lock().insert(actor_ref);
    }

    /// Resolve ActorRef lookups for `requested` to `real`
    pub fn add_alias(&self, requested: ActorRef, real: ActorRef) {
        self.aliases.lock().insert(requested, real);
    }

    pub fn hosts(&self, actor_ref: &ActorRef) -> bool {
        self.actors.lock().contains(actor_ref)
    }

    /// Answer the next cancel request with `error` instead of cancelling
    pub fn fail_next_cancel(&self, error: ActorError) {
        *self.cancel_failure.lock() = Some(error);
    }

    /// Delay before a `wait_pool_recovered` control message resolves
    pub fn set_recover_delay(&self, delay: Duration) {
        *self.recover_delay.lock() = delay;
    }

    /// Every message received, with the address it was sent to
    pub fn messages(&self) -> Vec<(String, Message)> {
        self.received.lock().clone()
    }

    pub fn messages_of(&self, message_type: MessageType) -> Vec<(String, Message)> {
        self.received
            .lock()
            .iter()
            .filter(|(_, m)| m.message_type() == message_type)
            .cloned()
            .collect()
    }

    /// Control messages received, with the address they were sent to
    pub fn control_messages(&self) -> Vec<(String, ControlMessage)> {
        self.received
            .lock()
            .iter()
            .filter_map(|(address, m)| match m.payload() {
                MessagePayload::Control(control) => Some((address.clone(), control.clone())),
                _ => None,
            })
            .collect()
    }

    /// Calls currently executing
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn cancel_tasks_calls(&self) -> usize {
        self.cancel_tasks_calls.load(Ordering::SeqCst)
    }

    fn knows_pool(&self, address: &str) -> bool {
        address == self.main_address || self.sub_addresses.lock().iter().any(|a| a == address)
    }

    fn placement(&self, strategy: &AllocateStrategy, target: &str) -> Result<String> {
        let subs = self.sub_addresses.lock();
        let address = match strategy {
            AllocateStrategy::AddressSpecified { address } => address.clone(),
            AllocateStrategy::MainPool => self.main_address.clone(),
            AllocateStrategy::ProcessIndex { index } => subs
                .get(*index)
                .cloned()
                .ok_or_else(|| ActorError::remote("IndexError", format!("no sub pool {index}")))?,
            AllocateStrategy::RandomSubPool | AllocateStrategy::IdleLabel { .. } => subs
                .first()
                .cloned()
                .unwrap_or_else(|| target.to_string()),
        };
        drop(subs);
        if self.knows_pool(&address) {
            Ok(address)
        } else {
            Err(ActorError::transport(format!("No pool at {address}")))
        }
    }

    fn create(&self, address: &str, payload: &MessagePayload) -> Result<Value> {
        let MessagePayload::CreateActor {
            uid,
            allocate_strategy,
            ..
        } = payload
        else {
            return Err(ActorError::protocol("not a create message"));
        };
        let placed = self.placement(allocate_strategy, address)?;
        let uid = uid.clone().unwrap_or_else(|| {
            let n = self.next_uid.fetch_add(1, Ordering::SeqCst);
            format!("actor-{n}").into()
        });
        let actor_ref = ActorRef::new(placed, uid);
        if self.hosts(&actor_ref) {
            return Err(ActorError::actor_already_exist(
                actor_ref.address(),
                actor_ref.uid_str(),
            ));
        }
        self.add_actor(actor_ref.clone());
        Ok(actor_ref.to_value())
    }

    fn require_actor(&self, actor_ref: &ActorRef) -> Result<()> {
        if self.hosts(actor_ref) {
            Ok(())
        } else {
            Err(ActorError::actor_not_exist(actor_ref.address(), actor_ref.uid_str()))
        }
    }

    fn cancel(&self, cancel_message_id: MessageId) -> Result<Value> {
        if let Some(error) = self.cancel_failure.lock().take() {
            return Err(error);
        }

        let mut in_flight = self.in_flight.lock();
        match in_flight.get(&cancel_message_id) {
            Some(call) if call.cancellable => {
                if let Some(call) = in_flight.remove(&cancel_message_id) {
                    if let Some(abort) = call.abort {
                        abort.abort();
                    }
                    let _ = call.sender.send(ResponseMessage::error(
                        cancel_message_id,
                        self.main_address.as_str(),
                        ActorError::cancelled(format!("call {cancel_message_id} cancelled")),
                    ));
                }
                Ok(Value::Bool(true))
            }
            Some(_) => Ok(Value::Bool(false)),
            None => Err(ActorError::cannot_cancel(format!(
                "call {cancel_message_id} already finished"
            ))),
        }
    }

    fn stop(&self, address: &str, control: &ControlMessage) -> Result<Value> {
        if address != self.main_address {
            return Err(ActorError::remote(
                "ValueError",
                "stop must be sent to the main pool",
            ));
        }
        if control.address == self.main_address {
            return Err(ActorError::remote("ValueError", "cannot stop the main pool"));
        }
        self.sub_addresses.lock().retain(|a| *a != control.address);
        self.actors.lock().retain(|r| {
            let stopped = r.address() == control.address;
            if let (true, Some(local)) = (stopped, &self.local) {
                local.unregister(r);
            }
            !stopped
        });
        Ok(Value::Null)
    }

    fn config_value(&self, address: &str, field: Option<&str>) -> Value {
        let mut config = Map::new();
        config.insert("address".to_string(), json!(address));
        config.insert(MAIN_POOL_ADDRESS_FIELD.to_string(), json!(self.main_address));
        config.insert("sub_pools".to_string(), json!(self.sub_addresses()));
        match field {
            Some(field) => config.remove(field).unwrap_or(Value::Null),
            None => Value::Object(config),
        }
    }

    /// Run a call in the background, answering through the in-flight entry
    fn start_call(
        &self,
        message_id: MessageId,
        actor_ref: ActorRef,
        content: CallContent,
        sender: Option<ResponseSender>,
    ) {
        let Some(me) = self.me.upgrade() else {
            return;
        };
        let cancellable = content.method != "shielded_sleep";
        let address = actor_ref.address().to_string();

        let mut in_flight = self.in_flight.lock();
        let task = tokio::spawn({
            let me = Arc::clone(&me);
            async move {
                let result = me.clone().run_method(actor_ref, content).await;
                let call = me.in_flight.lock().remove(&message_id);
                if let Some(call) = call {
                    let response = match result {
                        Ok(value) => ResponseMessage::ok(message_id, value),
                        Err(e) => ResponseMessage::error(message_id, address, e),
                    };
                    let _ = call.sender.send(response);
                }
            }
        });
        match sender {
            Some(sender) => {
                in_flight.insert(
                    message_id,
                    InFlight {
                        sender,
                        abort: Some(task.abort_handle()),
                        cancellable,
                    },
                );
            }
            None => drop(task),
        }
    }

    async fn run_method(self: Arc<Self>, actor_ref: ActorRef, content: CallContent) -> Result<Value> {
        let chain_ref = actor_ref.clone();
        with_call_chain(chain_ref, async move {
            let arg = |i: usize| content.args.get(i).cloned().unwrap_or(Value::Null);
            match content.method.as_str() {
                "echo" => Ok(arg(0)),
                "sleep" | "shielded_sleep" => {
                    let secs = arg(0).as_f64().unwrap_or(0.0);
                    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
                    Ok(arg(1))
                }
                "fail" => Err(ActorError::remote(
                    arg(0).as_str().unwrap_or("RuntimeError"),
                    arg(1).as_str().unwrap_or_default(),
                )),
                "call" => {
                    let target = ActorRef::from_value(arg(0))?;
                    let method = arg(1).as_str().unwrap_or("echo").to_string();
                    let caller: Arc<dyn ActorCaller> = self.clone();
                    let context = ActorContext::new(caller)
                        .with_local_registry(LocalActorRegistry::new());
                    context.call(&target, CallContent::new(method)).await
                }
                other => Err(ActorError::remote(
                    "AttributeError",
                    format!("{} has no method {}", actor_ref, other),
                )),
            }
        })
        .await
    }
}

#[async_trait]
impl ActorCaller for TestPool {
    async fn call(&self, address: &str, message: Message) -> Result<PendingResponse> {
        debug!(address, message_type = ?message.message_type(), "Test pool received message");
        self.received
            .lock()
            .push((address.to_string(), message.clone()));

        if !self.knows_pool(address) {
            return Err(ActorError::transport(format!("No pool at {address}")));
        }

        let message_id = message.message_id();
        let reply = |result: Result<Value>| {
            PendingResponse::ready(match result {
                Ok(value) => ResponseMessage::ok(message_id, value),
                Err(e) => ResponseMessage::error(message_id, address, e),
            })
        };

        match message.payload() {
            MessagePayload::CreateActor { .. } => Ok(reply(self.create(address, message.payload()))),
            MessagePayload::HasActor { actor_ref } => Ok(reply(Ok(Value::Bool(self.hosts(actor_ref))))),
            MessagePayload::DestroyActor { actor_ref } => {
                let removed = self.actors.lock().remove(actor_ref);
                if removed {
                    if let Some(local) = &self.local {
                        local.unregister(actor_ref);
                    }
                    Ok(reply(Ok(Value::Null)))
                } else {
                    Ok(reply(Err(ActorError::actor_not_exist(
                        actor_ref.address(),
                        actor_ref.uid_str(),
                    ))))
                }
            }
            MessagePayload::ActorRef { actor_ref } => {
                let real = self
                    .aliases
                    .lock()
                    .get(actor_ref)
                    .cloned()
                    .unwrap_or_else(|| actor_ref.clone());
                Ok(reply(self.require_actor(&real).map(|_| real.to_value())))
            }
            MessagePayload::Send {
                actor_ref, content, ..
            } => {
                if let Err(e) = self.require_actor(actor_ref) {
                    return Ok(reply(Err(e)));
                }
                let (sender, pending) = PendingResponse::channel();
                self.start_call(message_id, actor_ref.clone(), content.clone(), Some(sender));
                Ok(pending)
            }
            MessagePayload::Tell { actor_ref, content } => {
                if let Err(e) = self.require_actor(actor_ref) {
                    return Ok(reply(Err(e)));
                }
                self.start_call(message_id, actor_ref.clone(), content.clone(), None);
                Ok(reply(Ok(Value::Null)))
            }
            MessagePayload::Cancel {
                cancel_message_id, ..
            } => Ok(reply(self.cancel(*cancel_message_id))),
            MessagePayload::Control(control) => match control.control_type {
                ControlMessageType::GetConfig => Ok(reply(Ok(
                    self.config_value(&control.address, control.config_field()),
                ))),
                ControlMessageType::Stop => Ok(reply(self.stop(address, control))),
                ControlMessageType::WaitPoolRecovered => {
                    let delay = *self.recover_delay.lock();
                    let (sender, pending) = PendingResponse::channel();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = sender.send(ResponseMessage::ok(message_id, Value::Null));
                    });
                    Ok(pending)
                }
            },
        }
    }

    fn external_address(&self) -> Option<String> {
        Some(self.main_address.clone())
    }

    fn cancel_tasks(&self) {
        self.cancel_tasks_calls.fetch_add(1, Ordering::SeqCst);
    }
}
