//! Pool Control Operations
//!
//! Control-plane calls layered on the context's call path. `kill_actor` and
//! `wait_actor_pool_recovered` each perform two sequential calls (read the
//! main pool address, then act); the main pool address is not re-checked
//! between them.

use crate::context::ActorContext;
use protocol::{
    ActorError, ActorRef, ControlMessage, Message, Result, DEFAULT_STOP_TIMEOUT_SECS,
    MAIN_POOL_ADDRESS_FIELD,
};
use serde_json::Value;
use tracing::{debug, info};

impl ActorContext {
    /// Full configuration of the pool at `address`
    pub async fn get_pool_config(&self, address: &str) -> Result<Value> {
        let message = Message::control(ControlMessage::get_config(address, None));
        self.call_and_wait(address, message).await
    }

    /// Address of the main pool supervising the pool at `address`
    pub async fn get_main_pool_address(&self, address: &str) -> Result<String> {
        let message = Message::control(ControlMessage::get_config(
            address,
            Some(MAIN_POOL_ADDRESS_FIELD),
        ));
        match self.call_and_wait(address, message).await? {
            Value::String(main_address) => Ok(main_address),
            other => Err(ActorError::protocol(format!(
                "Expected {} to be a string, got {}",
                MAIN_POOL_ADDRESS_FIELD, other
            ))),
        }
    }

    /// Stop the sub pool hosting `actor_ref`
    ///
    /// The stop request is sent to the main pool. Fails without stopping
    /// anything when the actor lives on the main pool itself.
    pub async fn kill_actor(&self, actor_ref: &ActorRef, force: bool) -> Result<Value> {
        let main_address = self.get_main_pool_address(actor_ref.address()).await?;
        let real_ref = self.actor_ref(actor_ref).await?;

        if real_ref.address() == main_address {
            return Err(ActorError::main_pool_kill(main_address, real_ref.uid_str()));
        }

        info!(
            actor = %real_ref,
            main_pool = %main_address,
            force,
            "Stopping sub pool hosting actor"
        );
        let message = Message::control(ControlMessage::stop(
            real_ref.address(),
            DEFAULT_STOP_TIMEOUT_SECS,
            force,
        ));
        self.call_and_wait(&main_address, message).await
    }

    /// Block until the sub pool at `address` has been recovered
    ///
    /// The main pool is never recovered: when `address` is the main pool the
    /// call returns immediately without any control message.
    pub async fn wait_actor_pool_recovered(
        &self,
        address: &str,
        main_address: Option<&str>,
    ) -> Result<()> {
        let main_address = match main_address {
            Some(main_address) => main_address.to_string(),
            None => self.get_main_pool_address(address).await?,
        };

        if address == main_address {
            debug!(address, "Main pool is never recovered, nothing to wait for");
            return Ok(());
        }

        let message = Message::control(ControlMessage::wait_pool_recovered(address));
        self.call_and_wait(&main_address, message).await?;
        Ok(())
    }
}
