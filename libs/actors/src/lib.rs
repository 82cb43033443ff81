//! Actor Call Context
//!
//! Client side of the actor runtime: builds protocol messages, dispatches
//! them through a transport [`ActorCaller`] and waits for the responses.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐     ┌──────────────────────┐
//! │     ActorContext     │     │     ActorCaller      │
//! │                      │     │  (router/transport)  │
//! │  create/has/destroy  │     │                      │
//! │  send/call/tell ─────┼─────┼─▶ call(addr, msg)    │
//! │  kill/recover/config │     │    → PendingResponse │
//! └──────────┬───────────┘     └──────────────────────┘
//!            │
//!            ▼
//!   cancellation-safe wait ──cancel──▶ Cancel{message_id}
//! ```
//!
//! Every awaited response goes through [`wait_response`]: cancelling the
//! caller sends a Cancel for the in-flight message and still returns the
//! original call's outcome.
//!
//! # Example
//!
//! ```rust,no_run
//! use actor_context::test_utils::TestPool;
//! use actor_context::CreateActorOptions;
//! use protocol::CallContent;
//! use serde_json::{json, Map};
//!
//! # async fn demo() -> protocol::Result<()> {
//! let pool = TestPool::new("127.0.0.1:12345", &["127.0.0.1:12346"]);
//! let ctx = pool.context();
//!
//! let actor = ctx
//!     .create_actor("Echo", vec![], Map::new(), CreateActorOptions::default())
//!     .await?;
//! let value = ctx.call(&actor, CallContent::new("echo").arg(json!("hi"))).await?;
//! assert_eq!(value, json!("hi"));
//! # Ok(())
//! # }
//! ```

pub mod caller;
pub mod config;
pub mod context;
pub mod control;
pub mod debug;
pub mod local;
pub mod test_utils;
pub mod wait;

pub use caller::{ActorCaller, PendingResponse, ResponseSender};
pub use config::{ContextConfig, DEFAULT_CALL_TIMEOUT_THRESHOLD, DEFAULT_MAX_REPR_LEN};
pub use context::{ActorContext, CreateActorOptions, SendOutcome};
pub use debug::{current_call_chain, detect_cycle_send, truncate_repr, with_call_chain};
pub use local::LocalActorRegistry;
pub use wait::{send_cancel, wait_response, wait_with_state, WaitState};
