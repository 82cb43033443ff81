//! Cancellation-Safe Wait
//!
//! Every awaited response goes through [`wait_response`]. Cancelling the
//! caller never silently abandons the remote call: the wait first asks the
//! remote pool to cancel it, then returns whatever the original call
//! resolves to.
//!
//! ```text
//! Pending ──response──▶ Completed
//!    │
//!    └──cancelled──▶ CancelRequested ──cancel accepted──▶ CancelConfirmed
//!                          │        └──result arrived───▶ TooLateCompleted
//!                          └──CannotCancelTask──▶ caller sees Cancelled
//! ```
//!
//! A caller-side token drives the transition out of `Pending`. Dropping the
//! wait future while the call is pending spawns the same cancel request on
//! the current runtime.

use crate::caller::{ActorCaller, PendingResponse};
use protocol::{ActorError, Message, MessageId, ResponseMessage, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Progress of one awaited call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitState {
    Pending,
    /// Response arrived before any cancellation
    Completed,
    /// Caller cancelled, remote cancel in progress
    CancelRequested,
    /// Remote side confirmed the call was cancelled
    CancelConfirmed,
    /// Remote call produced its result despite the cancellation
    TooLateCompleted,
}

impl WaitState {
    fn after_cancel(response: &Result<ResponseMessage>) -> Self {
        match response {
            Ok(ResponseMessage::Error(e)) if e.error.is_cancelled() => Self::CancelConfirmed,
            Err(e) if e.is_cancelled() => Self::CancelConfirmed,
            _ => Self::TooLateCompleted,
        }
    }
}

/// Await `pending` for the message `message_id` sent to `address`
///
/// Without a token this is a plain await. With one, cancellation of the
/// token sends a Cancel message for `message_id` and then awaits the
/// original response. A `CannotCancelTask` reply to the cancel surfaces as
/// [`ActorError::Cancelled`]; any other cancel failure is logged and
/// ignored.
pub async fn wait_response(
    caller: &Arc<dyn ActorCaller>,
    address: &str,
    message_id: MessageId,
    pending: PendingResponse,
    token: Option<&CancellationToken>,
) -> Result<ResponseMessage> {
    let (response, state) = wait_with_state(caller, address, message_id, pending, token).await;
    trace!(address, message_id = %message_id, state = ?state, "Wait finished");
    response
}

/// [`wait_response`] plus the state the wait ended in
pub async fn wait_with_state(
    caller: &Arc<dyn ActorCaller>,
    address: &str,
    message_id: MessageId,
    mut pending: PendingResponse,
    token: Option<&CancellationToken>,
) -> (Result<ResponseMessage>, WaitState) {
    let mut guard = CancelOnDrop::new(caller, address, message_id);

    let Some(token) = token else {
        let response = (&mut pending).await;
        guard.disarm();
        return (response, WaitState::Completed);
    };

    tokio::select! {
        biased;
        response = &mut pending => {
            guard.disarm();
            return (response, WaitState::Completed);
        }
        _ = token.cancelled() => {
            debug!(address, message_id = %message_id, "Cancelling actor call");
        }
    }

    // CancelRequested
    match send_cancel(caller.as_ref(), address, message_id).await {
        Ok(_) => {}
        Err(e) if e.is_cannot_cancel() => {
            guard.disarm();
            debug!(address, message_id = %message_id, "Call already finished, cancellation honoured");
            return (
                Err(ActorError::cancelled(format!(
                    "call {} to {} cancelled by caller",
                    message_id, address
                ))),
                WaitState::CancelConfirmed,
            );
        }
        Err(e) => {
            warn!(address, message_id = %message_id, error = %e, "Cancel request failed, waiting for the original call");
        }
    }

    let response = (&mut pending).await;
    guard.disarm();
    let state = WaitState::after_cancel(&response);
    (response, state)
}

/// Send a Cancel message for `message_id` and wait for its reply
///
/// Awaited plainly: a cancel request is never itself cancelled.
pub async fn send_cancel(
    caller: &dyn ActorCaller,
    address: &str,
    message_id: MessageId,
) -> Result<serde_json::Value> {
    let message = Message::cancel(address, message_id);
    caller.call(address, message).await?.await?.into_result()
}

/// Issues the cancel request when a pending wait is dropped
struct CancelOnDrop {
    target: Option<(Arc<dyn ActorCaller>, String, MessageId)>,
}

impl CancelOnDrop {
    fn new(caller: &Arc<dyn ActorCaller>, address: &str, message_id: MessageId) -> Self {
        Self {
            target: Some((Arc::clone(caller), address.to_string(), message_id)),
        }
    }

    fn disarm(&mut self) {
        self.target = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let Some((caller, address, message_id)) = self.target.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(address = %address, message_id = %message_id, "Wait dropped outside a runtime, remote call left running");
            return;
        };
        debug!(address = %address, message_id = %message_id, "Wait dropped, cancelling remote call");
        handle.spawn(async move {
            if let Err(e) = send_cancel(caller.as_ref(), &address, message_id).await {
                debug!(address = %address, message_id = %message_id, error = %e, "Cancel after drop failed");
            }
        });
    }
}
