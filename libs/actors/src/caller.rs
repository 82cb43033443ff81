//! Transport Caller Seam
//!
//! The address router and transport live outside this crate. An
//! [`ActorCaller`] resolves an address to a connection, writes the message
//! and hands back a [`PendingResponse`] that resolves when the response
//! carrying the same message id arrives.

use async_trait::async_trait;
use futures::future::FusedFuture;
use protocol::{ActorError, Message, ResponseMessage, Result};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Completes a [`PendingResponse`]
pub type ResponseSender = oneshot::Sender<ResponseMessage>;

/// Dispatches messages to actor pools
#[async_trait]
pub trait ActorCaller: Send + Sync {
    /// Send `message` to the pool at `address`
    ///
    /// Returns once the message is handed to the transport; the response is
    /// delivered through the returned handle.
    async fn call(&self, address: &str, message: Message) -> Result<PendingResponse>;

    /// Address other pools use to reach this process
    fn external_address(&self) -> Option<String> {
        None
    }

    /// Abandon every in-flight call owned by this caller
    fn cancel_tasks(&self) {}
}

/// Response of one dispatched message
///
/// Awaiting yields the [`ResponseMessage`] for the dispatched message id, or
/// a transport error when the sender side was dropped.
#[derive(Debug)]
pub struct PendingResponse {
    receiver: Option<oneshot::Receiver<ResponseMessage>>,
}

impl PendingResponse {
    /// Handle plus the sender that completes it
    pub fn channel() -> (ResponseSender, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { receiver: Some(rx) })
    }

    /// Handle that is already complete
    pub fn ready(response: ResponseMessage) -> Self {
        let (tx, pending) = Self::channel();
        // receiver is alive, send cannot fail
        let _ = tx.send(response);
        pending
    }

    /// Whether the response has been consumed
    pub fn is_terminated(&self) -> bool {
        self.receiver.is_none()
    }

    /// Take the response if it has already arrived
    pub fn try_take(&mut self) -> Option<Result<ResponseMessage>> {
        let receiver = self.receiver.as_mut()?;
        match receiver.try_recv() {
            Ok(response) => {
                self.receiver = None;
                Some(Ok(response))
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.receiver = None;
                Some(Err(connection_closed()))
            }
        }
    }
}

impl Future for PendingResponse {
    type Output = Result<ResponseMessage>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Poll::Ready(Err(ActorError::protocol(
                "Pending response polled after completion",
            )));
        };
        match Pin::new(receiver).poll(cx) {
            Poll::Ready(result) => {
                self.receiver = None;
                Poll::Ready(result.map_err(|_| connection_closed()))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedFuture for PendingResponse {
    fn is_terminated(&self) -> bool {
        self.receiver.is_none()
    }
}

fn connection_closed() -> ActorError {
    ActorError::transport("Response channel closed before a response arrived")
}
