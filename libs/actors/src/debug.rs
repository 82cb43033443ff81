//! Call Diagnostics
//!
//! Advisory slow-call logging and detection of waiting sends that would
//! deadlock the current call chain.

use protocol::{ActorError, ActorRef, Message, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

tokio::task_local! {
    static CALL_CHAIN: Vec<ActorRef>;
}

/// Run `fut` as a call handled by `actor_ref`
///
/// Pools wrap message handling with this so that sends issued while
/// handling can be checked against the actors already waiting upstream.
pub async fn with_call_chain<F: Future>(actor_ref: ActorRef, fut: F) -> F::Output {
    let mut chain = current_call_chain();
    chain.push(actor_ref);
    CALL_CHAIN.scope(chain, fut).await
}

/// Actors handling the current task's call chain, outermost first
pub fn current_call_chain() -> Vec<ActorRef> {
    CALL_CHAIN.try_with(|chain| chain.clone()).unwrap_or_default()
}

/// Fail a waiting send whose target already waits on this call chain
pub fn detect_cycle_send(message: &Message, wait_response: bool) -> Result<()> {
    if !wait_response {
        return Ok(());
    }
    let Some(target) = message.actor_ref() else {
        return Ok(());
    };

    let cycle = CALL_CHAIN
        .try_with(|chain| chain.iter().any(|r| r == target))
        .unwrap_or(false);
    if cycle {
        let chain = current_call_chain()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(ActorError::cycle_send(format!(
            "{} -> {} would wait on itself",
            chain, target
        )));
    }
    Ok(())
}

/// Cut `repr` to at most `max_len` characters
pub fn truncate_repr(repr: &str, max_len: usize) -> String {
    match repr.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...", &repr[..idx]),
        None => repr.to_string(),
    }
}

/// Await `fut`, logging once if it runs past `threshold`
pub(crate) async fn log_on_timeout<F, D>(threshold: Option<Duration>, describe: D, fut: F) -> F::Output
where
    F: Future,
    D: FnOnce() -> String,
{
    let Some(threshold) = threshold else {
        return fut.await;
    };

    tokio::pin!(fut);
    tokio::select! {
        output = &mut fut => return output,
        _ = tokio::time::sleep(threshold) => {
            warn!(threshold = ?threshold, "{}", describe());
        }
    }
    fut.await
}
