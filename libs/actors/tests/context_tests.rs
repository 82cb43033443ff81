//! Integration Tests for the Actor Context
//!
//! Every operation runs end to end against the in-process `TestPool`:
//! actor lifecycle, address resolution, the cancellation race, pool control
//! and the profiling hook.

use actor_context::test_utils::TestPool;
use actor_context::{
    wait_with_state, ActorCaller, ActorContext, ContextConfig, CreateActorOptions,
    LocalActorRegistry, PendingResponse, SendOutcome, WaitState,
};
use async_trait::async_trait;
use profiling::{EnvSettings, ProfilingData};
use protocol::{
    ActorError, ActorRef, AllocateStrategy, CallContent, ControlMessageType, Message,
    MessagePayload, MessageType,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MAIN: &str = "127.0.0.1:12345";
const SUB: &str = "127.0.0.1:12346";

fn pool() -> Arc<TestPool> {
    TestPool::new(MAIN, &[SUB])
}

async fn create_on(ctx: &ActorContext, address: &str, uid: &'static str) -> ActorRef {
    ctx.create_actor(
        "Worker",
        vec![],
        Map::new(),
        CreateActorOptions::default()
            .with_address(address)
            .with_uid(uid),
    )
    .await
    .unwrap()
}

fn sleep_call(secs: f64, result: &str) -> CallContent {
    CallContent::new("sleep").arg(json!(secs)).arg(json!(result))
}

/// Caller with no route anywhere and no external address
struct Unroutable;

#[async_trait]
impl ActorCaller for Unroutable {
    async fn call(&self, address: &str, _message: Message) -> protocol::Result<PendingResponse> {
        Err(ActorError::transport(format!("no route to {address}")))
    }
}

// =========================================================================
// Actor lifecycle
// =========================================================================

#[tokio::test]
async fn test_create_has_destroy() {
    let pool = pool();
    let ctx = pool.context();

    let actor = create_on(&ctx, SUB, "worker").await;
    assert_eq!(actor, ActorRef::new(SUB, "worker"));
    assert!(ctx.has_actor(&actor).await.unwrap());

    assert_eq!(ctx.destroy_actor(&actor).await.unwrap(), Value::Null);
    assert!(!ctx.has_actor(&actor).await.unwrap());
    assert!(matches!(
        ctx.destroy_actor(&actor).await,
        Err(ActorError::ActorNotExist { .. })
    ));
}

#[tokio::test]
async fn test_create_duplicate_uid_fails() {
    let pool = pool();
    let ctx = pool.context();

    create_on(&ctx, SUB, "worker").await;
    let err = ctx
        .create_actor(
            "Worker",
            vec![],
            Map::new(),
            CreateActorOptions::default()
                .with_address(SUB)
                .with_uid("worker"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::ActorAlreadyExist { .. }));
}

#[tokio::test]
async fn test_create_address_resolution() {
    let pool = pool();

    // no explicit or context address: caller's external address
    let ctx = pool.context();
    let on_main = ctx
        .create_actor("Worker", vec![], Map::new(), CreateActorOptions::default())
        .await
        .unwrap();
    assert_eq!(on_main.address(), MAIN);

    // context address
    let sub_ctx = pool.context().with_address(SUB);
    let on_sub = sub_ctx
        .create_actor("Worker", vec![], Map::new(), CreateActorOptions::default())
        .await
        .unwrap();
    assert_eq!(on_sub.address(), SUB);

    // explicit address wins over the context address
    let explicit = sub_ctx
        .create_actor(
            "Worker",
            vec![],
            Map::new(),
            CreateActorOptions::default().with_address(MAIN),
        )
        .await
        .unwrap();
    assert_eq!(explicit.address(), MAIN);

    // a strategy overrides the default pin
    let placed = sub_ctx
        .create_actor(
            "Worker",
            vec![],
            Map::new(),
            CreateActorOptions::default().with_allocate_strategy(AllocateStrategy::MainPool),
        )
        .await
        .unwrap();
    assert_eq!(placed.address(), MAIN);

    let creates = pool.messages_of(MessageType::CreateActor);
    let targets: Vec<&str> = creates.iter().map(|(a, _)| a.as_str()).collect();
    assert_eq!(targets, vec![MAIN, SUB, MAIN, SUB]);
}

#[tokio::test]
async fn test_create_without_address_is_configuration_error() {
    let ctx = ActorContext::new(Arc::new(Unroutable));
    let err = ctx
        .create_actor("Worker", vec![], Map::new(), CreateActorOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::Configuration { .. }));
}

#[tokio::test]
async fn test_unknown_pool_is_transport_error() {
    let pool = pool();
    let ctx = pool.context();
    let ghost = ActorRef::new("127.0.0.1:9", "ghost");
    assert!(matches!(
        ctx.has_actor(&ghost).await,
        Err(ActorError::Transport { .. })
    ));
}

// =========================================================================
// Reference resolution
// =========================================================================

#[tokio::test]
async fn test_actor_ref_resolves_locally_without_a_call() {
    let local = LocalActorRegistry::new();
    let pool = TestPool::with_local_registry(MAIN, &[SUB], local.clone());
    let caller: Arc<dyn ActorCaller> = pool.clone();
    let ctx = ActorContext::new(caller).with_local_registry(local.clone());

    let actor = create_on(&ctx, SUB, "local").await;
    assert!(local.contains(&actor));

    let resolved = ctx.actor_ref(&ActorRef::new(SUB, "local")).await.unwrap();
    assert_eq!(resolved, actor);
    assert!(pool.messages_of(MessageType::ActorRef).is_empty());
}

#[tokio::test]
async fn test_actor_ref_lookup_for_remote_actor() {
    let pool = pool();
    let ctx = pool.context();
    let actor = create_on(&ctx, SUB, "remote").await;

    assert_eq!(ctx.actor_ref(&actor).await.unwrap(), actor);
    assert_eq!(pool.messages_of(MessageType::ActorRef).len(), 1);

    let missing = ActorRef::new(SUB, "missing");
    assert!(matches!(
        ctx.actor_ref(&missing).await,
        Err(ActorError::ActorNotExist { .. })
    ));
}

// =========================================================================
// Calls
// =========================================================================

#[tokio::test]
async fn test_call_returns_value() {
    let pool = pool();
    let ctx = pool.context();
    let actor = create_on(&ctx, SUB, "echo").await;

    let value = ctx
        .call(&actor, CallContent::new("echo").arg(json!({"n": 1})))
        .await
        .unwrap();
    assert_eq!(value, json!({"n": 1}));
}

#[tokio::test]
async fn test_remote_error_keeps_its_kind() {
    let pool = pool();
    let ctx = pool.context();
    let actor = create_on(&ctx, SUB, "fails").await;

    let err = ctx
        .call(
            &actor,
            CallContent::new("fail").arg(json!("ValueError")).arg(json!("bad input")),
        )
        .await
        .unwrap_err();
    assert_eq!(err, ActorError::remote("ValueError", "bad input"));
}

#[tokio::test]
async fn test_send_without_waiting_returns_pending_handle() {
    let pool = pool();
    let ctx = pool.context();
    let actor = create_on(&ctx, SUB, "echo").await;

    let outcome = ctx
        .send(&actor, CallContent::new("echo").arg(json!("later")), false, None)
        .await
        .unwrap();
    assert!(matches!(outcome, SendOutcome::Pending(_)));
    assert_eq!(outcome.resolve().await.unwrap(), json!("later"));

    let waited = ctx
        .send(&actor, CallContent::new("echo").arg(json!("now")), true, None)
        .await
        .unwrap();
    assert_eq!(waited.into_response(), Some(json!("now")));
}

#[tokio::test]
async fn test_tell_waits_for_ack_only() {
    let pool = pool();
    let ctx = pool.context();
    let actor = create_on(&ctx, SUB, "sink").await;

    ctx.tell(&actor, sleep_call(30.0, "ignored")).await.unwrap();
    assert_eq!(pool.messages_of(MessageType::Tell).len(), 1);

    let missing = ActorRef::new(SUB, "missing");
    assert!(matches!(
        ctx.tell(&missing, CallContent::new("echo")).await,
        Err(ActorError::ActorNotExist { .. })
    ));
}

#[tokio::test]
async fn test_cycle_send_is_rejected() {
    let pool = pool();
    let ctx = pool.context();
    let a = create_on(&ctx, SUB, "a").await;
    let b = create_on(&ctx, SUB, "b").await;

    // a -> b is fine
    let value = ctx
        .call(&a, CallContent::new("call").arg(b.to_value()).arg(json!("echo")))
        .await
        .unwrap();
    assert_eq!(value, Value::Null);

    // a -> a would wait on itself
    let err = ctx
        .call(&a, CallContent::new("call").arg(a.to_value()).arg(json!("echo")))
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::CycleSend { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_slow_call_is_logged_not_aborted() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let pool = pool();
    let ctx = pool.context().with_config(
        ContextConfig::default()
            .with_call_timeout_threshold(Some(Duration::from_secs(1)))
            .with_max_repr_len(8),
    );
    let actor = create_on(&ctx, SUB, "slow").await;

    let value = ctx.call(&actor, sleep_call(5.0, "finished")).await.unwrap();
    assert_eq!(value, json!("finished"));
}

// =========================================================================
// Cancellation race
// =========================================================================

#[tokio::test]
async fn test_result_first_sends_no_cancel() {
    let pool = pool();
    let ctx = pool.context();
    let actor = create_on(&ctx, SUB, "echo").await;
    let token = CancellationToken::new();

    let value = ctx
        .with_cancellation(token.clone())
        .call(&actor, CallContent::new("echo").arg(json!(1)))
        .await
        .unwrap();
    token.cancel();

    assert_eq!(value, json!(1));
    assert!(pool.messages_of(MessageType::Cancel).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_confirmed_surfaces_cancelled() {
    let pool = pool();
    let ctx = pool.context();
    let actor = create_on(&ctx, SUB, "sleeper").await;
    let token = CancellationToken::new();

    let call = {
        let ctx = ctx.with_cancellation(token.clone());
        let actor = actor.clone();
        tokio::spawn(async move { ctx.call(&actor, sleep_call(10.0, "late")).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(pool.in_flight_count(), 1);
    token.cancel();

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, ActorError::Cancelled { .. }));
    assert_eq!(pool.in_flight_count(), 0);

    let sends = pool.messages_of(MessageType::Send);
    let cancels = pool.messages_of(MessageType::Cancel);
    assert_eq!(cancels.len(), 1);
    match cancels[0].1.payload() {
        MessagePayload::Cancel {
            address,
            cancel_message_id,
        } => {
            assert_eq!(address, SUB);
            assert_eq!(*cancel_message_id, sends[0].1.message_id());
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_wait_states_through_pool() {
    let pool = pool();
    let ctx = pool.context();
    let actor = create_on(&ctx, SUB, "sleeper").await;
    let caller: Arc<dyn ActorCaller> = pool.clone();

    for (method, expected_state) in [
        ("sleep", WaitState::CancelConfirmed),
        ("shielded_sleep", WaitState::TooLateCompleted),
    ] {
        let message = Message::send(
            actor.clone(),
            CallContent::new(method).arg(json!(10.0)).arg(json!("done")),
            None,
        );
        let message_id = message.message_id();
        let pending = caller.call(SUB, message).await.unwrap();
        let token = CancellationToken::new();

        let wait = {
            let caller = Arc::clone(&caller);
            let token = token.clone();
            tokio::spawn(async move {
                wait_with_state(&caller, SUB, message_id, pending, Some(&token)).await
            })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();

        let (response, state) = wait.await.unwrap();
        assert_eq!(state, expected_state, "{method}");
        let result = response.unwrap().into_result();
        match expected_state {
            WaitState::TooLateCompleted => assert_eq!(result, Ok(json!("done"))),
            _ => assert!(matches!(result, Err(ActorError::Cancelled { .. }))),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_cannot_cancel_reply_surfaces_cancelled() {
    let pool = pool();
    let ctx = pool.context();
    let actor = create_on(&ctx, SUB, "sleeper").await;
    pool.fail_next_cancel(ActorError::cannot_cancel("already finished"));
    let token = CancellationToken::new();

    let call = {
        let ctx = ctx.with_cancellation(token.clone());
        let actor = actor.clone();
        tokio::spawn(async move { ctx.call(&actor, sleep_call(10.0, "late")).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    token.cancel();

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, ActorError::Cancelled { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_failed_cancel_returns_original_result() {
    let pool = pool();
    let ctx = pool.context();
    let actor = create_on(&ctx, SUB, "sleeper").await;
    pool.fail_next_cancel(ActorError::transport("connection reset"));
    let token = CancellationToken::new();

    let call = {
        let ctx = ctx.with_cancellation(token.clone());
        let actor = actor.clone();
        tokio::spawn(async move { ctx.call(&actor, sleep_call(10.0, "late")).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    token.cancel();

    assert_eq!(call.await.unwrap().unwrap(), json!("late"));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_wait_cancels_remote_call() {
    let pool = pool();
    let ctx = pool.context();
    let actor = create_on(&ctx, SUB, "sleeper").await;

    let timed_out =
        tokio::time::timeout(Duration::from_secs(1), ctx.call(&actor, sleep_call(10.0, "x")))
            .await;
    assert!(timed_out.is_err());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(pool.messages_of(MessageType::Cancel).len(), 1);
    assert_eq!(pool.in_flight_count(), 0);
}

#[tokio::test]
async fn test_cancel_finished_call_is_cannot_cancel() {
    let pool = pool();
    let ctx = pool.context();
    let actor = create_on(&ctx, SUB, "echo").await;

    ctx.call(&actor, CallContent::new("echo")).await.unwrap();
    let sent = pool.messages_of(MessageType::Send);
    let err = ctx.cancel(SUB, sent[0].1.message_id()).await.unwrap_err();
    assert!(err.is_cannot_cancel());
}

// =========================================================================
// Pool control
// =========================================================================

#[tokio::test]
async fn test_pool_config() {
    let pool = pool();
    let ctx = pool.context();

    let config = ctx.get_pool_config(SUB).await.unwrap();
    assert_eq!(config["address"], json!(SUB));
    assert_eq!(config["main_pool_address"], json!(MAIN));
    assert_eq!(ctx.get_main_pool_address(SUB).await.unwrap(), MAIN);
}

#[tokio::test]
async fn test_kill_actor_on_main_pool_is_refused() {
    let pool = pool();
    let ctx = pool.context();
    let actor = create_on(&ctx, MAIN, "pinned").await;

    for force in [true, false] {
        let err = ctx.kill_actor(&actor, force).await.unwrap_err();
        assert!(matches!(err, ActorError::MainPoolKill { .. }));
    }

    assert!(pool.hosts(&actor));
    assert!(pool
        .control_messages()
        .iter()
        .all(|(_, control)| control.control_type == ControlMessageType::GetConfig));
}

#[tokio::test]
async fn test_kill_actor_stops_sub_pool_via_main() {
    for force in [true, false] {
        let pool = pool();
        let ctx = pool.context();
        let actor = create_on(&ctx, SUB, "doomed").await;

        ctx.kill_actor(&actor, force).await.unwrap();

        let stops: Vec<_> = pool
            .control_messages()
            .into_iter()
            .filter(|(_, control)| control.control_type == ControlMessageType::Stop)
            .collect();
        assert_eq!(stops.len(), 1);
        let (sent_to, stop) = &stops[0];
        assert_eq!(sent_to, MAIN);
        assert_eq!(stop.address, SUB);
        assert_eq!(stop.stop_args(), Some((3.0, force)));

        assert!(!pool.hosts(&actor));
        assert!(pool.sub_addresses().is_empty());
    }
}

#[tokio::test]
async fn test_kill_actor_resolved_to_main_pool_is_refused() {
    let pool = pool();
    let ctx = pool.context();
    let real = create_on(&ctx, MAIN, "relocated").await;
    let requested = ActorRef::new(SUB, "relocated");
    pool.add_alias(requested.clone(), real.clone());

    assert_eq!(ctx.actor_ref(&requested).await.unwrap(), real);
    let err = ctx.kill_actor(&requested, true).await.unwrap_err();
    assert!(matches!(err, ActorError::MainPoolKill { .. }));

    assert!(pool.hosts(&real));
    assert_eq!(pool.sub_addresses(), vec![SUB.to_string()]);
    assert!(pool
        .control_messages()
        .iter()
        .all(|(_, control)| control.control_type == ControlMessageType::GetConfig));
}

#[tokio::test]
async fn test_kill_actor_stops_resolved_sub_pool() {
    let pool = pool();
    let ctx = pool.context();
    let real = create_on(&ctx, SUB, "relocated").await;
    let requested = ActorRef::new(MAIN, "relocated");
    pool.add_alias(requested.clone(), real.clone());

    ctx.kill_actor(&requested, false).await.unwrap();

    let stops: Vec<_> = pool
        .control_messages()
        .into_iter()
        .filter(|(_, control)| control.control_type == ControlMessageType::Stop)
        .collect();
    assert_eq!(stops.len(), 1);
    let (sent_to, stop) = &stops[0];
    assert_eq!(sent_to, MAIN);
    assert_eq!(stop.address, SUB);
    assert!(!pool.hosts(&real));
}

#[tokio::test]
async fn test_wait_main_pool_recovered_is_immediate() {
    let pool = pool();
    let ctx = pool.context();

    ctx.wait_actor_pool_recovered(MAIN, Some(MAIN)).await.unwrap();
    assert!(pool.messages().is_empty());

    // main address fetched first, then nothing else
    ctx.wait_actor_pool_recovered(MAIN, None).await.unwrap();
    let controls = pool.control_messages();
    assert_eq!(controls.len(), 1);
    assert_eq!(controls[0].1.control_type, ControlMessageType::GetConfig);
}

#[tokio::test(start_paused = true)]
async fn test_wait_sub_pool_recovered() {
    let pool = pool();
    pool.set_recover_delay(Duration::from_secs(5));
    let ctx = pool.context();

    let started = tokio::time::Instant::now();
    ctx.wait_actor_pool_recovered(SUB, None).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(5));

    let waits: Vec<_> = pool
        .control_messages()
        .into_iter()
        .filter(|(_, c)| c.control_type == ControlMessageType::WaitPoolRecovered)
        .collect();
    assert_eq!(waits.len(), 1);
    assert_eq!(waits[0].0, MAIN);
    assert_eq!(waits[0].1.address, SUB);
}

// =========================================================================
// Profiling and teardown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_calls_reported_to_profiling() {
    let pool = pool();
    let registry = ProfilingData::with_env(EnvSettings::default());
    registry
        .init("job", &json!({"slow_calls_duration_threshold": 1}))
        .unwrap();
    let ctx = pool.context().with_profiling(registry.clone());
    let actor = create_on(&ctx, SUB, "worker").await;

    ctx.call(&actor, CallContent::new("echo")).await.unwrap();
    ctx.call(&actor, sleep_call(2.0, "slow")).await.unwrap();
    ctx.has_actor(&actor).await.unwrap();

    let tree = registry.pop("job").unwrap();
    assert_eq!(
        tree["most_calls"],
        json!({"worker.echo": 1, "worker.sleep": 1})
    );
    let slow = tree["slow_calls"].as_object().unwrap();
    assert_eq!(slow.len(), 1);
    assert!(slow.values().all(|d| d.as_f64().unwrap() >= 2.0));
}

#[tokio::test]
async fn test_cancel_tasks_on_last_context_drop() {
    let pool = pool();
    let ctx = pool.context();
    let clone = ctx.clone();
    let derived = ctx.with_cancellation(CancellationToken::new());

    drop(ctx);
    drop(clone);
    assert_eq!(pool.cancel_tasks_calls(), 0);

    drop(derived);
    assert_eq!(pool.cancel_tasks_calls(), 1);
}
