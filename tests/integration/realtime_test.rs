//! Integration tests for the sync engine: hub lifecycle, dispatch and
//! polling fallback, driven through scripted hub and version sources.

mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use caselink_auth::{HttpAuthApi, LogRedirect, SessionStore};
use caselink_core::ErrorKind;
use caselink_core::config::AppConfig;
use caselink_core::events::{ChangeOperation, EntityChange, EventKind, SyncEvent};
use caselink_realtime::{
    BroadcastChange, ConnectionState, ConnectionStatus, EngineParts, EventDispatcher,
    HandlerError, HubMessage, SyncEngine,
};

use helpers::{ScriptedHub, ScriptedProbe, TOKEN, admin_user};

async fn engine(hub: Arc<ScriptedHub>, probe: Arc<ScriptedProbe>) -> SyncEngine {
    let config = AppConfig::default();
    let (session, _, _) = helpers::session_store();
    assert!(session.save(TOKEN, &admin_user(), Some("refresh-1")).await);
    engine_over(config, session, hub, probe)
}

fn engine_over(
    config: AppConfig,
    session: Arc<SessionStore>,
    hub: Arc<ScriptedHub>,
    probe: Arc<ScriptedProbe>,
) -> SyncEngine {
    let parts = EngineParts {
        auth: Arc::new(HttpAuthApi::new(config.api.clone()).unwrap()),
        connector: hub,
        probe,
        redirect: Arc::new(LogRedirect),
    };
    SyncEngine::with_parts(config, session, parts).unwrap()
}

async fn wait_for_state(engine: &SyncEngine, state: ConnectionState) {
    let mut states = engine.connection().subscribe();
    states.wait_for(|s| *s == state).await.unwrap();
}

fn payload_log(dispatcher: &EventDispatcher, kind: EventKind) -> Arc<Mutex<Vec<Value>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    dispatcher.on(kind, move |event| {
        let payload = match event {
            SyncEvent::SystemStatusChanged { status } => status.clone(),
            SyncEvent::DataVersionChanged { version } => json!(version),
            other => other.change().map(|c| c.data.clone()).unwrap_or(Value::Null),
        };
        sink.lock().unwrap().push(payload);
        Ok(())
    });
    log
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_hub_degrades_to_polling() {
    let hub = ScriptedHub::unreachable();
    let probe = ScriptedProbe::new(&["v1", "v2", "v2"]);
    let engine = engine(hub.clone(), probe.clone()).await;
    let versions = payload_log(engine.dispatcher(), EventKind::DataVersion);

    assert!(engine.init().await.unwrap());
    wait_for_state(&engine, ConnectionState::PollingFallback).await;

    let max = engine.config().realtime.max_outer_retries as usize;
    assert_eq!(hub.attempts(), max);
    assert_eq!(engine.connection().status(), ConnectionStatus::Polling);
    assert_eq!(
        engine.connection().last_error().map(|e| e.kind),
        Some(ErrorKind::RetriesExhausted)
    );

    // One poll on entry, then one per 30 s interval.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(probe.calls(), 3);
    assert_eq!(versions.lock().unwrap().as_slice(), &[json!("v2")]);

    // No further hub attempts once polling.
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(hub.attempts(), max);

    engine.dispose().await;
    assert_eq!(engine.connection().status(), ConnectionStatus::Disconnected);
    assert!(!engine.polling().is_polling());
}

#[tokio::test(start_paused = true)]
async fn test_hub_events_reach_handlers() {
    let (hub, mut ends) = ScriptedHub::new(vec![true], true);
    let engine = engine(hub.clone(), ScriptedProbe::new(&[])).await;
    let dispatcher = engine.dispatcher();

    dispatcher.on(EventKind::User, |_| panic!("first user handler failed"));
    let users = payload_log(dispatcher, EventKind::User);
    let runners = payload_log(dispatcher, EventKind::Runner);
    let statuses = payload_log(dispatcher, EventKind::SystemStatus);

    assert!(engine.init().await.unwrap());
    let mut end = ends.recv().await.unwrap();
    assert_eq!(end.received.recv().await.unwrap(), HubMessage::join_admin_group());
    assert_eq!(hub.tokens.lock().unwrap()[0].as_deref(), Some(TOKEN));

    for message in [
        HubMessage::new("UserChanged", vec![json!("update"), json!({"id": 1, "v": 1})]),
        HubMessage::new("RunnerChanged", vec![json!("create"), json!({"id": 9})]),
        HubMessage::new("UserChanged", vec![json!("update"), json!({"id": 1, "v": 2})]),
        HubMessage::new("SystemStatusChanged", vec![json!({"maintenance": true})]),
    ] {
        end.push.send(message).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(statuses.lock().unwrap().as_slice(), &[json!({"maintenance": true})]);
    assert!(users.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(users.lock().unwrap().as_slice(), &[json!({"id": 1, "v": 2})]);
    assert_eq!(runners.lock().unwrap().as_slice(), &[json!({"id": 9})]);

    engine.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_uses_current_token() {
    let (hub, mut ends) = ScriptedHub::new(vec![true, true], false);
    let engine = engine(hub.clone(), ScriptedProbe::new(&[])).await;

    assert!(engine.init().await.unwrap());
    let first = ends.recv().await.unwrap();
    wait_for_state(&engine, ConnectionState::Connected).await;

    assert!(
        engine
            .session()
            .save("rotated-access-token", &admin_user(), Some("refresh-2"))
            .await
    );
    drop(first);

    let mut second = ends.recv().await.unwrap();
    assert_eq!(second.received.recv().await.unwrap(), HubMessage::join_admin_group());
    assert_eq!(
        hub.tokens.lock().unwrap().as_slice(),
        &[Some(TOKEN.to_string()), Some("rotated-access-token".to_string())]
    );
    assert_eq!(engine.connection().retry_count(), 0);

    engine.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_reaches_hub() {
    let (hub, mut ends) = ScriptedHub::new(vec![true], true);
    let engine = engine(hub, ScriptedProbe::new(&[])).await;

    assert!(engine.init().await.unwrap());
    let mut end = ends.recv().await.unwrap();
    assert_eq!(end.received.recv().await.unwrap(), HubMessage::join_admin_group());

    let change = BroadcastChange::new(
        EventKind::PublicCase,
        EntityChange::with_data(ChangeOperation::Deleted, json!({"caseId": 12})),
    )
    .unwrap();
    engine.connection().broadcast(change);

    assert_eq!(
        end.received.recv().await.unwrap(),
        HubMessage::new(
            "BroadcastPublicCaseChange",
            vec![json!("delete"), json!({"caseId": 12})]
        )
    );

    engine.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_logout_disconnects_and_clears_session() {
    let (hub, mut ends) = ScriptedHub::new(vec![true], true);
    let engine = engine(hub, ScriptedProbe::new(&[])).await;

    assert!(engine.init().await.unwrap());
    let _end = ends.recv().await.unwrap();
    wait_for_state(&engine, ConnectionState::Connected).await;

    engine.logout().await;
    assert_eq!(engine.connection().state(), ConnectionState::Disconnected);
    assert!(!engine.session().is_authenticated().await);
    assert!(engine.session().auth_header().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_init_without_session_does_not_connect() {
    let hub = ScriptedHub::unreachable();
    let (session, _, _) = helpers::session_store();
    let engine = engine_over(AppConfig::default(), session, hub.clone(), ScriptedProbe::new(&[]));

    assert!(!engine.init().await.unwrap());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(hub.attempts(), 0);
    assert_eq!(engine.connection().status(), ConnectionStatus::Disconnected);

    engine.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_dispose_flushes_pending_changes() {
    let (hub, mut ends) = ScriptedHub::new(vec![true], true);
    let engine = engine(hub, ScriptedProbe::new(&[])).await;
    let admins = payload_log(engine.dispatcher(), EventKind::Admin);

    assert!(engine.init().await.unwrap());
    let end = ends.recv().await.unwrap();
    end.push
        .send(HubMessage::new("AdminChanged", vec![json!("update"), json!({"id": 3})]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(admins.lock().unwrap().is_empty());

    engine.dispose().await;
    assert_eq!(admins.lock().unwrap().as_slice(), &[json!({"id": 3})]);
}

#[test]
fn test_failing_handler_does_not_stop_the_next() {
    let dispatcher = EventDispatcher::new(Duration::from_millis(500));
    let calls = Arc::new(AtomicUsize::new(0));

    dispatcher.on(EventKind::User, |_| Err(HandlerError::new("cannot refresh grid")));
    dispatcher.on(EventKind::User, |_| panic!("grid disposed"));
    let counter = calls.clone();
    dispatcher.on(EventKind::User, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let event = SyncEvent::UserChanged(EntityChange::new(ChangeOperation::Updated));
    assert_eq!(dispatcher.emit(&event), 1);
    assert_eq!(dispatcher.emit(&event), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
