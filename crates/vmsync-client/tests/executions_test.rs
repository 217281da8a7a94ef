//! Execution tracker: REPL runs, history hydration and event paging.

mod common;

use serde_json::json;

use common::mock_engine;
use vmsync_client::{Engine, EngineError, Method};
use vmsync_core::{EventType, ExecutionStatus, Session, SessionStatus};

async fn ready_session(engine: &Engine) -> Session {
    let templates = engine.templates().list().await.unwrap();
    engine.sessions().create(&templates[0].id, None).await.unwrap()
}

#[tokio::test]
async fn run_returns_execution_with_events() {
    let (engine, _) = mock_engine();
    let session = ready_session(&engine).await;

    let exec = engine
        .executions()
        .run(&session.id, "console.log('hi'); 40 + 2")
        .await
        .unwrap();

    assert_eq!(exec.session_id, session.id);
    assert_eq!(exec.status, ExecutionStatus::Ok);
    assert_eq!(exec.result, Some(json!(42)));
    assert!(exec.error.is_none());
    let types: Vec<EventType> = exec.events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![EventType::InputEcho, EventType::Console, EventType::Value]
    );
    assert!(exec.events.windows(2).all(|w| w[0].seq < w[1].seq));

    let cached = engine.executions().cached(&session.id).await;
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].id, exec.id);
}

#[tokio::test]
async fn thrown_error_is_flattened_to_message() {
    let (engine, _) = mock_engine();
    let session = ready_session(&engine).await;

    let exec = engine
        .executions()
        .run(&session.id, "throw new Error('boom')")
        .await
        .unwrap();
    assert_eq!(exec.status, ExecutionStatus::Error);
    assert!(exec.error.as_deref().unwrap_or_default().contains("boom"));
    assert_eq!(exec.events.last().map(|e| e.event_type), Some(EventType::Exception));
}

#[tokio::test]
async fn run_against_closed_session_makes_no_request() {
    let (engine, transport) = mock_engine();
    let session = ready_session(&engine).await;
    engine.sessions().close(&session.id).await.unwrap();
    transport.reset_log();

    let err = engine.executions().run(&session.id, "1 + 1").await.unwrap_err();
    assert!(err.is_domain());
    assert_eq!(
        err,
        EngineError::SessionNotReady {
            id: session.id.clone(),
            status: SessionStatus::Closed
        }
    );
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn run_against_unknown_session_makes_no_request() {
    let (engine, transport) = mock_engine();
    let err = engine
        .executions()
        .run(&"ghost".into(), "1")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownSession(_)));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn events_page_after_seq() {
    let (engine, _) = mock_engine();
    let session = ready_session(&engine).await;
    let exec = engine
        .executions()
        .run(&session.id, "console.log('a'); console.log('b'); 1 + 2")
        .await
        .unwrap();
    assert_eq!(exec.events.len(), 4);

    let tail = engine.executions().events(&exec.id, 2).await.unwrap();
    let seqs: Vec<u64> = tail.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![3, 4]);

    let none = engine.executions().events(&exec.id, 4).await.unwrap();
    assert!(none.is_empty());

    // Merging a page never duplicates events already held.
    let cached = engine.executions().cached(&session.id).await;
    assert_eq!(cached[0].events.len(), 4);
}

#[tokio::test]
async fn history_is_hydrated_per_execution_and_ascending() {
    let (engine, transport) = mock_engine();
    let session = ready_session(&engine).await;
    let mut ran = Vec::new();
    for code in ["1", "2", "3"] {
        ran.push(engine.executions().run(&session.id, code).await.unwrap().id);
    }

    transport.reset_log();
    let history = engine.executions().list_for_session(&session.id, 2).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.windows(2).all(|w| w[0].started_at <= w[1].started_at));
    let mut got: Vec<_> = history.iter().map(|e| e.id.clone()).collect();
    got.sort();
    let mut want = ran[1..].to_vec();
    want.sort();
    assert_eq!(got, want);
    assert!(history.iter().all(|e| !e.events.is_empty()));

    assert_eq!(transport.count(Method::Get, "/api/v1/executions"), 1);
    assert_eq!(
        transport.count_prefix(Method::Get, "/api/v1/executions/"),
        2,
        "one event fetch per execution"
    );

    // Cached until a new run invalidates the session's execution tag.
    transport.reset_log();
    engine.executions().list_for_session(&session.id, 2).await.unwrap();
    assert!(transport.calls().is_empty());

    engine.executions().run(&session.id, "4").await.unwrap();
    transport.reset_log();
    engine.executions().list_for_session(&session.id, 2).await.unwrap();
    assert_eq!(transport.count(Method::Get, "/api/v1/executions"), 1);
}

#[tokio::test]
async fn get_fetches_detail_with_events() {
    let (engine, _) = mock_engine();
    let session = ready_session(&engine).await;
    let exec = engine.executions().run(&session.id, "'x' + 1").await.unwrap();

    let fetched = engine.executions().get(&exec.id).await.unwrap();
    assert_eq!(fetched.id, exec.id);
    assert_eq!(fetched.result, Some(json!("x1")));
    assert_eq!(fetched.events, exec.events);
}

#[tokio::test]
async fn missing_execution_is_evicted() {
    let (engine, transport) = mock_engine();
    let session = ready_session(&engine).await;
    let exec = engine.executions().run(&session.id, "1").await.unwrap();

    transport
        .state
        .backend
        .lock()
        .await
        .delete_session(session.id.as_str())
        .unwrap();

    let err = engine.executions().events(&exec.id, 0).await.unwrap_err();
    assert!(err.is_execution_not_found());
    assert!(engine.executions().cached(&session.id).await.is_empty());
}

#[tokio::test]
async fn run_on_session_missing_on_backend_evicts_it() {
    let (engine, transport) = mock_engine();
    let session = ready_session(&engine).await;
    transport
        .state
        .backend
        .lock()
        .await
        .delete_session(session.id.as_str())
        .unwrap();

    let err = engine.executions().run(&session.id, "1").await.unwrap_err();
    assert!(err.is_session_not_found());
    assert!(engine.overlay().current().is_none());

    // Now unknown locally, so the next attempt never reaches the backend.
    transport.reset_log();
    let err = engine.executions().run(&session.id, "1").await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownSession(_)));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn run_refreshes_cached_session_activity() {
    let (engine, _) = mock_engine();
    let session = ready_session(&engine).await;
    let listed = engine.sessions().list(None).await.unwrap();
    let fetched = engine.sessions().get(&session.id).await.unwrap();
    assert_eq!(listed[0].last_activity_at, fetched.last_activity_at);

    let exec = engine.executions().run(&session.id, "1 + 1").await.unwrap();
    let stamp = exec.ended_at.unwrap_or(exec.started_at);

    let listed = engine.sessions().list(None).await.unwrap();
    assert_eq!(listed[0].id, session.id);
    assert_eq!(listed[0].last_activity_at, stamp);
    let fetched = engine.sessions().get(&session.id).await.unwrap();
    assert_eq!(fetched.last_activity_at, stamp);
}
