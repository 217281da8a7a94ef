//! Template registry and initialization against the mock backend and a
//! scripted transport.

mod common;

use serde_json::json;

use common::{engine_over, mock_engine, StubTransport};
use vmsync_client::{EngineError, Method, DEFAULT_TEMPLATES};
use vmsync_core::Limits;

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn empty_backend_bootstraps_default_templates_sorted() {
    let (engine, transport) = mock_engine();

    let templates = engine.templates().list().await.unwrap();

    let listed: Vec<&str> = templates.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        listed,
        vec!["Default JavaScript", "Library Sandbox", "Utility Playground"]
    );
    assert_eq!(
        transport.count(Method::Post, "/api/v1/templates"),
        DEFAULT_TEMPLATES.len()
    );

    let sandbox = &templates[1];
    let mut libraries = sandbox.libraries.clone();
    libraries.sort();
    assert_eq!(libraries, names(&["dayjs", "ramda"]));
    assert_eq!(templates[2].libraries, names(&["lodash"]));
    assert!(templates.iter().all(|t| t.engine == "goja"));
}

#[tokio::test]
async fn listing_twice_hits_the_cache() {
    let (engine, transport) = mock_engine();
    engine.templates().list().await.unwrap();
    transport.reset_log();

    engine.templates().list().await.unwrap();
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn concurrent_initialize_bootstraps_once() {
    let (engine, transport) = mock_engine();

    let (a, b, c) = tokio::join!(engine.initialize(), engine.initialize(), engine.initialize());
    let a = a.unwrap();
    assert_eq!(b.unwrap(), a);
    assert_eq!(c.unwrap(), a);

    assert_eq!(transport.count(Method::Post, "/api/v1/templates"), 3);
    assert_eq!(transport.count(Method::Post, "/api/v1/sessions"), 1);
    assert_eq!(a.sessions.len(), 1);
    assert_eq!(a.sessions[0].name, "Default Session");
    assert_eq!(a.current.as_ref().map(|s| &s.id), Some(&a.sessions[0].id));

    // The slot is cleared once settled; a later call runs again but finds data.
    let again = engine.initialize().await.unwrap();
    assert_eq!(again.sessions.len(), 1);
    assert_eq!(transport.count(Method::Post, "/api/v1/templates"), 3);
    assert_eq!(transport.count(Method::Post, "/api/v1/sessions"), 1);
}

#[tokio::test]
async fn update_modules_is_idempotent() {
    let (engine, transport) = mock_engine();
    let templates = engine.templates().list().await.unwrap();
    let id = templates[0].id.clone();
    let wanted = names(&["fs", "path"]);

    let updated = engine.templates().update_modules(&id, &wanted).await.unwrap();
    let mut modules = updated.exposed_modules.clone();
    modules.sort();
    assert_eq!(modules, wanted);

    transport.reset_log();
    engine.templates().update_modules(&id, &wanted).await.unwrap();
    let prefix = format!("/api/v1/templates/{}/modules", id);
    assert_eq!(transport.count_prefix(Method::Post, &prefix), 0);
    assert_eq!(transport.count_prefix(Method::Delete, &prefix), 0);
}

#[tokio::test]
async fn update_libraries_adds_and_removes() {
    let (engine, transport) = mock_engine();
    let templates = engine.templates().list().await.unwrap();
    let playground = templates
        .iter()
        .find(|t| t.name == "Utility Playground")
        .unwrap();

    transport.reset_log();
    let updated = engine
        .templates()
        .update_libraries(&playground.id, &names(&["ramda"]))
        .await
        .unwrap();
    assert_eq!(updated.libraries, names(&["ramda"]));

    let prefix = format!("/api/v1/templates/{}/libraries", playground.id);
    assert_eq!(transport.count_prefix(Method::Post, &prefix), 1);
    assert_eq!(transport.count(Method::Delete, &format!("{}/lodash", prefix)), 1);

    // The list was invalidated and reflects the change.
    let listed = engine.templates().list().await.unwrap();
    let again = listed.iter().find(|t| t.id == playground.id).unwrap();
    assert_eq!(again.libraries, names(&["ramda"]));
}

#[tokio::test]
async fn created_template_appears_in_list() {
    let (engine, _) = mock_engine();
    engine.templates().list().await.unwrap();

    let created = engine.templates().create("alpha", "").await.unwrap();
    assert_eq!(created.engine, "goja");
    assert_eq!(created.settings.limits, Limits::default());

    let listed = engine.templates().list().await.unwrap();
    assert_eq!(listed.len(), 4);
    assert_eq!(listed[0].id, created.id);
}

#[tokio::test]
async fn partial_settings_are_defaulted() {
    let stub = StubTransport::new();
    stub.reply(
        Method::Get,
        "/api/v1/templates",
        json!([{ "id": "tpl-1", "name": "Partial", "created_at": "2024-05-01T00:00:00Z" }]),
    );
    stub.reply(
        Method::Get,
        "/api/v1/templates/tpl-1",
        json!({
            "template": { "id": "tpl-1", "name": "Partial", "created_at": "2024-05-01T00:00:00Z" },
            "settings": {
                "limits": { "cpu_ms": 1000, "wall_ms": "slow" },
                "runtime": { "strict": false }
            }
        }),
    );
    let engine = engine_over(stub.clone());

    let templates = engine.templates().list().await.unwrap();
    let settings = &templates[0].settings;
    assert_eq!(settings.limits.cpu_ms, 1000.0);
    assert_eq!(settings.limits.wall_ms, 5000.0);
    assert_eq!(settings.limits.mem_mb, 128.0);
    assert_eq!(settings.resolver.roots, names(&["."]));
    assert_eq!(settings.resolver.extensions, names(&[".js", ".mjs"]));
    assert!(!settings.runtime.strict);
    assert!(settings.runtime.esm);
    assert!(templates[0].exposed_modules.is_empty());
    assert!(templates[0].startup_files.is_empty());
}

#[tokio::test]
async fn failed_bootstrap_aborts_and_initialize_can_retry() {
    let stub = StubTransport::new();
    stub.reply(Method::Get, "/api/v1/templates", json!([]));
    stub.fail(Method::Post, "/api/v1/templates", 500, "INTERNAL");
    let engine = engine_over(stub.clone());

    let err = engine.initialize().await.unwrap_err();
    match &err {
        EngineError::Transport(t) => {
            assert_eq!(t.status, 500);
            assert!(t.has_code("INTERNAL"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    let posts = stub
        .requests()
        .iter()
        .filter(|r| r.method == Method::Post)
        .count();
    assert_eq!(posts, 1);

    let template = json!({ "id": "tpl-1", "name": "Only", "engine": "goja", "created_at": "2024-05-01T00:00:00Z" });
    stub.reply(Method::Get, "/api/v1/templates", json!([template.clone()]));
    stub.reply(Method::Get, "/api/v1/templates/tpl-1", json!({ "template": template }));
    stub.reply(
        Method::Get,
        "/api/v1/sessions",
        json!([{
            "id": "sess-1",
            "template_id": "tpl-1",
            "status": "ready",
            "created_at": "2024-05-02T00:00:00Z"
        }]),
    );

    let summary = engine.initialize().await.unwrap();
    assert_eq!(summary.templates.len(), 1);
    assert_eq!(summary.sessions[0].name, "Only · sess-1");
    assert_eq!(summary.current.map(|s| s.id.to_string()), Some("sess-1".to_string()));
}

#[tokio::test]
async fn initialize_creates_default_session_when_none_exist() {
    let stub = StubTransport::new();
    let template = json!({ "id": "tpl-1", "name": "Only", "created_at": "2024-05-01T00:00:00Z" });
    stub.reply(Method::Get, "/api/v1/templates", json!([template.clone()]));
    stub.reply(Method::Get, "/api/v1/templates/tpl-1", json!({ "template": template }));
    stub.reply(Method::Get, "/api/v1/sessions", json!([]));
    stub.reply(
        Method::Post,
        "/api/v1/sessions",
        json!({ "id": "sess-9", "vm_id": "tpl-1", "status": "starting", "created_at": "2024-05-02T00:00:00Z" }),
    );
    let engine = engine_over(stub.clone());

    let summary = engine.initialize().await.unwrap();
    assert_eq!(summary.sessions.len(), 1);
    assert_eq!(summary.sessions[0].name, "Default Session");
    // A starting session is not adopted as current.
    assert!(summary.current.is_none());
}

#[tokio::test]
async fn reconcile_stops_at_first_failed_request() {
    let stub = StubTransport::new();
    let template = json!({ "id": "tpl-1", "name": "Only", "created_at": "2024-05-01T00:00:00Z" });
    stub.reply(Method::Get, "/api/v1/templates", json!([template.clone()]));
    stub.reply(Method::Get, "/api/v1/templates/tpl-1", json!({ "template": template }));
    stub.reply(Method::Get, "/api/v1/templates/tpl-1/modules", json!(["a", "b"]));
    stub.reply(Method::Post, "/api/v1/templates/tpl-1/modules", json!(null));
    stub.fail(Method::Delete, "/api/v1/templates/tpl-1/modules/a", 500, "INTERNAL");
    let engine = engine_over(stub.clone());

    let templates = engine.templates().list().await.unwrap();
    assert!(engine.cache().contains("templates"));

    let err = engine
        .templates()
        .update_modules(&templates[0].id, &names(&["c"]))
        .await
        .unwrap_err();
    match &err {
        EngineError::Transport(t) => {
            assert_eq!(t.status, 500);
            assert!(t.has_code("INTERNAL"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let requests = stub.requests();
    let count = |method: Method, path: &str| {
        requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    };
    assert_eq!(count(Method::Post, "/api/v1/templates/tpl-1/modules"), 1);
    assert_eq!(count(Method::Delete, "/api/v1/templates/tpl-1/modules/a"), 1);
    assert_eq!(count(Method::Delete, "/api/v1/templates/tpl-1/modules/b"), 0);
    // Only the detail fetch made while listing.
    assert_eq!(count(Method::Get, "/api/v1/templates/tpl-1"), 1);
    let last = requests.last().unwrap();
    assert_eq!((last.method, last.path.as_str()), (Method::Delete, "/api/v1/templates/tpl-1/modules/a"));

    assert!(!engine.cache().contains("templates"));
}
