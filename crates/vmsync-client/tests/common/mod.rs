//! Shared transports for the engine integration tests.
//!
//! [`RouterTransport`] forwards every request into the mock backend's router
//! with `tower::ServiceExt::oneshot` and records it. [`StubTransport`] answers
//! from a script and records what it was asked.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use vmsync_client::transport::{interpret_response, request_url};
use vmsync_client::{ApiRequest, ClientConfig, Engine, Method, Transport, TransportError};
use vmsync_mock::router::build_router;
use vmsync_mock::state::AppState;
use vmsync_storage::IdentityOverlay;

pub type CallLog = Mutex<Vec<(Method, String)>>;

pub struct RouterTransport {
    app: Router,
    pub state: AppState,
    log: CallLog,
}

impl RouterTransport {
    pub fn new() -> Arc<Self> {
        let state = AppState::in_memory();
        Arc::new(RouterTransport {
            app: build_router(state.clone()),
            state,
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(Method, String)> {
        self.log.lock().unwrap().clone()
    }

    /// Number of recorded calls with exactly this method and path.
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, p)| *m == method && p == path)
            .count()
    }

    /// Number of recorded calls with this method whose path starts with `prefix`.
    pub fn count_prefix(&self, method: Method, prefix: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, p)| *m == method && p.starts_with(prefix))
            .count()
    }

    pub fn reset_log(&self) {
        self.log.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for RouterTransport {
    async fn send(&self, request: ApiRequest) -> Result<Option<Value>, TransportError> {
        // Let concurrently started callers interleave as they would over a socket.
        tokio::task::yield_now().await;

        let url = request_url("http://mock", "", &request)?;
        let uri = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        self.log
            .lock()
            .unwrap()
            .push((request.method, request.path.clone()));

        let builder = Request::builder().method(request.method.as_str()).uri(uri);
        let http_request = match &request.body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.app.clone().oneshot(http_request).await.unwrap();
        let status = response.status().as_u16();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        interpret_response(status, &bytes)
    }
}

type Reply = Result<Option<Value>, TransportError>;

/// Scripted transport. Replies are queued per `(method, path)` and consumed
/// in order; an unscripted request fails with a 404 transport error.
#[derive(Default)]
pub struct StubTransport {
    replies: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(StubTransport::default())
    }

    pub fn reply(&self, method: Method, path: &str, body: Value) {
        self.push(method, path, Ok(Some(body)));
    }

    pub fn fail(&self, method: Method, path: &str, status: u16, code: &str) {
        self.push(
            method,
            path,
            Err(TransportError {
                status,
                message: format!("{} failure", code),
                code: Some(code.to_string()),
                details: None,
            }),
        );
    }

    fn push(&self, method: Method, path: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: ApiRequest) -> Result<Option<Value>, TransportError> {
        self.log.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&(request.method, request.path.clone()))
            .and_then(VecDeque::pop_front);
        reply.unwrap_or_else(|| {
            Err(TransportError {
                status: 404,
                message: format!("no stub for {} {}", request.method.as_str(), request.path),
                code: None,
                details: None,
            })
        })
    }
}

pub fn engine_over(transport: Arc<dyn Transport>) -> Engine {
    Engine::new(transport, IdentityOverlay::in_memory(), ClientConfig::default())
}

/// Engine over a fresh mock backend.
pub fn mock_engine() -> (Engine, Arc<RouterTransport>) {
    let transport = RouterTransport::new();
    let engine = engine_over(transport.clone());
    (engine, transport)
}
