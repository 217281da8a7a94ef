//! Execution tracker: REPL submission, event hydration and the per-session
//! execution index.

use vmsync_core::normalize::{to_events, to_execution};
use vmsync_core::wire::{RawEvent, RawExecution, ReplRequest};
use vmsync_core::{Event, Execution, ExecutionId, SessionId, SessionStatus};

use crate::cache::{Kind, Tag};
use crate::engine::Inner;
use crate::error::EngineError;
use crate::transport::{encode_segment, ApiRequest};

/// Page size for [`ExecutionTracker::list_for_session`] callers that have no
/// preference.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

fn execution_path(id: &ExecutionId) -> String {
    format!("/api/v1/executions/{}", encode_segment(id.as_str()))
}

fn history_key(session_id: &SessionId, limit: usize) -> String {
    format!("executions:{}:{}", session_id, limit)
}

pub struct ExecutionTracker<'a> {
    inner: &'a Inner,
}

impl<'a> ExecutionTracker<'a> {
    pub(crate) fn new(inner: &'a Inner) -> Self {
        ExecutionTracker { inner }
    }

    /// Runs `code` in a session and returns the execution with its events.
    ///
    /// Rejected locally, without a request, when the session is not in the
    /// index or is not `ready`.
    pub async fn run(&self, session_id: &SessionId, code: &str) -> Result<Execution, EngineError> {
        {
            let store = self.inner.store.lock().await;
            let session = store
                .sessions
                .get(session_id)
                .ok_or_else(|| EngineError::UnknownSession(session_id.clone()))?;
            if session.status != SessionStatus::Ready {
                return Err(EngineError::SessionNotReady {
                    id: session_id.clone(),
                    status: session.status,
                });
            }
        }

        let body = ReplRequest {
            session_id: session_id.to_string(),
            input: code.to_string(),
        };
        let request = ApiRequest::post("/api/v1/executions/repl").json(&body)?;
        let raw: RawExecution = match self.inner.fetch(request).await {
            Ok(raw) => raw,
            Err(err) => return Err(self.inner.observe_missing(err, Some(session_id), None).await),
        };
        let events = self.hydrate(&raw).await;
        let execution = to_execution(&raw, events);

        let mut store = self.inner.store.lock().await;
        if let Some(session) = store.sessions.get_mut(session_id) {
            session.last_activity_at = execution.ended_at.unwrap_or(execution.started_at);
        }
        store.upsert_execution(execution.clone());
        drop(store);

        // The session's activity stamp moved too.
        self.inner.invalidate_session(session_id);
        tracing::debug!(execution_id = %execution.id, status = ?execution.status, "repl execution recorded");
        Ok(execution)
    }

    /// Full event stream of one execution. A failed fetch yields no events:
    /// the execution record itself is still valid.
    async fn hydrate(&self, raw: &RawExecution) -> Vec<Event> {
        let request = ApiRequest::get(format!(
            "{}/events",
            execution_path(&ExecutionId::new(raw.id.clone()))
        ))
        .query("after_seq", 0);
        match self.inner.fetch_list::<RawEvent>(request).await {
            Ok(events) => to_events(&events),
            Err(err) => {
                tracing::warn!(execution_id = %raw.id, error = %err, "failed to load execution events");
                Vec::new()
            }
        }
    }

    /// The `limit` most recent executions of a session, each hydrated with
    /// its events, ordered by start time ascending.
    pub async fn list_for_session(
        &self,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<Execution>, EngineError> {
        let key = history_key(session_id, limit);
        if let Some(cached) = self.inner.cache.get::<Vec<Execution>>(&key) {
            return Ok(cached);
        }

        let request = ApiRequest::get("/api/v1/executions")
            .query("session_id", session_id)
            .query("limit", limit);
        let raw: Vec<RawExecution> = match self.inner.fetch_list(request).await {
            Ok(raw) => raw,
            Err(err) => return Err(self.inner.observe_missing(err, Some(session_id), None).await),
        };

        let mut executions = Vec::with_capacity(raw.len());
        for exec in &raw {
            let events = self.hydrate(exec).await;
            executions.push(to_execution(exec, events));
        }
        executions.sort_by(|a, b| a.started_at.cmp(&b.started_at));

        self.inner
            .store
            .lock()
            .await
            .replace_executions(session_id, executions.clone());
        self.inner.cache.insert(
            key,
            executions.clone(),
            vec![Tag::session_executions(session_id)],
        );
        Ok(executions)
    }

    /// Events with `seq > after_seq`. New events are appended to the locally
    /// tracked execution.
    pub async fn events(&self, execution_id: &ExecutionId, after_seq: u64) -> Result<Vec<Event>, EngineError> {
        let request = ApiRequest::get(format!("{}/events", execution_path(execution_id)))
            .query("after_seq", after_seq);
        let raw: Vec<RawEvent> = match self.inner.fetch_list(request).await {
            Ok(raw) => raw,
            Err(err) => return Err(self.inner.observe_missing(err, None, Some(execution_id)).await),
        };
        let events: Vec<Event> = to_events(&raw)
            .into_iter()
            .filter(|e| e.seq > after_seq)
            .collect();

        let mut store = self.inner.store.lock().await;
        if let Some(exec) = store.execution_mut(execution_id) {
            let last = exec.events.last().map_or(0, |e| e.seq);
            exec.events
                .extend(events.iter().filter(|e| e.seq > last).cloned());
        }
        Ok(events)
    }

    /// Execution detail with its full event stream.
    pub async fn get(&self, execution_id: &ExecutionId) -> Result<Execution, EngineError> {
        let raw: RawExecution = match self.inner.fetch(ApiRequest::get(execution_path(execution_id))).await {
            Ok(raw) => raw,
            Err(err) => return Err(self.inner.observe_missing(err, None, Some(execution_id)).await),
        };
        let events = self.hydrate(&raw).await;
        let execution = to_execution(&raw, events);
        let mut store = self.inner.store.lock().await;
        if store.sessions.contains_key(&execution.session_id) {
            store.upsert_execution(execution.clone());
        }
        drop(store);
        self.inner.cache.insert(
            format!("execution:{}", execution_id),
            execution.clone(),
            vec![
                Tag::entity(Kind::Execution, execution_id),
                Tag::session_executions(&execution.session_id),
            ],
        );
        Ok(execution)
    }

    /// The locally tracked executions of a session, oldest first.
    pub async fn cached(&self, session_id: &SessionId) -> Vec<Execution> {
        self.inner
            .store
            .lock()
            .await
            .executions
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}
