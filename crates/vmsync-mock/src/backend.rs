//! In-memory backend state behind the mock REST API.
//!
//! [`Backend`] owns every template, session and execution. Handlers lock it,
//! call one method, and serialize the result; no business logic lives in the
//! handlers themselves.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use vmsync_core::normalize::{to_raw_detail, to_raw_template};
use vmsync_core::wire::{
    CreateSessionRequest, CreateTemplateRequest, RawEvent, RawExecution, RawExecutionKind,
    RawSession, RawTemplate, RawTemplateDetail,
};
use vmsync_core::{
    EventType, ExecutionStatus, SessionStatus, Template, TemplateId, TemplateSettings,
};

use crate::error::ApiError;
use crate::eval;

/// Engine recorded on templates created without one.
pub const DEFAULT_ENGINE: &str = "goja";

/// The two name sets a template carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateList {
    Modules,
    Libraries,
}

struct StoredExecution {
    record: RawExecution,
    events: Vec<RawEvent>,
}

#[derive(Default)]
pub struct Backend {
    templates: BTreeMap<String, Template>,
    sessions: HashMap<String, RawSession>,
    executions: HashMap<String, StoredExecution>,
    /// Execution ids in submission order.
    execution_order: Vec<String>,
}

impl Backend {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Templates
    // -----------------------------------------------------------------------

    fn template(&self, id: &str) -> Result<&Template, ApiError> {
        self.templates
            .get(id)
            .ok_or_else(|| ApiError::TemplateNotFound(id.to_string()))
    }

    fn template_mut(&mut self, id: &str) -> Result<&mut Template, ApiError> {
        self.templates
            .get_mut(id)
            .ok_or_else(|| ApiError::TemplateNotFound(id.to_string()))
    }

    /// Templates in creation order.
    pub fn list_templates(&self) -> Vec<RawTemplate> {
        let mut templates: Vec<&Template> = self.templates.values().collect();
        templates.sort_by_key(|t| t.created_at);
        templates.into_iter().map(to_raw_template).collect()
    }

    pub fn create_template(&mut self, req: CreateTemplateRequest) -> Result<RawTemplate, ApiError> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(ApiError::Validation("name is required".into()));
        }
        let engine = match req.engine.trim() {
            "" => DEFAULT_ENGINE.to_string(),
            engine => engine.to_string(),
        };
        let template = Template {
            id: TemplateId::new(Uuid::new_v4().to_string()),
            name: name.to_string(),
            engine,
            is_active: true,
            created_at: Utc::now(),
            exposed_modules: Vec::new(),
            libraries: Vec::new(),
            settings: TemplateSettings::default(),
            capabilities: Vec::new(),
            startup_files: Vec::new(),
        };
        tracing::info!(template_id = %template.id, name = %template.name, "template created");
        let raw = to_raw_template(&template);
        self.templates.insert(template.id.to_string(), template);
        Ok(raw)
    }

    pub fn template_detail(&self, id: &str) -> Result<RawTemplateDetail, ApiError> {
        self.template(id).map(to_raw_detail)
    }

    pub fn list_names(&self, id: &str, list: TemplateList) -> Result<Vec<String>, ApiError> {
        let template = self.template(id)?;
        Ok(match list {
            TemplateList::Modules => template.exposed_modules.clone(),
            TemplateList::Libraries => template.libraries.clone(),
        })
    }

    /// Adds `name`; adding a present name is a no-op.
    pub fn add_name(&mut self, id: &str, list: TemplateList, name: &str) -> Result<(), ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::Validation("name is required".into()));
        }
        let names = names_mut(self.template_mut(id)?, list);
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        Ok(())
    }

    /// Removes `name`; removing an absent name is a no-op.
    pub fn remove_name(&mut self, id: &str, list: TemplateList, name: &str) -> Result<(), ApiError> {
        if name.is_empty() {
            return Err(ApiError::Validation("name is required".into()));
        }
        names_mut(self.template_mut(id)?, list).retain(|n| n != name);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    fn session_mut(&mut self, id: &str) -> Result<&mut RawSession, ApiError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))
    }

    /// Sessions in creation order, optionally filtered by status.
    pub fn list_sessions(&self, status: Option<SessionStatus>) -> Vec<RawSession> {
        let mut sessions: Vec<RawSession> = self
            .sessions
            .values()
            .filter(|s| status.map_or(true, |wanted| s.status == wanted))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Creates a session. Startup is synchronous here, so the session is
    /// returned already `ready`.
    pub fn create_session(&mut self, req: CreateSessionRequest) -> Result<RawSession, ApiError> {
        if req.template_id.trim().is_empty() {
            return Err(ApiError::Validation("template_id is required".into()));
        }
        self.template(&req.template_id)?;

        let now = Utc::now();
        let status = SessionStatus::Starting.transition(SessionStatus::Ready)?;
        let session = RawSession {
            id: Uuid::new_v4().to_string(),
            vm_id: req.template_id,
            workspace_id: req.workspace_id,
            base_commit_oid: req.base_commit_oid,
            worktree_path: req.worktree_path,
            status,
            created_at: now,
            closed_at: None,
            last_error: None,
            last_activity_at: Some(now),
        };
        tracing::info!(session_id = %session.id, template_id = %session.vm_id, "session started");
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    pub fn get_session(&self, id: &str) -> Result<RawSession, ApiError> {
        self.sessions
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))
    }

    /// Closes a session. Closing an already terminal session returns it as-is.
    pub fn close_session(&mut self, id: &str, now: DateTime<Utc>) -> Result<RawSession, ApiError> {
        let session = self.session_mut(id)?;
        if !session.status.is_terminal() {
            session.status = session.status.transition(SessionStatus::Closed)?;
            session.closed_at = Some(now);
            tracing::info!(session_id = %id, "session closed");
        }
        Ok(session.clone())
    }

    /// Removes a session and every execution recorded against it.
    pub fn delete_session(&mut self, id: &str) -> Result<(), ApiError> {
        self.sessions
            .remove(id)
            .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))?;
        let executions = &mut self.executions;
        self.execution_order.retain(|exec_id| {
            let owned = executions
                .get(exec_id)
                .is_some_and(|e| e.record.session_id == id);
            if owned {
                executions.remove(exec_id);
            }
            !owned
        });
        tracing::info!(session_id = %id, "session deleted");
        Ok(())
    }

    /// Closes every `ready` session idle for strictly longer than `timeout`.
    /// Returns the ids that were closed.
    pub fn close_idle(&mut self, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        let idle: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Ready)
            .filter(|s| now - s.last_activity_at.unwrap_or(s.created_at) > timeout)
            .map(|s| s.id.clone())
            .collect();
        for id in &idle {
            if let Some(session) = self.sessions.get_mut(id) {
                session.status = SessionStatus::Closed;
                session.closed_at = Some(now);
            }
        }
        idle
    }

    /// Test hook: moves a session's last activity.
    pub fn touch_session(&mut self, id: &str, at: DateTime<Utc>) -> Result<(), ApiError> {
        self.session_mut(id)?.last_activity_at = Some(at);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Evaluates `input` in a `ready` session and records the execution.
    pub fn execute_repl(&mut self, session_id: &str, input: &str) -> Result<RawExecution, ApiError> {
        if session_id.trim().is_empty() || input.trim().is_empty() {
            return Err(ApiError::Validation("session_id and input are required".into()));
        }
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))?;
        if session.status != SessionStatus::Ready {
            return Err(ApiError::SessionNotReady(session_id.to_string()));
        }
        let max_events = self
            .templates
            .get(&session.vm_id)
            .map(|t| t.settings.limits.max_events)
            .unwrap_or(TemplateSettings::default().limits.max_events);

        let started_at = Utc::now();
        let outcome = eval::evaluate(input);
        let (events, truncated) = sequence_events(outcome.events, max_events, started_at);
        let ended_at = Utc::now();

        let (status, error) = match (truncated, outcome.error) {
            (true, _) => (
                ExecutionStatus::Error,
                Some(serde_json::Value::String(format!(
                    "output limit exceeded: more than {} events",
                    max_events
                ))),
            ),
            (false, Some(message)) => (ExecutionStatus::Error, Some(serde_json::Value::String(message))),
            (false, None) => (ExecutionStatus::Ok, None),
        };

        let record = RawExecution {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            kind: RawExecutionKind::Repl,
            input: Some(input.to_string()),
            path: None,
            status,
            started_at,
            ended_at: Some(ended_at),
            result: if truncated { None } else { outcome.result },
            error,
        };
        tracing::debug!(execution_id = %record.id, session_id, status = ?record.status, "repl executed");

        self.session_mut(session_id)?.last_activity_at = Some(ended_at);
        self.execution_order.push(record.id.clone());
        self.executions.insert(
            record.id.clone(),
            StoredExecution {
                record: record.clone(),
                events,
            },
        );
        Ok(record)
    }

    pub fn get_execution(&self, id: &str) -> Result<RawExecution, ApiError> {
        self.executions
            .get(id)
            .map(|e| e.record.clone())
            .ok_or_else(|| ApiError::ExecutionNotFound(id.to_string()))
    }

    /// The `limit` most recent executions of a session, newest first.
    pub fn list_executions(&self, session_id: &str, limit: usize) -> Result<Vec<RawExecution>, ApiError> {
        if !self.sessions.contains_key(session_id) {
            return Err(ApiError::SessionNotFound(session_id.to_string()));
        }
        Ok(self
            .execution_order
            .iter()
            .rev()
            .filter_map(|id| self.executions.get(id))
            .filter(|e| e.record.session_id == session_id)
            .take(limit)
            .map(|e| e.record.clone())
            .collect())
    }

    /// Events with `seq > after_seq`, in sequence order.
    pub fn events(&self, execution_id: &str, after_seq: u64) -> Result<Vec<RawEvent>, ApiError> {
        let stored = self
            .executions
            .get(execution_id)
            .ok_or_else(|| ApiError::ExecutionNotFound(execution_id.to_string()))?;
        Ok(stored
            .events
            .iter()
            .filter(|e| e.seq > after_seq)
            .cloned()
            .collect())
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (self.templates.len(), self.sessions.len(), self.executions.len())
    }
}

fn names_mut(template: &mut Template, list: TemplateList) -> &mut Vec<String> {
    match list {
        TemplateList::Modules => &mut template.exposed_modules,
        TemplateList::Libraries => &mut template.libraries,
    }
}

/// Numbers events from 1. When the evaluator produced more than `max_events`
/// events, keeps the first `max_events - 1` and appends a `system` event
/// describing the cut. Returns the events and whether the cut happened.
fn sequence_events(
    emitted: Vec<eval::Emitted>,
    max_events: f64,
    ts: DateTime<Utc>,
) -> (Vec<RawEvent>, bool) {
    let limit = if max_events.is_finite() && max_events >= 1.0 {
        max_events as usize
    } else {
        1
    };
    let truncated = emitted.len() > limit;
    let keep = if truncated { limit - 1 } else { emitted.len() };

    let mut events: Vec<RawEvent> = emitted
        .into_iter()
        .take(keep)
        .zip(1u64..)
        .map(|(e, seq)| RawEvent {
            seq,
            ts,
            event_type: e.event_type,
            payload: e.payload,
        })
        .collect();
    if truncated {
        events.push(RawEvent {
            seq: events.len() as u64 + 1,
            ts,
            event_type: EventType::System,
            payload: serde_json::json!({
                "message": "event limit reached",
                "max_events": limit,
            }),
        });
    }
    (events, truncated)
}
