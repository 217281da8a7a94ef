//! Domain records produced by the normalizer.
//!
//! These are the typed, fully defaulted shapes callers consume. They serialize
//! in camelCase; the snake_case wire shapes live in [`crate::wire`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::id::{ExecutionId, SessionId, TemplateId};

/// A configuration blueprint sessions are created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub engine: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// Exposed native modules. Order is not meaningful; no duplicates.
    pub exposed_modules: Vec<String>,
    /// Global libraries loaded at session start. Order is not meaningful; no duplicates.
    pub libraries: Vec<String>,
    pub settings: TemplateSettings,
    pub capabilities: Vec<Capability>,
    /// Ordered by `order_index`.
    pub startup_files: Vec<StartupFile>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateSettings {
    pub limits: Limits,
    pub resolver: Resolver,
    pub runtime: RuntimeFlags,
}

/// Resource limits applied to every execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub cpu_ms: f64,
    pub wall_ms: f64,
    pub mem_mb: f64,
    pub max_events: f64,
    pub max_output_kb: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            cpu_ms: 2000.0,
            wall_ms: 5000.0,
            mem_mb: 128.0,
            max_events: 50000.0,
            max_output_kb: 256.0,
        }
    }
}

/// Module resolution configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolver {
    pub roots: Vec<String>,
    pub extensions: Vec<String>,
    pub allow_absolute_repo_imports: bool,
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver {
            roots: vec![".".to_string()],
            extensions: vec![".js".to_string(), ".mjs".to_string()],
            allow_absolute_repo_imports: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuntimeFlags {
    pub esm: bool,
    pub strict: bool,
    pub console: bool,
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        RuntimeFlags {
            esm: true,
            strict: true,
            console: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub enabled: bool,
    pub config: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupFile {
    pub id: String,
    pub path: String,
    pub order_index: i64,
    pub mode: StartupMode,
}

/// How a startup file is loaded into a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupMode {
    /// Evaluated inline as a script.
    Eval,
    /// Imported as an ES module.
    Import,
}

/// A runtime instance derived from one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    /// Owning template. Immutable after creation.
    pub vm_id: TemplateId,
    pub workspace_id: String,
    #[serde(rename = "baseCommitOID")]
    pub base_commit_oid: String,
    pub worktree_path: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_activity_at: DateTime<Utc>,
    /// Overlay override, else synthesized from template name and id prefix.
    pub name: String,
}

/// Session lifecycle: `starting -> ready -> {crashed | closed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Starting,
    Ready,
    Crashed,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Starting => "starting",
            SessionStatus::Ready => "ready",
            SessionStatus::Crashed => "crashed",
            SessionStatus::Closed => "closed",
        }
    }

    /// `crashed` and `closed` have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Crashed | SessionStatus::Closed)
    }

    /// Validates a lifecycle step, returning the new status.
    ///
    /// `starting` may move to any later state; `ready` may move to `crashed`
    /// or `closed`. Re-entering the current state is accepted so repeated
    /// closes stay idempotent.
    pub fn transition(self, to: SessionStatus) -> Result<SessionStatus, CoreError> {
        use SessionStatus::*;
        match (self, to) {
            (from, to) if from == to => Ok(to),
            (Starting, Ready | Crashed | Closed) => Ok(to),
            (Ready, Crashed | Closed) => Ok(to),
            (from, to) => Err(CoreError::IllegalTransition { from, to }),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starting" => Ok(SessionStatus::Starting),
            "ready" => Ok(SessionStatus::Ready),
            "crashed" => Ok(SessionStatus::Crashed),
            "closed" => Ok(SessionStatus::Closed),
            _ => Err(CoreError::UnknownSessionStatus(s.to_string())),
        }
    }
}

/// One code-evaluation request against a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: ExecutionId,
    pub session_id: SessionId,
    pub kind: ExecutionKind,
    pub input: Option<String>,
    pub path: Option<String>,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
    /// Strictly increasing by `seq`.
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionKind {
    Repl,
    RunFile,
    Startup,
}

/// Execution status; terminal once not `running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Ok,
    Error,
    Timeout,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl FromStr for ExecutionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => Ok(ExecutionStatus::Running),
            "ok" => Ok(ExecutionStatus::Ok),
            "error" => Ok(ExecutionStatus::Error),
            "timeout" => Ok(ExecutionStatus::Timeout),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            _ => Err(CoreError::UnknownExecutionStatus(s.to_string())),
        }
    }
}

/// A single timestamped occurrence within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: u64,
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    InputEcho,
    Console,
    Value,
    Exception,
    Stdout,
    Stderr,
    System,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_lifecycle_is_linear() {
        use SessionStatus::*;
        assert_eq!(Starting.transition(Ready), Ok(Ready));
        assert_eq!(Ready.transition(Closed), Ok(Closed));
        assert_eq!(Ready.transition(Crashed), Ok(Crashed));
        assert_eq!(Closed.transition(Closed), Ok(Closed));
        assert!(Closed.transition(Ready).is_err());
        assert!(Crashed.transition(Closed).is_err());
        assert!(Ready.transition(Starting).is_err());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("READY".parse::<SessionStatus>(), Ok(SessionStatus::Ready));
        assert!("paused".parse::<SessionStatus>().is_err());
        assert_eq!(
            "timeout".parse::<ExecutionStatus>(),
            Ok(ExecutionStatus::Timeout)
        );
    }

    #[test]
    fn run_file_kind_serializes_with_hyphen() {
        let json = serde_json::to_string(&ExecutionKind::RunFile).unwrap();
        assert_eq!(json, "\"run-file\"");
    }
}
