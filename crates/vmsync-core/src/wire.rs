//! Raw wire records for the `/api/v1` REST contract.
//!
//! Field names match the backend's snake_case JSON. Anything the backend may
//! omit or send malformed is optional here; the normalizer supplies the
//! defaults. The mock backend serializes these same types, so both sides of
//! the contract share one definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{EventType, ExecutionStatus, SessionStatus, StartupMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub exposed_modules: Option<Vec<String>>,
    #[serde(default)]
    pub libraries: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// `GET /api/v1/templates/{id}` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTemplateDetail {
    pub template: RawTemplate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<RawSettings>,
    #[serde(default)]
    pub capabilities: Option<Vec<RawCapability>>,
    #[serde(default)]
    pub startup_files: Option<Vec<RawStartupFile>>,
}

/// Settings sub-objects are kept as loose JSON: any of them may be missing
/// or carry wrongly typed fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCapability {
    pub id: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub config: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStartupFile {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub order_index: i64,
    pub mode: StartupMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSession {
    pub id: String,
    #[serde(alias = "template_id")]
    pub vm_id: String,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default)]
    pub base_commit_oid: String,
    #[serde(default)]
    pub worktree_path: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawExecutionKind {
    Repl,
    RunFile,
    Startup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExecution {
    pub id: String,
    pub session_id: String,
    pub kind: RawExecutionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub seq: u64,
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub payload: Value,
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub engine: String,
}

/// Body for adding a module or library to a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedItemRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub template_id: String,
    pub workspace_id: String,
    pub base_commit_oid: String,
    pub worktree_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplRequest {
    pub session_id: String,
    pub input: String,
}

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

/// Body of every non-2xx response: `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Server error codes the engine reacts to.
pub mod codes {
    pub const TEMPLATE_NOT_FOUND: &str = "TEMPLATE_NOT_FOUND";
    pub const SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
    pub const EXECUTION_NOT_FOUND: &str = "EXECUTION_NOT_FOUND";
    pub const SESSION_NOT_READY: &str = "SESSION_NOT_READY";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const INTERNAL: &str = "INTERNAL";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_accepts_template_id_alias() {
        let raw: RawSession = serde_json::from_value(json!({
            "id": "s-1",
            "template_id": "tpl-1",
            "status": "ready",
            "created_at": "2025-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(raw.vm_id, "tpl-1");
        assert_eq!(raw.workspace_id, "");
        assert!(raw.last_activity_at.is_none());
    }

    #[test]
    fn detail_tolerates_null_lists() {
        let raw: RawTemplateDetail = serde_json::from_value(json!({
            "template": {
                "id": "t",
                "name": "T",
                "created_at": "2025-01-01T00:00:00Z",
                "exposed_modules": null
            },
            "capabilities": null,
            "startup_files": null
        }))
        .unwrap();
        assert!(raw.settings.is_none());
        assert!(raw.capabilities.is_none());
        assert!(raw.template.exposed_modules.is_none());
    }

    #[test]
    fn error_envelope_fields_are_optional() {
        let env: ErrorEnvelope = serde_json::from_value(json!({ "error": {} })).unwrap();
        assert_eq!(env.error, ErrorBody::default());
    }
}
