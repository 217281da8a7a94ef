//! Request/response types specific to the mock HTTP layer.
//!
//! Bodies shared with the client live in [`vmsync_core::wire`]; this module
//! only holds query-string shapes and small acknowledgement payloads.
//! Query values arrive as strings and are parsed by the handlers so malformed
//! values produce a `VALIDATION_ERROR` envelope instead of a bare rejection.

use serde::{Deserialize, Serialize};

/// `GET /api/v1/sessions?status=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionListQuery {
    pub status: Option<String>,
}

/// `GET /api/v1/executions?session_id=&limit=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionListQuery {
    pub session_id: Option<String>,
    pub limit: Option<String>,
}

/// `GET /api/v1/executions/{id}/events?after_seq=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsQuery {
    pub after_seq: Option<String>,
}

/// Acknowledges a module or library change.
#[derive(Debug, Clone, Serialize)]
pub struct NameAck {
    pub template_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteAck {
    pub status: &'static str,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
