//! Error types for the client engine.
//!
//! Both types are `Clone`: a single initialization result is handed to every
//! caller that joined it.

use serde_json::Value;
use thiserror::Error;

use vmsync_core::wire::codes;
use vmsync_core::{SessionId, SessionStatus};

/// A failed request, normalized from whatever the transport saw.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (status {status})")]
pub struct TransportError {
    /// HTTP status; `0` when the backend could not be reached.
    pub status: u16,
    pub message: String,
    pub code: Option<String>,
    pub details: Option<Value>,
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        TransportError {
            status: 0,
            message: message.into(),
            code: None,
            details: None,
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No template exists to create a session from.
    #[error("no template available")]
    NoTemplate,

    #[error("template id is required")]
    MissingTemplateId,

    /// The session is not in the local index.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("session {id} is not ready (status: {status})")]
    SessionNotReady { id: SessionId, status: SessionStatus },

    /// The backend answered with a body that does not match the contract.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl EngineError {
    /// True for failures raised locally, before any request was sent.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            EngineError::NoTemplate
                | EngineError::MissingTemplateId
                | EngineError::UnknownSession(_)
                | EngineError::SessionNotReady { .. }
        )
    }

    pub fn is_session_not_found(&self) -> bool {
        matches!(self, EngineError::Transport(t) if t.has_code(codes::SESSION_NOT_FOUND))
    }

    pub fn is_execution_not_found(&self) -> bool {
        matches!(self, EngineError::Transport(t) if t.has_code(codes::EXECUTION_NOT_FOUND))
    }
}
