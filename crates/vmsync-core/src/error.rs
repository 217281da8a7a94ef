//! Core error types for vmsync-core.

use thiserror::Error;

use crate::model::SessionStatus;

/// Errors produced by the core data model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A status string did not name a known session status.
    #[error("unknown session status: '{0}'")]
    UnknownSessionStatus(String),

    /// A status string did not name a known execution status.
    #[error("unknown execution status: '{0}'")]
    UnknownExecutionStatus(String),

    /// The session lifecycle does not allow this transition.
    #[error("illegal session transition: {from} -> {to}")]
    IllegalTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
}
