//! Domain model and wire normalization for the vmsync engine.
//!
//! Server-owned entities form a hierarchy: a [`model::Template`] is the
//! blueprint a [`model::Session`] is created from, a session runs
//! [`model::Execution`]s, and every execution records an ordered stream of
//! [`model::Event`]s.
//!
//! - [`wire`]: raw snake_case records exactly as the REST backend speaks them
//! - [`model`]: typed, defaulted domain records
//! - [`normalize`]: pure mapping between the two
//! - [`id`]: identifier newtypes
//! - [`error`]: status parsing and lifecycle errors

pub mod error;
pub mod id;
pub mod model;
pub mod normalize;
pub mod wire;

pub use error::CoreError;
pub use id::{ExecutionId, SessionId, TemplateId};
pub use model::{
    Capability, Event, EventType, Execution, ExecutionKind, ExecutionStatus, Limits, Resolver,
    RuntimeFlags, Session, SessionStatus, StartupFile, StartupMode, Template, TemplateSettings,
};
