//! Client-side synchronization engine for the VM execution backend.
//!
//! An [`Engine`] keeps a local, normalized view of templates, sessions and
//! executions consistent with the backend's `/api/v1` REST API. Reads are
//! served from a tagged [`QueryCache`]; writes invalidate the tags they touch.
//! Session display names and the current-session pointer live in an
//! [`vmsync_storage::IdentityOverlay`] that survives restarts.

pub mod cache;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod registry;
pub mod tracker;
pub mod transport;

pub use cache::{Kind, QueryCache, Tag};
pub use config::ClientConfig;
pub use directory::SessionDirectory;
pub use engine::{Engine, InitSummary, DEFAULT_SESSION_NAME};
pub use error::{EngineError, TransportError};
pub use registry::{diff_names, DefaultTemplate, TemplateRegistry, TemplateResource, DEFAULT_TEMPLATES};
pub use tracker::{ExecutionTracker, DEFAULT_HISTORY_LIMIT};
pub use transport::{ApiRequest, HttpTransport, Method, Transport};
