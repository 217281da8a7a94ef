//! Client-local persistence for vmsync.
//!
//! The backend owns templates, sessions and executions. The only state kept
//! on the client side is the identity overlay: user-assigned session names
//! and the current-session pointer. This crate provides:
//!
//! - [`traits`]: the [`KeyValueStore`] contract
//! - [`memory`]: [`InMemoryStore`], for tests and ephemeral runs
//! - [`sqlite`]: [`SqliteStore`], a single-table SQLite backend
//! - [`schema`]: connection setup and embedded migrations
//! - [`overlay`]: [`IdentityOverlay`], the typed view over either backend
//! - [`error`]: [`StorageError`]

pub mod error;
pub mod memory;
pub mod overlay;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use memory::InMemoryStore;
pub use overlay::{IdentityOverlay, CURRENT_SESSION_KEY, SESSION_NAMES_KEY};
pub use sqlite::SqliteStore;
pub use traits::KeyValueStore;
