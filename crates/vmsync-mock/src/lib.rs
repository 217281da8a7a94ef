//! In-memory mock of the VM execution backend.
//!
//! Speaks the same `/api/v1` REST contract as the real backend so the client
//! engine can be exercised end to end without one. Sessions start `ready`,
//! REPL input runs through a tiny evaluator ([`eval`]), and an
//! [`sweeper::IdleSweeper`] closes sessions that have been idle too long.

pub mod backend;
pub mod config;
pub mod error;
pub mod eval;
pub mod handlers;
pub mod router;
pub mod schema;
pub mod state;
pub mod sweeper;
