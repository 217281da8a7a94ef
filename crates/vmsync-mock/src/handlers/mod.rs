//! HTTP handler modules for the mock API.
//!
//! Handlers parse the request, lock the [`crate::backend::Backend`], call one
//! method and serialize the result.

pub mod executions;
pub mod health;
pub mod sessions;
pub mod templates;
