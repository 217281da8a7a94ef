//! Router assembly for the mock REST API.

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Builds the `/api/v1` router with CORS and tracing layers.
///
/// Routes use axum 0.8 `/{param}` path syntax.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(handlers::health::health))
        // Templates
        .route(
            "/api/v1/templates",
            get(handlers::templates::list_templates).post(handlers::templates::create_template),
        )
        .route("/api/v1/templates/{id}", get(handlers::templates::get_template))
        .route(
            "/api/v1/templates/{id}/modules",
            get(handlers::templates::list_modules).post(handlers::templates::add_module),
        )
        .route(
            "/api/v1/templates/{id}/modules/{name}",
            delete(handlers::templates::remove_module),
        )
        .route(
            "/api/v1/templates/{id}/libraries",
            get(handlers::templates::list_libraries).post(handlers::templates::add_library),
        )
        .route(
            "/api/v1/templates/{id}/libraries/{name}",
            delete(handlers::templates::remove_library),
        )
        // Sessions
        .route(
            "/api/v1/sessions",
            get(handlers::sessions::list_sessions).post(handlers::sessions::create_session),
        )
        .route(
            "/api/v1/sessions/{id}",
            get(handlers::sessions::get_session).delete(handlers::sessions::delete_session),
        )
        .route(
            "/api/v1/sessions/{id}/close",
            post(handlers::sessions::close_session),
        )
        // Executions
        .route("/api/v1/executions", get(handlers::executions::list_executions))
        .route(
            "/api/v1/executions/repl",
            post(handlers::executions::execute_repl),
        )
        .route(
            "/api/v1/executions/{id}",
            get(handlers::executions::get_execution),
        )
        .route(
            "/api/v1/executions/{id}/events",
            get(handlers::executions::list_events),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
