//! Execution handlers: REPL submission, listing, detail and event pages.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use vmsync_core::wire::{RawEvent, RawExecution, ReplRequest};

use crate::error::ApiError;
use crate::schema::{EventsQuery, ExecutionListQuery};
use crate::state::AppState;

/// Page size used when `limit` is omitted.
pub const DEFAULT_EXECUTION_LIMIT: usize = 50;

/// `POST /api/v1/executions/repl`
pub async fn execute_repl(
    State(state): State<AppState>,
    payload: Result<Json<ReplRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RawExecution>), ApiError> {
    let Json(req) = payload?;
    let execution = state
        .backend
        .lock()
        .await
        .execute_repl(&req.session_id, &req.input)?;
    Ok((StatusCode::CREATED, Json(execution)))
}

/// `GET /api/v1/executions?session_id=&limit=`
pub async fn list_executions(
    State(state): State<AppState>,
    Query(query): Query<ExecutionListQuery>,
) -> Result<Json<Vec<RawExecution>>, ApiError> {
    let session_id = query
        .session_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("session_id query param is required".into()))?;
    let limit = match query.limit.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_EXECUTION_LIMIT,
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ApiError::Validation("limit must be a positive integer".into()))?,
    };
    Ok(Json(
        state.backend.lock().await.list_executions(&session_id, limit)?,
    ))
}

/// `GET /api/v1/executions/{id}`
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RawExecution>, ApiError> {
    Ok(Json(state.backend.lock().await.get_execution(&id)?))
}

/// `GET /api/v1/executions/{id}/events?after_seq=`
pub async fn list_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<RawEvent>>, ApiError> {
    let after_seq = match query.after_seq.as_deref().map(str::trim) {
        None | Some("") => 0,
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            ApiError::Validation("after_seq must be a non-negative integer".into())
        })?,
    };
    Ok(Json(state.backend.lock().await.events(&id, after_seq)?))
}
