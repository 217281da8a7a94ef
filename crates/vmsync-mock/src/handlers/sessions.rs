//! Session lifecycle handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;

use vmsync_core::wire::{CreateSessionRequest, RawSession};
use vmsync_core::SessionStatus;

use crate::error::ApiError;
use crate::schema::{DeleteAck, SessionListQuery};
use crate::state::AppState;

/// `GET /api/v1/sessions?status=`
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<Vec<RawSession>>, ApiError> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<SessionStatus>()?),
    };
    Ok(Json(state.backend.lock().await.list_sessions(status)))
}

/// `POST /api/v1/sessions`
pub async fn create_session(
    State(state): State<AppState>,
    payload: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RawSession>), ApiError> {
    let Json(req) = payload?;
    let session = state.backend.lock().await.create_session(req)?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// `GET /api/v1/sessions/{id}`
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RawSession>, ApiError> {
    Ok(Json(state.backend.lock().await.get_session(&id)?))
}

/// `POST /api/v1/sessions/{id}/close`
pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RawSession>, ApiError> {
    Ok(Json(state.backend.lock().await.close_session(&id, Utc::now())?))
}

/// `DELETE /api/v1/sessions/{id}`
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteAck>, ApiError> {
    state.backend.lock().await.delete_session(&id)?;
    Ok(Json(DeleteAck {
        status: "ok",
        session_id: id,
    }))
}
