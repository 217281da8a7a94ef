//! Template handlers: list, create, detail, and module/library sets.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use vmsync_core::wire::{CreateTemplateRequest, NamedItemRequest, RawTemplate, RawTemplateDetail};

use crate::backend::TemplateList;
use crate::error::ApiError;
use crate::schema::NameAck;
use crate::state::AppState;

/// `GET /api/v1/templates`
pub async fn list_templates(State(state): State<AppState>) -> Json<Vec<RawTemplate>> {
    Json(state.backend.lock().await.list_templates())
}

/// `POST /api/v1/templates`
pub async fn create_template(
    State(state): State<AppState>,
    payload: Result<Json<CreateTemplateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RawTemplate>), ApiError> {
    let Json(req) = payload?;
    let created = state.backend.lock().await.create_template(req)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/v1/templates/{id}`
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RawTemplateDetail>, ApiError> {
    Ok(Json(state.backend.lock().await.template_detail(&id)?))
}

async fn list_names(state: AppState, id: String, list: TemplateList) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.backend.lock().await.list_names(&id, list)?))
}

async fn add_name(
    state: AppState,
    id: String,
    list: TemplateList,
    payload: Result<Json<NamedItemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<NameAck>), ApiError> {
    let Json(req) = payload?;
    state.backend.lock().await.add_name(&id, list, &req.name)?;
    Ok((
        StatusCode::CREATED,
        Json(NameAck {
            template_id: id,
            name: req.name.trim().to_string(),
        }),
    ))
}

async fn remove_name(
    state: AppState,
    id: String,
    list: TemplateList,
    name: String,
) -> Result<Json<NameAck>, ApiError> {
    state.backend.lock().await.remove_name(&id, list, &name)?;
    Ok(Json(NameAck {
        template_id: id,
        name,
    }))
}

/// `GET /api/v1/templates/{id}/modules`
pub async fn list_modules(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    list_names(state, id, TemplateList::Modules).await
}

/// `POST /api/v1/templates/{id}/modules`
pub async fn add_module(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<NamedItemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<NameAck>), ApiError> {
    add_name(state, id, TemplateList::Modules, payload).await
}

/// `DELETE /api/v1/templates/{id}/modules/{name}`
pub async fn remove_module(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Result<Json<NameAck>, ApiError> {
    remove_name(state, id, TemplateList::Modules, name).await
}

/// `GET /api/v1/templates/{id}/libraries`
pub async fn list_libraries(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    list_names(state, id, TemplateList::Libraries).await
}

/// `POST /api/v1/templates/{id}/libraries`
pub async fn add_library(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<NamedItemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<NameAck>), ApiError> {
    add_name(state, id, TemplateList::Libraries, payload).await
}

/// `DELETE /api/v1/templates/{id}/libraries/{name}`
pub async fn remove_library(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Result<Json<NameAck>, ApiError> {
    remove_name(state, id, TemplateList::Libraries, name).await
}
