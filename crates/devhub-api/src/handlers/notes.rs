use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use devhub_store::LearningNote;

use super::{create_one, delete_one, fetch_one, list_all, replace_one};
use crate::server::{ApiError, ApiJson, AppState, CreatedResponse, ErrorBody};

#[utoipa::path(
    get,
    path = "/api/notes",
    tag = "notes",
    responses(
        (status = 200, description = "Learning notes, most recent first", body = [LearningNote]),
        (status = 500, description = "Document store failure", body = ErrorBody)
    )
)]
pub(crate) async fn list_notes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<LearningNote>>, ApiError> {
    list_all(&state.notes).await
}

#[utoipa::path(
    get,
    path = "/api/notes/category/{category}",
    tag = "notes",
    params(("category" = String, Path, description = "Exact category to match")),
    responses((status = 200, description = "Notes in the category", body = [LearningNote]))
)]
pub(crate) async fn list_notes_by_category(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> Result<Json<Vec<LearningNote>>, ApiError> {
    Ok(Json(state.notes.list_by_category(&category).await?))
}

#[utoipa::path(
    get,
    path = "/api/notes/{id}",
    tag = "notes",
    params(("id" = String, Path, description = "Note identifier")),
    responses(
        (status = 200, description = "Note details", body = LearningNote),
        (status = 404, description = "Note not found", body = ErrorBody)
    )
)]
pub(crate) async fn get_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LearningNote>, ApiError> {
    fetch_one(&state.notes, &id).await
}

#[utoipa::path(
    post,
    path = "/api/notes",
    tag = "notes",
    request_body = LearningNote,
    responses(
        (status = 201, description = "Note created", body = CreatedResponse),
        (status = 400, description = "Missing title or content, or difficultyLevel outside 1..=5", body = ErrorBody)
    )
)]
pub(crate) async fn create_note(
    State(state): State<Arc<AppState>>,
    ApiJson(note): ApiJson<LearningNote>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    create_one(&state.notes, note).await
}

#[utoipa::path(
    put,
    path = "/api/notes/{id}",
    tag = "notes",
    params(("id" = String, Path, description = "Note identifier")),
    request_body = LearningNote,
    responses(
        (status = 200, description = "Note replaced"),
        (status = 400, description = "Invalid note", body = ErrorBody)
    )
)]
pub(crate) async fn update_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(note): ApiJson<LearningNote>,
) -> Result<StatusCode, ApiError> {
    replace_one(&state.notes, &id, note).await
}

#[utoipa::path(
    delete,
    path = "/api/notes/{id}",
    tag = "notes",
    params(("id" = String, Path, description = "Note identifier")),
    responses((status = 204, description = "Note deleted or already absent"))
)]
pub(crate) async fn delete_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    delete_one(&state.notes, &id).await
}
