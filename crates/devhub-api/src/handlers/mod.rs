//! HTTP handlers, one module per resource. The CRUD shape shared by every
//! collection lives here; resource modules add their filters and docs.

use axum::{http::StatusCode, Json};
use devhub_store::{Record, Repository};

use crate::server::{ApiError, CreatedResponse};

pub(crate) mod files;
pub(crate) mod notes;
pub(crate) mod portfolio;
pub(crate) mod snippets;

pub(crate) async fn list_all<R: Record>(repo: &Repository<R>) -> Result<Json<Vec<R>>, ApiError> {
    Ok(Json(repo.list().await?))
}

pub(crate) async fn fetch_one<R: Record>(
    repo: &Repository<R>,
    id: &str,
) -> Result<Json<R>, ApiError> {
    repo.get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(R::COLLECTION, id))
}

pub(crate) async fn create_one<R: Record>(
    repo: &Repository<R>,
    record: R,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    record.validate()?;
    let id = repo.create(record).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub(crate) async fn replace_one<R: Record>(
    repo: &Repository<R>,
    id: &str,
    record: R,
) -> Result<StatusCode, ApiError> {
    record.validate()?;
    repo.update(id, record).await?;
    Ok(StatusCode::OK)
}

pub(crate) async fn delete_one<R: Record>(
    repo: &Repository<R>,
    id: &str,
) -> Result<StatusCode, ApiError> {
    repo.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
