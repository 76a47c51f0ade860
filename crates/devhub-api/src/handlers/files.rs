use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use devhub_store::{BlobStore, StorageError};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::server::{ApiError, AppState, ErrorBody};

#[derive(Debug, Deserialize, IntoParams)]
pub(crate) struct SignedQuery {
    /// Unix timestamp after which the URL is rejected.
    expires: Option<i64>,
    signature: Option<String>,
}

/// Serves an uploaded file addressed by a URL from `/api/snippets/{id}/file-url`.
#[utoipa::path(
    get,
    path = "/api/files/{bucket}/{key}",
    tag = "files",
    params(
        ("bucket" = String, Path, description = "Storage bucket"),
        ("key" = String, Path, description = "Object key, may contain slashes"),
        SignedQuery
    ),
    responses(
        (status = 200, description = "File contents with their stored content type"),
        (status = 403, description = "Signature invalid or expired", body = ErrorBody),
        (status = 404, description = "File not found", body = ErrorBody)
    )
)]
pub(crate) async fn download_file(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<SignedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let authorized = match (query.expires, query.signature.as_deref()) {
        (Some(expires), Some(signature)) => {
            state.blobs.verify_signed(&bucket, &key, expires, signature)
        }
        _ => false,
    };
    if !authorized {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "download URL is invalid or has expired",
        ));
    }

    let object = state
        .blobs
        .get_object(&bucket, &key)
        .await
        .map_err(StorageError::from)?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("file '{key}' not found")))?;

    Ok((
        [(header::CONTENT_TYPE, object.metadata.content_type)],
        object.bytes,
    ))
}
