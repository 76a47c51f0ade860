use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use devhub_store::{CodeSnippet, Record, Upload, ValidationError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use super::{create_one, fetch_one, list_all, replace_one};
use crate::server::{ApiError, ApiJson, AppState, CreatedResponse, ErrorBody};

pub(crate) const UPLOAD_FOLDER: &str = "snippets";
pub(crate) const DEFAULT_URL_MINUTES: u64 = 15;
pub(crate) const MAX_URL_MINUTES: u64 = 7 * 24 * 60;

#[utoipa::path(
    get,
    path = "/api/snippets",
    tag = "snippets",
    responses(
        (status = 200, description = "Snippets, newest first", body = [CodeSnippet]),
        (status = 500, description = "Document store failure", body = ErrorBody)
    )
)]
pub(crate) async fn list_snippets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CodeSnippet>>, ApiError> {
    list_all(&state.snippets).await
}

#[utoipa::path(
    get,
    path = "/api/snippets/public",
    tag = "snippets",
    responses((status = 200, description = "Snippets flagged public", body = [CodeSnippet]))
)]
pub(crate) async fn list_public_snippets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CodeSnippet>>, ApiError> {
    Ok(Json(state.snippets.list_public().await?))
}

#[utoipa::path(
    get,
    path = "/api/snippets/language/{language}",
    tag = "snippets",
    params(("language" = String, Path, description = "Exact language to match")),
    responses((status = 200, description = "Snippets in the language", body = [CodeSnippet]))
)]
pub(crate) async fn list_snippets_by_language(
    State(state): State<Arc<AppState>>,
    Path(language): Path<String>,
) -> Result<Json<Vec<CodeSnippet>>, ApiError> {
    Ok(Json(state.snippets.list_by_language(&language).await?))
}

#[utoipa::path(
    get,
    path = "/api/snippets/tag/{tag}",
    tag = "snippets",
    params(("tag" = String, Path, description = "Tag the snippet must carry")),
    responses((status = 200, description = "Snippets carrying the tag", body = [CodeSnippet]))
)]
pub(crate) async fn list_snippets_by_tag(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> Result<Json<Vec<CodeSnippet>>, ApiError> {
    Ok(Json(state.snippets.list_by_tag(&tag).await?))
}

#[utoipa::path(
    get,
    path = "/api/snippets/{id}",
    tag = "snippets",
    params(("id" = String, Path, description = "Snippet identifier")),
    responses(
        (status = 200, description = "Snippet details", body = CodeSnippet),
        (status = 404, description = "Snippet not found", body = ErrorBody)
    )
)]
pub(crate) async fn get_snippet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CodeSnippet>, ApiError> {
    fetch_one(&state.snippets, &id).await
}

#[utoipa::path(
    post,
    path = "/api/snippets",
    tag = "snippets",
    request_body = CodeSnippet,
    responses(
        (status = 201, description = "Snippet created; createdAt and updatedAt are stamped", body = CreatedResponse),
        (status = 400, description = "Missing title, code or language", body = ErrorBody)
    )
)]
pub(crate) async fn create_snippet(
    State(state): State<Arc<AppState>>,
    ApiJson(snippet): ApiJson<CodeSnippet>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    create_one(&state.snippets, snippet).await
}

#[utoipa::path(
    put,
    path = "/api/snippets/{id}",
    tag = "snippets",
    params(("id" = String, Path, description = "Snippet identifier")),
    request_body = CodeSnippet,
    responses(
        (status = 200, description = "Snippet replaced; updatedAt is restamped"),
        (status = 400, description = "Missing title, code or language", body = ErrorBody)
    )
)]
pub(crate) async fn update_snippet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(snippet): ApiJson<CodeSnippet>,
) -> Result<StatusCode, ApiError> {
    replace_one(&state.snippets, &id, snippet).await
}

/// Deletes the snippet and, when it references one, its uploaded file. A
/// failed blob delete is logged and does not block the record delete.
#[utoipa::path(
    delete,
    path = "/api/snippets/{id}",
    tag = "snippets",
    params(("id" = String, Path, description = "Snippet identifier")),
    responses((status = 204, description = "Snippet and its file deleted, or already absent"))
)]
pub(crate) async fn delete_snippet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let locator = state
        .snippets
        .get_by_id(&id)
        .await?
        .and_then(|snippet| snippet.blob_locator);

    if let Some(locator) = locator {
        if let Err(error) = state.storage.delete(&locator).await {
            warn!(%error, %locator, snippet = %id, "failed to delete snippet file");
        }
    }

    state.snippets.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Multipart form accepted by the upload route.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub(crate) struct UploadSnippetForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    title: String,
    language: String,
    /// Repeat the field or separate values with commas.
    tags: Option<Vec<String>>,
    category: Option<String>,
    is_public: Option<bool>,
}

#[utoipa::path(
    post,
    path = "/api/snippets/upload",
    tag = "snippets",
    request_body(content = UploadSnippetForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored and snippet created", body = CreatedResponse),
        (status = 400, description = "Missing file, title or language", body = ErrorBody),
        (status = 413, description = "Upload exceeds the configured limit", body = ErrorBody)
    )
)]
pub(crate) async fn upload_snippet(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let form = UploadForm::read(multipart).await?;
    let file = form.file.ok_or(ValidationError::MissingField("file"))?;
    if file.bytes.is_empty() {
        return Err(ValidationError::MissingField("file").into());
    }

    let mut snippet = CodeSnippet {
        title: form.title.unwrap_or_default(),
        code: String::from_utf8_lossy(&file.bytes).into_owned(),
        language: form.language.unwrap_or_default(),
        tags: form.tags,
        category: form.category,
        is_public: form.is_public,
        ..CodeSnippet::default()
    };
    snippet.validate()?;

    let locator = state
        .storage
        .upload(
            Upload {
                bytes: &file.bytes,
                content_type: file.content_type.as_deref(),
                original_filename: file.filename.as_deref(),
            },
            UPLOAD_FOLDER,
        )
        .await?;
    snippet.blob_locator = Some(locator.clone());

    match state.snippets.create(snippet).await {
        Ok(id) => {
            info!(snippet = %id, %locator, "snippet uploaded");
            Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
        }
        Err(error) => {
            warn!(%locator, "snippet create failed after upload; file is orphaned");
            Err(error.into())
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub(crate) struct FileUrlQuery {
    /// Minutes the URL stays valid (1 to 10080, default 15).
    minutes: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignedUrlResponse {
    pub signed_url: String,
    pub expires_in_minutes: u64,
}

#[utoipa::path(
    get,
    path = "/api/snippets/{id}/file-url",
    tag = "snippets",
    params(("id" = String, Path, description = "Snippet identifier"), FileUrlQuery),
    responses(
        (status = 200, description = "Time-limited download URL", body = SignedUrlResponse),
        (status = 400, description = "minutes out of range", body = ErrorBody),
        (status = 404, description = "Snippet missing or has no file", body = ErrorBody)
    )
)]
pub(crate) async fn snippet_file_url(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<FileUrlQuery>,
) -> Result<Json<SignedUrlResponse>, ApiError> {
    let minutes = query.minutes.unwrap_or(DEFAULT_URL_MINUTES);
    if !(1..=MAX_URL_MINUTES).contains(&minutes) {
        return Err(ValidationError::OutOfRange {
            field: "minutes",
            min: 1,
            max: MAX_URL_MINUTES as i64,
            value: i64::try_from(minutes).unwrap_or(i64::MAX),
        }
        .into());
    }

    let snippet = state
        .snippets
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(CodeSnippet::COLLECTION, &id))?;
    let locator = snippet.blob_locator.ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            format!("snippet '{id}' has no uploaded file"),
        )
    })?;

    let signed_url = state.storage.signed_url(&locator, minutes)?;
    Ok(Json(SignedUrlResponse {
        signed_url,
        expires_in_minutes: minutes,
    }))
}

#[derive(Debug)]
struct FilePart {
    bytes: Bytes,
    content_type: Option<String>,
    filename: Option<String>,
}

#[derive(Debug, Default)]
struct UploadForm {
    file: Option<FilePart>,
    title: Option<String>,
    language: Option<String>,
    tags: Vec<String>,
    category: Option<String>,
    is_public: bool,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("file") => {
                    let filename = field.file_name().map(str::to_string);
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await.map_err(multipart_error)?;
                    form.file = Some(FilePart {
                        bytes,
                        content_type,
                        filename,
                    });
                }
                Some("title") => form.title = Some(field.text().await.map_err(multipart_error)?),
                Some("language") => {
                    form.language = Some(field.text().await.map_err(multipart_error)?)
                }
                Some("category") => {
                    let text = field.text().await.map_err(multipart_error)?;
                    form.category = Some(text).filter(|value| !value.trim().is_empty());
                }
                Some("tags") => {
                    let text = field.text().await.map_err(multipart_error)?;
                    form.tags.extend(split_tags(&text));
                }
                Some("isPublic") => {
                    let text = field.text().await.map_err(multipart_error)?;
                    form.is_public = parse_flag(&text).ok_or_else(|| {
                        ApiError::bad_request(format!("isPublic must be true or false, got '{text}'"))
                    })?;
                }
                _ => {}
            }
        }
        Ok(form)
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::new(err.status(), err.body_text())
}

fn split_tags(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Some(false),
        "1" | "true" | "yes" | "on" => Some(true),
        _ => None,
    }
}
