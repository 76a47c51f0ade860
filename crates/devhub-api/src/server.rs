use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use devhub_store::{
    Database, DocumentStore, LocalBlobStore, NoteRepository, PortfolioRepository,
    SnippetRepository, StorageAdapter, StorageError, StoreError, UrlSigner, ValidationError,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::handlers::{files, notes, portfolio, snippets};

pub async fn run() -> Result<()> {
    let config = AppConfig::from_env()?;
    info!(?config, "loaded configuration");

    let db = Database::connect(&config.db_url)
        .await
        .with_context(|| format!("failed to open document store at {}", config.db_url))?;

    let signer = UrlSigner::new(config.signing_key.clone()).context("invalid signing key")?;
    let blobs = Arc::new(LocalBlobStore::new(
        config.blob_root.clone(),
        config.public_url.clone(),
        signer,
    ));

    let state = Arc::new(AppState::new(Arc::new(db), blobs, config.bucket.clone()));
    let bucket = state.storage.bucket().to_string();
    let app = build_router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listen socket")?;

    info!(addr = %config.listen_addr, %bucket, "devhub-api listening");
    axum::serve(listener, app)
        .await
        .context("HTTP server exited")?;
    Ok(())
}

pub fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/portfolio",
            get(portfolio::list_links).post(portfolio::create_link),
        )
        .route(
            "/api/portfolio/category/:category",
            get(portfolio::list_links_by_category),
        )
        .route(
            "/api/portfolio/:id",
            get(portfolio::get_link)
                .put(portfolio::update_link)
                .delete(portfolio::delete_link),
        )
        .route(
            "/api/snippets",
            get(snippets::list_snippets).post(snippets::create_snippet),
        )
        .route("/api/snippets/public", get(snippets::list_public_snippets))
        .route(
            "/api/snippets/language/:language",
            get(snippets::list_snippets_by_language),
        )
        .route("/api/snippets/tag/:tag", get(snippets::list_snippets_by_tag))
        .route(
            "/api/snippets/upload",
            post(snippets::upload_snippet).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(
            "/api/snippets/:id",
            get(snippets::get_snippet)
                .put(snippets::update_snippet)
                .delete(snippets::delete_snippet),
        )
        .route("/api/snippets/:id/file-url", get(snippets::snippet_file_url))
        .route(
            "/api/notes",
            get(notes::list_notes).post(notes::create_note),
        )
        .route(
            "/api/notes/category/:category",
            get(notes::list_notes_by_category),
        )
        .route(
            "/api/notes/:id",
            get(notes::get_note)
                .put(notes::update_note)
                .delete(notes::delete_note),
        )
        .route("/api/files/:bucket/*key", get(files::download_file))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Handles shared by every request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub(crate) portfolio: PortfolioRepository,
    pub(crate) snippets: SnippetRepository,
    pub(crate) notes: NoteRepository,
    pub(crate) storage: StorageAdapter,
    pub(crate) blobs: Arc<LocalBlobStore>,
}

impl AppState {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<LocalBlobStore>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            portfolio: PortfolioRepository::new(documents.clone()),
            snippets: SnippetRepository::new(documents.clone()),
            notes: NoteRepository::new(documents),
            storage: StorageAdapter::new(blobs.clone(), bucket),
            blobs,
        }
    }
}

#[utoipa::path(
    get,
    path = "/healthz",
    tag = "health",
    responses((status = 200, description = "Service is healthy"))
)]
async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// JSON request body whose rejections use the [`ErrorBody`] shape.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatedResponse {
    pub id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    error: String,
}

/// Error returned by every handler. `detail` is logged and never sent to
/// the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
}

impl ApiError {
    pub(crate) fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub(crate) fn not_found(collection: &str, id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("no record '{id}' in {collection}"),
        )
    }

    fn internal<E: std::fmt::Display>(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal server error".to_string(),
            detail: Some(err.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::internal(err)
    }
}

// Storage errors only arise from locators the service wrote itself, so a
// failure here is server-side.
impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::internal(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(
                status = %self.status,
                message = %self.message,
                detail = self.detail.as_deref().unwrap_or_default(),
                "api error"
            );
        } else {
            warn!(status = %self.status, message = %self.message, "request rejected");
        }
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

pub mod docs {
    use super::*;
    use crate::handlers::snippets::{SignedUrlResponse, UploadSnippetForm};
    use devhub_store::{CodeSnippet, LearningNote, PortfolioLink};
    use utoipa::OpenApi;

    #[derive(OpenApi)]
    #[openapi(
        info(title = "DevHub API", version = "0.1.0"),
        paths(
            healthz,
            portfolio::list_links,
            portfolio::list_links_by_category,
            portfolio::get_link,
            portfolio::create_link,
            portfolio::update_link,
            portfolio::delete_link,
            snippets::list_snippets,
            snippets::list_public_snippets,
            snippets::list_snippets_by_language,
            snippets::list_snippets_by_tag,
            snippets::get_snippet,
            snippets::create_snippet,
            snippets::update_snippet,
            snippets::delete_snippet,
            snippets::upload_snippet,
            snippets::snippet_file_url,
            notes::list_notes,
            notes::list_notes_by_category,
            notes::get_note,
            notes::create_note,
            notes::update_note,
            notes::delete_note,
            files::download_file
        ),
        components(schemas(
            PortfolioLink,
            CodeSnippet,
            LearningNote,
            CreatedResponse,
            ErrorBody,
            SignedUrlResponse,
            UploadSnippetForm
        )),
        tags(
            (name = "portfolio", description = "Portfolio links"),
            (name = "snippets", description = "Code snippets and uploaded files"),
            (name = "notes", description = "Learning notes"),
            (name = "files", description = "Signed file downloads"),
            (name = "health", description = "Liveness")
        )
    )]
    pub struct ApiDoc;
}
