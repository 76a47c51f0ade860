use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use devhub_store::PortfolioLink;

use super::{create_one, delete_one, fetch_one, list_all, replace_one};
use crate::server::{ApiError, ApiJson, AppState, CreatedResponse, ErrorBody};

#[utoipa::path(
    get,
    path = "/api/portfolio",
    tag = "portfolio",
    responses(
        (status = 200, description = "Portfolio links ordered by position", body = [PortfolioLink]),
        (status = 500, description = "Document store failure", body = ErrorBody)
    )
)]
pub(crate) async fn list_links(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PortfolioLink>>, ApiError> {
    list_all(&state.portfolio).await
}

#[utoipa::path(
    get,
    path = "/api/portfolio/category/{category}",
    tag = "portfolio",
    params(("category" = String, Path, description = "Exact category to match")),
    responses(
        (status = 200, description = "Links in the category", body = [PortfolioLink]),
        (status = 500, description = "Document store failure", body = ErrorBody)
    )
)]
pub(crate) async fn list_links_by_category(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> Result<Json<Vec<PortfolioLink>>, ApiError> {
    Ok(Json(state.portfolio.list_by_category(&category).await?))
}

#[utoipa::path(
    get,
    path = "/api/portfolio/{id}",
    tag = "portfolio",
    params(("id" = String, Path, description = "Link identifier")),
    responses(
        (status = 200, description = "Link details", body = PortfolioLink),
        (status = 404, description = "Link not found", body = ErrorBody)
    )
)]
pub(crate) async fn get_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PortfolioLink>, ApiError> {
    fetch_one(&state.portfolio, &id).await
}

#[utoipa::path(
    post,
    path = "/api/portfolio",
    tag = "portfolio",
    request_body = PortfolioLink,
    responses(
        (status = 201, description = "Link created", body = CreatedResponse),
        (status = 400, description = "Missing title, url or order", body = ErrorBody)
    )
)]
pub(crate) async fn create_link(
    State(state): State<Arc<AppState>>,
    ApiJson(link): ApiJson<PortfolioLink>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    create_one(&state.portfolio, link).await
}

#[utoipa::path(
    put,
    path = "/api/portfolio/{id}",
    tag = "portfolio",
    params(("id" = String, Path, description = "Link identifier")),
    request_body = PortfolioLink,
    responses(
        (status = 200, description = "Link replaced; omitted fields are cleared"),
        (status = 400, description = "Missing title, url or order", body = ErrorBody)
    )
)]
pub(crate) async fn update_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(link): ApiJson<PortfolioLink>,
) -> Result<StatusCode, ApiError> {
    replace_one(&state.portfolio, &id, link).await
}

#[utoipa::path(
    delete,
    path = "/api/portfolio/{id}",
    tag = "portfolio",
    params(("id" = String, Path, description = "Link identifier")),
    responses((status = 204, description = "Link deleted or already absent"))
)]
pub(crate) async fn delete_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    delete_one(&state.portfolio, &id).await
}
