//! # Company Registry Lookup
//!
//! Public prefill for the registration form.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::IntoParams;

use rosp_gateway::{CompanyProfile, CompanySummary};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Company name or number fragment.
    pub q: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/registry/search", get(search))
        .route("/v1/registry/companies/{number}", get(company))
}

/// GET /v1/registry/search — Search the company registry.
#[utoipa::path(
    get,
    path = "/v1/registry/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching companies"),
        (status = 422, description = "Empty query", body = crate::error::ErrorBody),
        (status = 502, description = "Registry failed", body = crate::error::ErrorBody),
        (status = 503, description = "Registry not configured", body = crate::error::ErrorBody),
    ),
    tag = "registry"
)]
pub(crate) async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<CompanySummary>>, AppError> {
    let q = query.q.trim();
    if q.len() < 2 {
        return Err(AppError::Validation(
            "query must be at least 2 characters".into(),
        ));
    }
    Ok(Json(state.engine.gateway().registry.search(q).await?))
}

/// GET /v1/registry/companies/{number} — Company profile with officers.
#[utoipa::path(
    get,
    path = "/v1/registry/companies/{number}",
    params(("number" = String, Path, description = "Company number")),
    responses(
        (status = 200, description = "Company profile"),
        (status = 404, description = "No such company", body = crate::error::ErrorBody),
        (status = 502, description = "Registry failed", body = crate::error::ErrorBody),
    ),
    tag = "registry"
)]
pub(crate) async fn company(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<Json<CompanyProfile>, AppError> {
    state
        .engine
        .gateway()
        .registry
        .profile(number.trim())
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("company {number} not found")))
}
