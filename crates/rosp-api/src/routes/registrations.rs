//! # Registration API
//!
//! Public, unauthenticated: the signup form posts here before any account
//! exists. Submission is rate limited per source address.

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use rosp_lifecycle::{RegistrationPayload, RegistrationReceipt, RegistrationRequest};

use crate::error::AppError;
use crate::extractors::FormParts;
use crate::middleware::rate_limit::SourceAddress;
use crate::state::AppState;

/// Multipart layout of a registration submission.
#[derive(Debug, ToSchema)]
pub struct RegistrationForm {
    /// JSON-encoded registration payload (account, company, director,
    /// agreement signature).
    pub payload: String,
    /// Director identity document (PDF, JPEG or PNG).
    #[schema(value_type = String, format = Binary)]
    pub identity_document: Vec<u8>,
    /// Director proof of address (PDF, JPEG or PNG).
    #[schema(value_type = String, format = Binary)]
    pub address_proof: Vec<u8>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AvailabilityQuery {
    pub email: String,
    pub company_number: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub email_taken: bool,
    pub company_taken: bool,
    pub available: bool,
}

/// The submission route, which carries the rate limit.
pub fn submit_router() -> Router<AppState> {
    Router::new().route("/v1/registrations", post(register))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/registrations/availability", get(availability))
}

/// POST /v1/registrations — Create account, profile, director, agreement
/// and draft subscription in one unit of work.
#[utoipa::path(
    post,
    path = "/v1/registrations",
    request_body(content = RegistrationForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Registration committed; see sideEffects for degraded follow-ups"),
        (status = 400, description = "Malformed form", body = crate::error::ErrorBody),
        (status = 409, description = "Email or company number already registered", body = crate::error::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::error::ErrorBody),
        (status = 429, description = "Too many registrations from this address", body = crate::error::ErrorBody),
    ),
    tag = "registrations"
)]
pub(crate) async fn register(
    State(state): State<AppState>,
    Extension(SourceAddress(source)): Extension<SourceAddress>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<RegistrationReceipt>), AppError> {
    let mut form = FormParts::read(multipart).await?;
    let raw = form
        .text("payload")
        .ok_or_else(|| AppError::BadRequest("missing payload field".into()))?;
    let payload: RegistrationPayload = serde_json::from_str(raw)
        .map_err(|e| AppError::BadRequest(format!("invalid payload: {e}")))?;

    let request = RegistrationRequest {
        payload,
        identity_document: form.take_file("identity_document"),
        address_proof: form.take_file("address_proof"),
        origin_address: (source != "unknown").then_some(source),
    };
    let receipt = state.engine.register(request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /v1/registrations/availability — Pre-submit duplicate check.
#[utoipa::path(
    get,
    path = "/v1/registrations/availability",
    params(AvailabilityQuery),
    responses(
        (status = 200, description = "Availability of the email and company number", body = AvailabilityResponse),
        (status = 422, description = "Malformed email or company number", body = crate::error::ErrorBody),
    ),
    tag = "registrations"
)]
pub(crate) async fn availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let result = state
        .engine
        .check_availability(&query.email, &query.company_number)
        .await?;
    Ok(Json(AvailabilityResponse {
        email_taken: result.email_taken,
        company_taken: result.company_taken,
        available: result.is_available(),
    }))
}
