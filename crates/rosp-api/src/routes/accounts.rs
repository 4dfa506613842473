//! # Account Profile API
//!
//! Address changes and KYC document replacement. Owner or admin.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::routing::put;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use rosp_core::AccountId;
use rosp_lifecycle::model::{Address, BusinessProfile, DocumentKind, KycDocument};

use crate::auth::{require_access, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, FormParts, Validate};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAddressesRequest {
    #[schema(value_type = Object)]
    pub registered_address: Address,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub trading_address: Option<Address>,
}

impl Validate for UpdateAddressesRequest {
    fn validate(&self) -> Result<(), String> {
        if !self.registered_address.is_complete() {
            return Err("registered address line 1 and postcode are required".into());
        }
        match &self.trading_address {
            Some(trading) if !trading.is_complete() => {
                Err("trading address line 1 and postcode are required when given".into())
            }
            _ => Ok(()),
        }
    }
}

/// Multipart layout of a document replacement.
#[derive(Debug, ToSchema)]
pub struct DocumentUploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/accounts/{id}/addresses", put(update_addresses))
        .route("/v1/accounts/{id}/documents/{kind}", put(replace_document))
}

/// PUT /v1/accounts/{id}/addresses — Replace registered and trading addresses.
#[utoipa::path(
    put,
    path = "/v1/accounts/{id}/addresses",
    params(("id" = uuid::Uuid, Path, description = "Account ID")),
    request_body = UpdateAddressesRequest,
    responses(
        (status = 200, description = "Updated business profile"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Incomplete address", body = crate::error::ErrorBody),
    ),
    tag = "accounts"
)]
pub(crate) async fn update_addresses(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(account_id): Path<AccountId>,
    body: Result<Json<UpdateAddressesRequest>, JsonRejection>,
) -> Result<Json<BusinessProfile>, AppError> {
    require_access(&caller, account_id, "account")?;
    let req = extract_validated_json(body)?;
    let profile = state
        .engine
        .update_addresses(caller.actor(), account_id, req.registered_address, req.trading_address)
        .await?;
    Ok(Json(profile))
}

/// PUT /v1/accounts/{id}/documents/{kind} — Replace a director KYC document.
#[utoipa::path(
    put,
    path = "/v1/accounts/{id}/documents/{kind}",
    params(
        ("id" = uuid::Uuid, Path, description = "Account ID"),
        ("kind" = String, Path, description = "identity_document or address_proof"),
    ),
    request_body(content = DocumentUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Stored document metadata"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Empty, oversized or unsupported file", body = crate::error::ErrorBody),
    ),
    tag = "accounts"
)]
pub(crate) async fn replace_document(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((account_id, kind)): Path<(AccountId, String)>,
    multipart: Multipart,
) -> Result<Json<KycDocument>, AppError> {
    require_access(&caller, account_id, "account")?;
    let kind = DocumentKind::parse(&kind)
        .ok_or_else(|| AppError::NotFound(format!("document kind {kind} not found")))?;
    let mut form = FormParts::read(multipart).await?;
    let upload = form
        .take_file("file")
        .ok_or_else(|| AppError::Validation("missing file part".into()))?;
    let document = state
        .engine
        .reupload_document(caller.actor(), account_id, kind, upload)
        .await?;
    Ok(Json(document))
}
