//! # Admin API
//!
//! Operator-only endpoints: subscription actions, the renewal sweep trigger,
//! audit chain verification, and agreement template publishing.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use rosp_core::{AccountId, SubscriptionId, Timestamp};
use rosp_lifecycle::model::{AgreementTemplate, AuditEntry};
use rosp_lifecycle::{ActionOutcome, ChainVerification, SweepReport};
use rosp_state::AdminAction;

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ActionRequest {
    /// APPROVE, REJECT, SUSPEND, REACTIVATE or CANCEL.
    pub action: String,
    /// Required for REJECT and SUSPEND.
    #[serde(default)]
    pub reason: Option<String>,
    /// Internal note, kept in the audit trail only.
    #[serde(default)]
    pub notes: Option<String>,
}

impl Validate for ActionRequest {
    fn validate(&self) -> Result<(), String> {
        if self.reason.as_ref().is_some_and(|r| r.len() > 2000) {
            return Err("reason must not exceed 2000 characters".into());
        }
        if self.notes.as_ref().is_some_and(|n| n.len() > 4000) {
            return Err("notes must not exceed 4000 characters".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PublishTemplateRequest {
    pub title: String,
}

impl Validate for PublishTemplateRequest {
    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".into());
        }
        if self.title.len() > 255 {
            return Err("title must not exceed 255 characters".into());
        }
        Ok(())
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/subscriptions/{id}/actions", post(perform_action))
        .route("/v1/admin/renewals/sweep", post(run_sweep))
        .route("/v1/admin/audit/verify", get(verify_audit))
        .route("/v1/admin/accounts/{id}/audit", get(account_audit))
        .route("/v1/admin/templates", get(list_templates).post(publish_template))
}

/// POST /v1/admin/subscriptions/{id}/actions — Apply an admin action.
#[utoipa::path(
    post,
    path = "/v1/admin/subscriptions/{id}/actions",
    params(("id" = uuid::Uuid, Path, description = "Subscription ID")),
    request_body = ActionRequest,
    responses(
        (status = 200, description = "Action applied; refund and email outcomes in sideEffects"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Action not allowed from the current status", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown action or missing reason", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub(crate) async fn perform_action(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<SubscriptionId>,
    body: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Json<ActionOutcome>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let action: AdminAction = req
        .action
        .parse()
        .map_err(|e: rosp_state::TransitionError| AppError::Validation(e.to_string()))?;
    let outcome = state
        .engine
        .perform_action(caller.account_id, id, action, req.reason, req.notes)
        .await?;
    Ok(Json(outcome))
}

/// POST /v1/admin/renewals/sweep — Run the renewal sweep now.
#[utoipa::path(
    post,
    path = "/v1/admin/renewals/sweep",
    responses(
        (status = 200, description = "Sweep report"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub(crate) async fn run_sweep(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<SweepReport>, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(Json(state.engine.run_renewal_sweep(Timestamp::now()).await?))
}

/// GET /v1/admin/audit/verify — Recompute the audit hash chain.
#[utoipa::path(
    get,
    path = "/v1/admin/audit/verify",
    responses(
        (status = 200, description = "Chain verification result"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub(crate) async fn verify_audit(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<ChainVerification>, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(Json(state.engine.verify_audit_chain().await?))
}

/// GET /v1/admin/accounts/{id}/audit — Every audit entry for one account.
#[utoipa::path(
    get,
    path = "/v1/admin/accounts/{id}/audit",
    params(("id" = uuid::Uuid, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Audit entries, oldest first"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub(crate) async fn account_audit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<AccountId>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(Json(state.engine.audit_for_account(id).await?))
}

/// GET /v1/admin/templates — Every agreement template version.
#[utoipa::path(
    get,
    path = "/v1/admin/templates",
    responses(
        (status = 200, description = "Templates, in version order"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub(crate) async fn list_templates(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Vec<AgreementTemplate>>, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(Json(state.engine.templates().await?))
}

/// POST /v1/admin/templates — Publish a new active template version.
#[utoipa::path(
    post,
    path = "/v1/admin/templates",
    request_body = PublishTemplateRequest,
    responses(
        (status = 201, description = "Template published"),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 422, description = "Missing title", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub(crate) async fn publish_template(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<PublishTemplateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AgreementTemplate>), AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let template = state.engine.publish_template(&req.title).await?;
    Ok((StatusCode::CREATED, Json(template)))
}
