//! # Client Subscription API
//!
//! Dashboard reads, the audit trail, and checkout retry. Clients see only
//! their own subscription; admins see all.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use rosp_core::SubscriptionId;
use rosp_lifecycle::model::AuditEntry;
use rosp_lifecycle::{CheckoutOutcome, SubscriptionOverview};

use crate::auth::{require_access, CallerIdentity};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/subscriptions/{id}", get(get_subscription))
        .route("/v1/subscriptions/{id}/checkout", post(begin_checkout))
        .route("/v1/subscriptions/{id}/audit", get(subscription_audit))
}

async fn owned_overview(
    state: &AppState,
    caller: &CallerIdentity,
    id: SubscriptionId,
) -> Result<SubscriptionOverview, AppError> {
    let overview = state.engine.subscription_overview(id).await?;
    require_access(caller, overview.account_id, "subscription")?;
    Ok(overview)
}

/// GET /v1/subscriptions/{id} — Status, badge, term and payment history.
#[utoipa::path(
    get,
    path = "/v1/subscriptions/{id}",
    params(("id" = uuid::Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Subscription with its status presentation and payments"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "subscriptions"
)]
pub(crate) async fn get_subscription(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<SubscriptionOverview>, AppError> {
    Ok(Json(owned_overview(&state, &caller, id).await?))
}

/// POST /v1/subscriptions/{id}/checkout — Start a new hosted checkout.
#[utoipa::path(
    post,
    path = "/v1/subscriptions/{id}/checkout",
    params(("id" = uuid::Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Checkout session created"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Status does not accept a payment", body = crate::error::ErrorBody),
        (status = 502, description = "Payment gateway failed", body = crate::error::ErrorBody),
    ),
    tag = "subscriptions"
)]
pub(crate) async fn begin_checkout(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<CheckoutOutcome>, AppError> {
    owned_overview(&state, &caller, id).await?;
    Ok(Json(state.engine.begin_checkout(id).await?))
}

/// GET /v1/subscriptions/{id}/audit — Audit trail, oldest first.
#[utoipa::path(
    get,
    path = "/v1/subscriptions/{id}/audit",
    params(("id" = uuid::Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Audit entries for the subscription"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "subscriptions"
)]
pub(crate) async fn subscription_audit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    owned_overview(&state, &caller, id).await?;
    Ok(Json(state.engine.audit_for_subscription(id).await?))
}
