//! # Notification API
//!
//! The caller's own in-app notifications.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use rosp_core::NotificationId;
use rosp_lifecycle::model::Notification;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationList {
    pub unread: usize,
    pub items: Vec<Notification>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/notifications", get(list_notifications))
        .route("/v1/notifications/{id}/read", post(mark_read))
}

/// GET /v1/notifications — Newest first, with the unread count.
#[utoipa::path(
    get,
    path = "/v1/notifications",
    responses((status = 200, description = "Notifications for the caller's account")),
    tag = "notifications"
)]
pub(crate) async fn list_notifications(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<NotificationList>, AppError> {
    let items = state.engine.notifications_for(caller.account_id).await?;
    let unread = items.iter().filter(|n| !n.read).count();
    Ok(Json(NotificationList { unread, items }))
}

/// POST /v1/notifications/{id}/read — Mark one notification read.
#[utoipa::path(
    post,
    path = "/v1/notifications/{id}/read",
    params(("id" = uuid::Uuid, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification marked read"),
        (status = 404, description = "No such notification for this account", body = crate::error::ErrorBody),
    ),
    tag = "notifications"
)]
pub(crate) async fn mark_read(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<NotificationId>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(state.engine.mark_read(caller.account_id, id).await?))
}
