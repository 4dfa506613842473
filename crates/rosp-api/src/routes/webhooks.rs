//! # Payment Webhook
//!
//! The gateway posts signed events here. The raw body is verified against
//! the `Payment-Signature` header before it is parsed, then handed to the
//! reconciliation engine. Redeliveries of an applied event answer 200 so
//! the gateway stops retrying.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use rosp_core::Timestamp;
use rosp_gateway::webhook::SIGNATURE_HEADER;
use rosp_gateway::PaymentEvent;
use rosp_lifecycle::LifecycleError;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(payment_event))
}

/// POST /v1/webhooks/payments — Apply one signed payment event.
#[utoipa::path(
    post,
    path = "/v1/webhooks/payments",
    request_body(content = String, description = "Gateway event JSON", content_type = "application/json"),
    responses(
        (status = 200, description = "Event applied, or already applied"),
        (status = 400, description = "Malformed event", body = crate::error::ErrorBody),
        (status = 401, description = "Missing or invalid signature", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown subscription", body = crate::error::ErrorBody),
        (status = 503, description = "Webhook secret not configured", body = crate::error::ErrorBody),
    ),
    tag = "webhooks"
)]
pub(crate) async fn payment_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let verifier = state.webhook.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("payment webhook secret is not configured".into())
    })?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("missing {SIGNATURE_HEADER} header")))?;
    verifier.verify(signature, &body, Timestamp::now())?;

    let event = PaymentEvent::parse(&body)?;
    match state.engine.apply_event(&event).await {
        Ok(report) => Ok(Json(json!({ "status": "applied", "report": report }))),
        Err(LifecycleError::DuplicateEvent { token }) => {
            Ok(Json(json!({ "status": "duplicate", "token": token })))
        }
        Err(e) => Err(e.into()),
    }
}
