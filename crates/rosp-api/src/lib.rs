//! # rosp-api — HTTP Surface of the Client Lifecycle Engine
//!
//! ## API Surface
//!
//! | Prefix                          | Module                        | Auth        |
//! |---------------------------------|-------------------------------|-------------|
//! | `/v1/registrations*`            | [`routes::registrations`]     | public      |
//! | `/v1/webhooks/payments`         | [`routes::webhooks`]          | signature   |
//! | `/v1/registry/*`                | [`routes::registry`]          | public      |
//! | `/v1/subscriptions/*`           | [`routes::subscriptions`]     | owner/admin |
//! | `/v1/accounts/*`                | [`routes::accounts`]          | owner/admin |
//! | `/v1/notifications*`            | [`routes::notifications`]     | owner       |
//! | `/v1/admin/*`                   | [`routes::admin`]             | admin       |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! TraceLayer → MetricsMiddleware → RateLimitMiddleware → register
//! ```
//!
//! ## OpenAPI
//!
//! Generated via utoipa derive macros at `/openapi.json`.

pub mod auth;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};
use crate::state::AppState;

/// Two KYC uploads plus the form fields.
const BODY_LIMIT_BYTES: usize = 25 * 1024 * 1024;

/// Assemble the full application router.
///
/// Health checks, `/metrics` and `/openapi.json` sit outside the auth
/// middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let limiter = RateLimiter::new(RateLimitConfig {
        max_requests: state.config.registration_rate_limit,
        window_secs: state.config.registration_rate_window_secs,
    });

    let submit = routes::registrations::submit_router()
        .route_layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(Extension(limiter));

    let public = Router::new()
        .merge(submit)
        .merge(routes::registrations::router())
        .merge(routes::webhooks::router())
        .merge(routes::registry::router());

    // Auth runs as a route layer so unmatched paths still answer 404.
    let authenticated = Router::new()
        .merge(routes::subscriptions::router())
        .merge(routes::accounts::router())
        .merge(routes::notifications::router())
        .merge(routes::admin::router())
        .route_layer(from_fn(auth::auth_middleware))
        .layer(Extension(auth_config));

    let mut api = Router::new()
        .merge(public)
        .merge(authenticated)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES));

    if state.config.metrics_enabled {
        api = api.layer(from_fn(middleware::metrics::metrics_middleware));
    }

    let api = api.layer(TraceLayer::new_for_http());

    let unauthenticated = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .merge(openapi::router());

    Router::new()
        .merge(unauthenticated)
        .merge(api)
        .with_state(state)
}

/// GET /health/liveness — Process is up.
async fn liveness() -> &'static str {
    "ok"
}

/// GET /health/readiness — The ledger's backing store answers.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.ledger().ping().await {
        Ok(()) => (StatusCode::OK, "ready").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "ledger unavailable").into_response()
        }
    }
}

/// GET /metrics — Prometheus text exposition.
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
