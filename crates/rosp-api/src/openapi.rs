//! # OpenAPI Specification Assembly
//!
//! Collects every utoipa-documented handler into one OpenAPI document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the bearer token security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Bearer token of the form `{role}:{account_id}:{secret}`. Secret set via AUTH_TOKEN.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ROSP API",
        version = "0.1.0",
        description = "Registered-office service provider: client registration, payment reconciliation, admin review and renewals.\n\nRegistration, availability, registry lookup and the payment webhook are public. Every other `/v1/*` route takes a bearer token."
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        // ── Registrations ───────────────────────────────────────────────
        crate::routes::registrations::register,
        crate::routes::registrations::availability,
        // ── Subscriptions ───────────────────────────────────────────────
        crate::routes::subscriptions::get_subscription,
        crate::routes::subscriptions::begin_checkout,
        crate::routes::subscriptions::subscription_audit,
        // ── Accounts ────────────────────────────────────────────────────
        crate::routes::accounts::update_addresses,
        crate::routes::accounts::replace_document,
        // ── Notifications ───────────────────────────────────────────────
        crate::routes::notifications::list_notifications,
        crate::routes::notifications::mark_read,
        // ── Admin ───────────────────────────────────────────────────────
        crate::routes::admin::perform_action,
        crate::routes::admin::run_sweep,
        crate::routes::admin::verify_audit,
        crate::routes::admin::account_audit,
        crate::routes::admin::list_templates,
        crate::routes::admin::publish_template,
        // ── Webhooks ────────────────────────────────────────────────────
        crate::routes::webhooks::payment_event,
        // ── Registry ────────────────────────────────────────────────────
        crate::routes::registry::search,
        crate::routes::registry::company,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            crate::routes::registrations::RegistrationForm,
            crate::routes::registrations::AvailabilityResponse,
            crate::routes::accounts::UpdateAddressesRequest,
            crate::routes::accounts::DocumentUploadForm,
            crate::routes::admin::ActionRequest,
            crate::routes::admin::PublishTemplateRequest,
        ),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "registrations", description = "Public signup and duplicate pre-check"),
        (name = "subscriptions", description = "Client dashboard, checkout retry and audit trail"),
        (name = "accounts", description = "Address changes and KYC document replacement"),
        (name = "notifications", description = "In-app notifications for the caller"),
        (name = "admin", description = "Operator review, renewal sweep, audit verification and agreement templates"),
        (name = "webhooks", description = "Signed payment gateway events"),
        (name = "registry", description = "Company registry lookups for form prefill"),
    )
)]
pub struct ApiDoc;

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_every_documented_route() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "ROSP API");
        for path in [
            "/v1/registrations",
            "/v1/registrations/availability",
            "/v1/subscriptions/{id}",
            "/v1/subscriptions/{id}/checkout",
            "/v1/admin/subscriptions/{id}/actions",
            "/v1/admin/renewals/sweep",
            "/v1/webhooks/payments",
            "/v1/registry/companies/{number}",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn spec_registers_bearer_scheme() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
