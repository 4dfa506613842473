//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with role-based access control.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{account_id}:{secret}
//! ```
//!
//! `role` is `client` or `admin`; `secret` is compared in constant time with
//! `AUTH_TOKEN`. Session issuance lives outside this service; whatever issues
//! sessions mints tokens in this shape.
//!
//! ## CallerIdentity
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl.

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use rosp_core::AccountId;
use rosp_lifecycle::model::Actor;

use crate::error::{AppError, ErrorBody};

// ── Role ────────────────────────────────────────────────────────────────────

/// Portal roles, ordered by privilege: `Client < Admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Can read and change its own account's resources.
    Client,
    /// Full access, including admin actions.
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Admin => "admin",
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    pub account_id: AccountId,
}

impl CallerIdentity {
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }

    /// Admins reach every account; clients only their own.
    pub fn can_access(&self, account_id: AccountId) -> bool {
        self.role == Role::Admin || self.account_id == account_id
    }

    /// The audit actor for changes made by this caller.
    pub fn actor(&self) -> Actor {
        match self.role {
            Role::Admin => Actor::Admin(self.account_id),
            Role::Client => Actor::Client(self.account_id),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// 403 unless the caller has at least `minimum`.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

/// Ownership check. Another client's resource reads as missing, so ids
/// cannot be enumerated.
pub fn require_access(
    caller: &CallerIdentity,
    account_id: AccountId,
    resource: &str,
) -> Result<(), AppError> {
    if caller.can_access(account_id) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("{resource} not found")))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Identity used when auth is disabled (local development).
pub fn development_operator() -> CallerIdentity {
    CallerIdentity {
        role: Role::Admin,
        account_id: AccountId::from_uuid(uuid::Uuid::nil()),
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse `{role}:{account_id}:{secret}`.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();
    let [role_str, account_str, secret] = parts.as_slice() else {
        return Err("invalid token format, expected {role}:{account_id}:{secret}".into());
    };

    if !constant_time_token_eq(secret, expected_secret) {
        return Err("invalid bearer token".into());
    }

    let role = match *role_str {
        "admin" => Role::Admin,
        "client" => Role::Client,
        other => return Err(format!("unknown role: {other}")),
    };
    let account_id = account_str
        .parse::<AccountId>()
        .map_err(|e| format!("invalid account_id: {e}"))?;

    Ok(CallerIdentity { role, account_id })
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the bearer token and inject the [`CallerIdentity`].
///
/// When `AuthConfig.token` is `None`, every request runs as
/// [`development_operator`].
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let Some(expected) = expected else {
        request.extensions_mut().insert(development_operator());
        return next.run(request).await;
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(provided) => match parse_bearer_token(provided, &expected) {
                Ok(identity) => {
                    request.extensions_mut().insert(identity);
                    next.run(request).await
                }
                Err(msg) => {
                    tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                    unauthorized_response(&msg)
                }
            },
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                unauthorized_response("authorization header must use Bearer scheme")
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            unauthorized_response("missing authorization header")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(ErrorBody::new("UNAUTHORIZED", message))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "s3cret";

    #[test]
    fn parses_client_token() {
        let id = AccountId::new();
        let caller = parse_bearer_token(&format!("client:{id}:{SECRET}"), SECRET).unwrap();
        assert_eq!(caller.role, Role::Client);
        assert_eq!(caller.account_id, id);
        assert_eq!(caller.actor(), Actor::Client(id));
    }

    #[test]
    fn secret_may_contain_colons() {
        let id = AccountId::new();
        let caller = parse_bearer_token(&format!("admin:{id}:a:b"), "a:b").unwrap();
        assert_eq!(caller.role, Role::Admin);
    }

    #[test]
    fn rejects_wrong_secret_and_unknown_role() {
        let id = AccountId::new();
        assert!(parse_bearer_token(&format!("client:{id}:nope"), SECRET).is_err());
        assert!(parse_bearer_token(&format!("root:{id}:{SECRET}"), SECRET).is_err());
        assert!(parse_bearer_token(SECRET, SECRET).is_err());
        assert!(parse_bearer_token(&format!("client:not-a-uuid:{SECRET}"), SECRET).is_err());
    }

    #[test]
    fn clients_only_reach_their_own_account() {
        let own = AccountId::new();
        let client = CallerIdentity {
            role: Role::Client,
            account_id: own,
        };
        assert!(client.can_access(own));
        assert!(!client.can_access(AccountId::new()));
        assert!(require_role(&client, Role::Admin).is_err());
        assert!(development_operator().can_access(own));
    }

    #[test]
    fn auth_config_debug_redacts_token() {
        let config = AuthConfig {
            token: Some(SECRET.into()),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains(SECRET));
        assert!(debug.contains("REDACTED"));
    }
}
