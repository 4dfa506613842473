//! Shared plumbing for the reqwest-backed collaborator clients.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;

use crate::config::{ConfigError, ServiceEndpoint};
use crate::error::GatewayError;

/// Build a client carrying the endpoint's bearer token (if any).
pub(crate) fn build_client(
    endpoint: &ServiceEndpoint,
    timeout_secs: u64,
    credential_var: &str,
) -> Result<reqwest::Client, GatewayError> {
    let mut headers = HeaderMap::new();
    if !endpoint.token.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {}", endpoint.token))
            .map_err(|_| ConfigError::MissingCredential(credential_var.to_string()))?;
        headers.insert(AUTHORIZATION, value);
    }
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .default_headers(headers)
        .build()
        .map_err(|e| GatewayError::Http {
            endpoint: "client_init".into(),
            source: e,
        })
}

// ── Sending ─────────────────────────────────────────────────────────

/// Header a collaborator deduplicates writes on.
pub(crate) const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Attempts for a request that may be resent, the first one included.
const MAX_ATTEMPTS: u32 = 4;

/// Delay before the first resend; doubles per attempt (200ms, 400ms, 800ms).
const BASE_DELAY_MS: u64 = 200;

/// How many times a request may reach the collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery<'a> {
    /// At most once: customer and session creation, outbound mail.
    Once,
    /// Repeats have no further effect: reads, renders, puts to a fixed key.
    Repeatable,
    /// Deduplicated by the collaborator on this key. Every attempt carries it.
    Keyed(&'a str),
}

impl Delivery<'_> {
    fn max_attempts(self) -> u32 {
        match self {
            Self::Once => 1,
            Self::Repeatable | Self::Keyed(_) => MAX_ATTEMPTS,
        }
    }
}

/// Gateway overload or a proxy in front of a restarting collaborator.
fn is_transient(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 502 | 503 | 504)
}

/// Send the request `build` produces and require a 2xx.
///
/// Unless `delivery` is [`Delivery::Once`], a connection failure, timeout
/// or transient status is followed by a resend with backoff. Any other
/// status is final.
pub(crate) async fn send(
    endpoint: &str,
    delivery: Delivery<'_>,
    build: impl Fn() -> reqwest::RequestBuilder,
) -> Result<reqwest::Response, GatewayError> {
    let max_attempts = delivery.max_attempts();
    let mut attempt = 1;
    loop {
        let mut request = build();
        if let Delivery::Keyed(key) = delivery {
            request = request.header(IDEMPOTENCY_KEY, key);
        }
        let sent = request.send().await;
        let failure = match &sent {
            Ok(resp) if is_transient(resp.status()) => Some(format!("status {}", resp.status())),
            Err(e) if e.is_connect() || e.is_timeout() => Some(e.to_string()),
            _ => None,
        };
        match failure {
            Some(failure) if attempt < max_attempts => {
                let delay = Duration::from_millis(BASE_DELAY_MS << (attempt - 1));
                tracing::warn!(
                    endpoint,
                    attempt,
                    max_attempts,
                    failure = %failure,
                    "collaborator request failed, resending in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            _ => return ensure_success(endpoint, sent).await,
        }
    }
}

/// Map a transport result to a 2xx response or a typed error.
async fn ensure_success(
    endpoint: &str,
    sent: Result<reqwest::Response, reqwest::Error>,
) -> Result<reqwest::Response, GatewayError> {
    let resp = sent.map_err(|e| GatewayError::Http {
        endpoint: endpoint.into(),
        source: e,
    })?;
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(GatewayError::Api {
            endpoint: endpoint.into(),
            status,
            body,
        });
    }
    Ok(resp)
}

/// Decode a JSON body.
pub(crate) async fn decode<T: DeserializeOwned>(
    endpoint: &str,
    resp: reqwest::Response,
) -> Result<T, GatewayError> {
    resp.json().await.map_err(|e| GatewayError::Deserialization {
        endpoint: endpoint.into(),
        source: e,
    })
}
