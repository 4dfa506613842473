//! # Payment Webhooks
//!
//! Inbound payment events arrive as JSON signed with a shared secret:
//!
//! ```text
//! Payment-Signature: t=<unix seconds>,v1=<hex hmac-sha256(secret, "{t}.{body}")>
//! ```
//!
//! A signature older (or newer) than the tolerance is rejected so a captured
//! request cannot be replayed later. Replays inside the window are caught by
//! the idempotency ledger, not here.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use rosp_core::{SubscriptionId, Timestamp};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "Payment-Signature";

/// Default timestamp tolerance in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[error("signature header is missing or malformed")]
    MalformedHeader,
    #[error("signature timestamp outside tolerance")]
    Stale,
    #[error("signature mismatch")]
    Mismatch,
    #[error("invalid webhook secret")]
    InvalidSecret,
    #[error("invalid event payload: {0}")]
    Payload(String),
}

/// Verifies payment webhook signatures.
///
/// Custom `Debug` implementation redacts the secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[REDACTED]")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Compute the header value for `body` signed at `timestamp`.
    pub fn sign(&self, body: &[u8], timestamp: i64) -> Result<String, WebhookError> {
        let mac = self.mac(body, timestamp)?;
        Ok(format!("t={timestamp},v1={}", hex::encode(mac)))
    }

    /// Check `header` against `body` at time `now`.
    pub fn verify(&self, header: &str, body: &[u8], now: Timestamp) -> Result<(), WebhookError> {
        let (timestamp, signatures) = parse_header(header)?;

        if (now.epoch_secs() - timestamp).abs() > self.tolerance_secs {
            tracing::warn!(timestamp, now = now.epoch_secs(), "payment webhook timestamp outside tolerance");
            return Err(WebhookError::Stale);
        }

        let expected = self.mac(body, timestamp)?;
        let matched = signatures
            .iter()
            .filter_map(|sig| hex::decode(sig).ok())
            .any(|provided| bool::from(expected.as_slice().ct_eq(provided.as_slice())));

        if !matched {
            tracing::warn!("payment webhook signature mismatch");
            return Err(WebhookError::Mismatch);
        }
        Ok(())
    }

    fn mac(&self, body: &[u8], timestamp: i64) -> Result<Vec<u8>, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| WebhookError::InvalidSecret)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Split `t=..,v1=..[,v1=..]` into the timestamp and every v1 signature.
fn parse_header(header: &str) -> Result<(i64, Vec<&str>), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) if !value.is_empty() => signatures.push(value),
            _ => {}
        }
    }
    match timestamp {
        Some(t) if !signatures.is_empty() => Ok((t, signatures)),
        _ => Err(WebhookError::MalformedHeader),
    }
}

// ─── Event Payload ──────────────────────────────────────────────────

/// What happened to a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentEventKind {
    #[serde(rename = "payment.succeeded", alias = "succeeded")]
    Succeeded,
    #[serde(rename = "payment.failed", alias = "failed")]
    Failed,
    #[serde(rename = "payment.refunded", alias = "refunded")]
    Refunded,
}

impl PaymentEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment event as delivered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    #[serde(rename = "type")]
    pub kind: PaymentEventKind,
    /// Gateway transaction id. For a refund, the id of the refunded charge.
    pub transaction_id: String,
    pub subscription_id: SubscriptionId,
    /// Amount in minor currency units.
    #[serde(rename = "amount")]
    pub amount_minor: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl PaymentEvent {
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        let event: Self =
            serde_json::from_slice(body).map_err(|e| WebhookError::Payload(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    /// Field checks that do not depend on the subscription. A charge or
    /// refund must move money; a failed attempt may report zero.
    pub fn validate(&self) -> Result<(), WebhookError> {
        if self.transaction_id.trim().is_empty() {
            return Err(WebhookError::Payload("transactionId must not be empty".into()));
        }
        let positive_required = matches!(
            self.kind,
            PaymentEventKind::Succeeded | PaymentEventKind::Refunded
        );
        if self.amount_minor < 0 || (positive_required && self.amount_minor == 0) {
            return Err(WebhookError::Payload(format!(
                "amount {} is not valid for a {} event",
                self.amount_minor, self.kind
            )));
        }
        if let Some(currency) = &self.currency {
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(WebhookError::Payload(format!(
                    "currency {currency:?} is not an ISO 4217 code"
                )));
            }
        }
        Ok(())
    }

    /// Key under which the event is recorded as applied. A charge and its
    /// refund share a transaction id, so the kind is part of the key.
    pub fn idempotency_token(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.transaction_id)
    }
}
