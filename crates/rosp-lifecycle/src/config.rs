//! Engine configuration.

use rosp_core::EmailAddress;

/// Default KYC document size ceiling: 10 MiB.
pub const DEFAULT_KYC_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Media types accepted for KYC uploads.
pub const KYC_MEDIA_TYPES: [&str; 3] = ["application/pdf", "image/jpeg", "image/png"];

/// Business settings for the lifecycle engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Annual fee in minor currency units.
    pub annual_fee_minor: i64,
    /// ISO 4217 currency code.
    pub fee_currency: String,
    /// Per-document KYC upload ceiling in bytes.
    pub kyc_max_bytes: usize,
    /// Recipient of new-registration alerts. Alerts are skipped when unset.
    pub operator_alert_email: Option<EmailAddress>,
    /// Base URL of the client portal, used in emails and checkout return URLs.
    pub portal_base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            annual_fee_minor: 30_000,
            fee_currency: "GBP".into(),
            kyc_max_bytes: DEFAULT_KYC_MAX_BYTES,
            operator_alert_email: None,
            portal_base_url: "http://localhost:3000".into(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables (all optional):
    /// - `ANNUAL_FEE_MINOR` (default: 30000)
    /// - `FEE_CURRENCY` (default: GBP)
    /// - `KYC_MAX_BYTES` (default: 10 MiB)
    /// - `OPERATOR_ALERT_EMAIL`
    /// - `PORTAL_BASE_URL` (default: `http://localhost:3000`)
    pub fn from_env() -> Result<Self, EngineConfigError> {
        let defaults = Self::default();

        let annual_fee_minor = match std::env::var("ANNUAL_FEE_MINOR") {
            Ok(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|fee| *fee > 0)
                .ok_or(EngineConfigError::Invalid("ANNUAL_FEE_MINOR", raw))?,
            Err(_) => defaults.annual_fee_minor,
        };

        let fee_currency = match std::env::var("FEE_CURRENCY") {
            Ok(raw) if raw.len() == 3 && raw.chars().all(|c| c.is_ascii_alphabetic()) => {
                raw.to_ascii_uppercase()
            }
            Ok(raw) => return Err(EngineConfigError::Invalid("FEE_CURRENCY", raw)),
            Err(_) => defaults.fee_currency,
        };

        let kyc_max_bytes = match std::env::var("KYC_MAX_BYTES") {
            Ok(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(EngineConfigError::Invalid("KYC_MAX_BYTES", raw))?,
            Err(_) => defaults.kyc_max_bytes,
        };

        let operator_alert_email = match std::env::var("OPERATOR_ALERT_EMAIL") {
            Ok(raw) => Some(
                EmailAddress::parse(&raw)
                    .map_err(|_| EngineConfigError::Invalid("OPERATOR_ALERT_EMAIL", raw))?,
            ),
            Err(_) => defaults.operator_alert_email,
        };

        let portal_base_url = std::env::var("PORTAL_BASE_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(defaults.portal_base_url);

        Ok(Self {
            annual_fee_minor,
            fee_currency,
            kyc_max_bytes,
            operator_alert_email,
            portal_base_url,
        })
    }

    /// Where the gateway sends the client after checkout.
    pub fn dashboard_url(&self) -> String {
        format!("{}/dashboard", self.portal_base_url)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineConfigError {
    #[error("invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
