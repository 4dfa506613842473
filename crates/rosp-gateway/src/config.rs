//! Collaborator configuration.
//!
//! Every collaborator is optional. A service whose URL variable is unset is
//! wired to [`crate::unconfigured::Unconfigured`], so the engine still runs
//! and only the affected side effects degrade.

use url::Url;

/// Base URL and credential for one HTTP collaborator.
///
/// Custom `Debug` implementation redacts the `token` field.
#[derive(Clone)]
pub struct ServiceEndpoint {
    pub base_url: Url,
    pub token: String,
}

impl std::fmt::Debug for ServiceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceEndpoint")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl ServiceEndpoint {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, ConfigError> {
        let base_url = parse_base_url("endpoint", base_url)?;
        Ok(Self {
            base_url,
            token: token.into(),
        })
    }

    /// Join a relative path onto the base URL.
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Configuration for every external collaborator.
#[derive(Clone)]
pub struct GatewayConfig {
    pub payments: Option<ServiceEndpoint>,
    /// Shared secret for inbound payment webhooks.
    pub payments_webhook_secret: Option<String>,
    pub mailer: Option<ServiceEndpoint>,
    /// Sender address on outbound email.
    pub mail_from: String,
    pub storage: Option<ServiceEndpoint>,
    pub renderer: Option<ServiceEndpoint>,
    pub registry: Option<ServiceEndpoint>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("payments", &self.payments)
            .field(
                "payments_webhook_secret",
                &self.payments_webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("mailer", &self.mailer)
            .field("mail_from", &self.mail_from)
            .field("storage", &self.storage)
            .field("renderer", &self.renderer)
            .field("registry", &self.registry)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            payments: None,
            payments_webhook_secret: None,
            mailer: None,
            mail_from: DEFAULT_MAIL_FROM.to_string(),
            storage: None,
            renderer: None,
            registry: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

const DEFAULT_MAIL_FROM: &str = "no-reply@registered-office.local";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `PAYMENTS_API_URL`, `PAYMENTS_SECRET_KEY`, `PAYMENTS_WEBHOOK_SECRET`
    /// - `MAILER_API_URL`, `MAILER_API_TOKEN`, `MAIL_FROM`
    /// - `STORAGE_API_URL`, `STORAGE_API_TOKEN`
    /// - `RENDERER_API_URL`
    /// - `REGISTRY_API_URL`, `REGISTRY_API_KEY`
    /// - `GATEWAY_TIMEOUT_SECS` (default: 30)
    ///
    /// A service is configured iff its URL variable is set. A set URL with a
    /// missing credential is an error for the payment gateway, whose API
    /// cannot be called anonymously.
    pub fn from_env() -> Result<Self, ConfigError> {
        let payments = match env_endpoint("PAYMENTS_API_URL", "PAYMENTS_SECRET_KEY")? {
            Some(ep) if ep.token.is_empty() => {
                return Err(ConfigError::MissingCredential("PAYMENTS_SECRET_KEY".into()))
            }
            other => other,
        };

        Ok(Self {
            payments,
            payments_webhook_secret: non_empty_var("PAYMENTS_WEBHOOK_SECRET"),
            mailer: env_endpoint("MAILER_API_URL", "MAILER_API_TOKEN")?,
            mail_from: non_empty_var("MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
            storage: env_endpoint("STORAGE_API_URL", "STORAGE_API_TOKEN")?,
            renderer: env_endpoint("RENDERER_API_URL", "RENDERER_API_TOKEN")?,
            registry: env_endpoint("REGISTRY_API_URL", "REGISTRY_API_KEY")?,
            timeout_secs: std::env::var("GATEWAY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Every service pointing at one local mock server (for testing).
    pub fn local_mock(base_url: &str, token: &str) -> Result<Self, ConfigError> {
        let endpoint = ServiceEndpoint::new(base_url, token)?;
        Ok(Self {
            payments: Some(endpoint.clone()),
            payments_webhook_secret: Some(format!("whsec_{token}")),
            mailer: Some(endpoint.clone()),
            mail_from: DEFAULT_MAIL_FROM.to_string(),
            storage: Some(endpoint.clone()),
            renderer: Some(endpoint.clone()),
            registry: Some(endpoint),
            timeout_secs: 5,
        })
    }
}

fn non_empty_var(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn env_endpoint(url_var: &str, token_var: &str) -> Result<Option<ServiceEndpoint>, ConfigError> {
    let Some(raw) = non_empty_var(url_var) else {
        return Ok(None);
    };
    let base_url = parse_base_url(url_var, &raw)?;
    Ok(Some(ServiceEndpoint {
        base_url,
        token: non_empty_var(token_var).unwrap_or_default(),
    }))
}

/// Parse a base URL, forcing a trailing slash so relative joins keep the path.
fn parse_base_url(var: &str, raw: &str) -> Result<Url, ConfigError> {
    let normalised = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalised).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingCredential(String),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
}
