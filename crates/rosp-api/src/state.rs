//! # Application State
//!
//! Shared state for Axum route handlers: the lifecycle engine, the webhook
//! verifier, and service configuration. Cheap to clone.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use rosp_gateway::WebhookVerifier;
use rosp_lifecycle::{Engine, EngineConfig};

// ── Configuration ───────────────────────────────────────────────────────────

/// HTTP service configuration.
///
/// Custom `Debug` redacts the `auth_token`.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared bearer secret. `None` disables authentication.
    pub auth_token: Option<String>,
    /// Registrations accepted per source address per window.
    pub registration_rate_limit: u64,
    pub registration_rate_window_secs: u64,
    /// Interval between renewal sweeps. 0 disables the scheduler.
    pub renewal_sweep_secs: u64,
    /// Serve `/metrics` and record request counters.
    pub metrics_enabled: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("registration_rate_limit", &self.registration_rate_limit)
            .field("registration_rate_window_secs", &self.registration_rate_window_secs)
            .field("renewal_sweep_secs", &self.renewal_sweep_secs)
            .field("metrics_enabled", &self.metrics_enabled)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            registration_rate_limit: 5,
            registration_rate_window_secs: 3600,
            renewal_sweep_secs: 3600,
            metrics_enabled: true,
        }
    }
}

impl AppConfig {
    /// Load from `PORT`, `AUTH_TOKEN`, `REGISTRATION_RATE_LIMIT`,
    /// `REGISTRATION_RATE_WINDOW_SECS`, `RENEWAL_SWEEP_SECS` and
    /// `METRICS_ENABLED`. Unparseable numbers fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let number = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            auth_token: std::env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty()),
            registration_rate_limit: number("REGISTRATION_RATE_LIMIT", defaults.registration_rate_limit),
            registration_rate_window_secs: number(
                "REGISTRATION_RATE_WINDOW_SECS",
                defaults.registration_rate_window_secs,
            ),
            renewal_sweep_secs: number("RENEWAL_SWEEP_SECS", defaults.renewal_sweep_secs),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
        }
    }
}

// ── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Engine,
    /// `None` when `PAYMENTS_WEBHOOK_SECRET` is unset; webhooks are refused.
    pub webhook: Option<WebhookVerifier>,
    pub config: Arc<AppConfig>,
    /// Renders `/metrics`. `None` when no recorder was installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(engine: Engine, webhook: Option<WebhookVerifier>, config: AppConfig) -> Self {
        Self {
            engine,
            webhook,
            config: Arc::new(config),
            metrics: None,
        }
    }

    /// In-memory engine, unconfigured collaborators, default config.
    pub fn in_memory() -> Self {
        Self::new(Engine::in_memory(EngineConfig::default()), None, AppConfig::default())
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_auth_token() {
        let config = AppConfig {
            auth_token: Some("super-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn defaults_enable_scheduler_and_limit() {
        let config = AppConfig::default();
        assert_eq!(config.registration_rate_limit, 5);
        assert_eq!(config.renewal_sweep_secs, 3600);
        assert!(config.metrics_enabled);
    }
}
