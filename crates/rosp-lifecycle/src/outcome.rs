//! Best-effort side effects and how their outcome is reported.
//!
//! A side effect runs after its unit of work has committed. Its failure is
//! logged and counted, never propagated: the caller learns about it only
//! through the [`SideEffect`] entry in the operation's result.

use serde::Serialize;

use crate::telemetry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideEffect {
    pub name: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SideEffect {
    pub fn succeeded(name: &'static str) -> Self {
        Self {
            name,
            ok: true,
            detail: None,
        }
    }

    pub fn succeeded_with(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: true,
            detail: Some(detail.into()),
        }
    }

    /// Log and count a failure.
    pub fn failed(name: &'static str, error: impl std::fmt::Display) -> Self {
        tracing::warn!(side_effect = name, error = %error, "side effect failed");
        telemetry::side_effect_failed(name);
        Self {
            name,
            ok: false,
            detail: Some(error.to_string()),
        }
    }

    /// Not attempted because a precondition is absent.
    pub fn skipped(name: &'static str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::info!(side_effect = name, reason = %reason, "side effect skipped");
        Self {
            name,
            ok: false,
            detail: Some(format!("skipped: {reason}")),
        }
    }
}

/// Whether every side effect in the list succeeded.
pub fn all_ok(effects: &[SideEffect]) -> bool {
    effects.iter().all(|e| e.ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_keeps_error_text() {
        let e = SideEffect::failed("welcome_email", "mailer is not configured");
        assert!(!e.ok);
        assert_eq!(e.detail.as_deref(), Some("mailer is not configured"));
        assert!(!all_ok(&[SideEffect::succeeded("a"), e]));
    }

    #[test]
    fn serializes_without_empty_detail() {
        let json = serde_json::to_value(SideEffect::succeeded("checkout_session")).unwrap();
        assert!(json.get("detail").is_none());
    }
}
