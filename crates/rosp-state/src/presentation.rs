//! # Status Presentation
//!
//! The one place that decides how a subscription status is shown: badge
//! label, tone, client-facing message, and which operator actions are
//! offered. Dashboards, the admin console and emails all render a
//! [`StatusView`]; none of them map statuses themselves.

use serde::{Deserialize, Serialize};

use crate::subscription::{AdminAction, Rule, Subscription, SubscriptionStatus, Trigger};

/// Visual tone of a status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTone {
    Neutral,
    Info,
    Success,
    Warning,
    Danger,
}

/// Rendered view of a subscription's standing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub status: SubscriptionStatus,
    pub label: &'static str,
    pub tone: StatusTone,
    pub client_message: &'static str,
    pub admin_actions: Vec<AdminAction>,
    pub can_checkout: bool,
}

impl StatusView {
    pub fn for_status(status: SubscriptionStatus) -> Self {
        use SubscriptionStatus as S;

        let (label, tone, client_message) = match status {
            S::Draft => (
                "Awaiting payment",
                StatusTone::Neutral,
                "Complete your annual payment to submit your application.",
            ),
            S::PendingApproval => (
                "Under review",
                StatusTone::Info,
                "We have received your payment and are reviewing your documents.",
            ),
            S::Active => (
                "Active",
                StatusTone::Success,
                "Your registered office service is active.",
            ),
            S::Suspended => (
                "Suspended",
                StatusTone::Danger,
                "Your service is suspended. Please contact us or update your payment.",
            ),
            S::Expired => (
                "Expired",
                StatusTone::Danger,
                "Your service term has ended. Renew to restore your registered office.",
            ),
            S::Rejected => (
                "Rejected",
                StatusTone::Danger,
                "Your application was not approved. Any payment has been refunded.",
            ),
            S::Withdrawn => (
                "Cancelled",
                StatusTone::Neutral,
                "This subscription has been cancelled.",
            ),
            S::RenewalPending => (
                "Renewal due",
                StatusTone::Warning,
                "Your term ends soon. Renew now to keep your registered office.",
            ),
        };

        Self {
            status,
            label,
            tone,
            client_message,
            admin_actions: Rule::admin_actions(status),
            can_checkout: Rule::permits(status, Trigger::PaymentSucceeded),
        }
    }
}

impl From<&Subscription> for StatusView {
    fn from(subscription: &Subscription) -> Self {
        Self::for_status(subscription.status())
    }
}
