//! # Renewal Sweep
//!
//! The scheduled half of the lifecycle. For each ACTIVE or RENEWAL_PENDING
//! subscription:
//!
//! - end date passed → `EndDatePassed` (→ EXPIRED)
//! - otherwise, ACTIVE and within the renewal window →
//!   `RenewalWindowReached` (→ RENEWAL_PENDING)
//!
//! Each subscription is its own unit of work so one failure does not hold
//! back the rest.

use serde::Serialize;

use rosp_core::{SubscriptionId, Timestamp};
use rosp_state::{Rule, Subscription, SubscriptionStatus, TransitionContext, Trigger};

use crate::emails;
use crate::error::LifecycleError;
use crate::model::{Actor, NewAuditEntry, Notification, NotificationKind};
use crate::outcome::SideEffect;
use crate::telemetry;
use crate::Engine;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Subscriptions moved to RENEWAL_PENDING.
    pub renewal_due: Vec<SubscriptionId>,
    /// Subscriptions moved to EXPIRED.
    pub expired: Vec<SubscriptionId>,
    pub errors: Vec<SweepError>,
    pub side_effects: Vec<SideEffect>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepError {
    pub subscription_id: SubscriptionId,
    pub message: String,
}

/// The trigger a subscription is due for at `now`, if any.
pub fn due_trigger(sub: &Subscription, now: Timestamp) -> Option<Trigger> {
    let end = sub.end_date()?;
    if end < now && Rule::permits(sub.status(), Trigger::EndDatePassed) {
        return Some(Trigger::EndDatePassed);
    }
    if sub.status() == SubscriptionStatus::Active && sub.accepts(Trigger::RenewalWindowReached) {
        let days_left = now.days_until(&end);
        if days_left <= rosp_state::RENEWAL_WINDOW_DAYS {
            return Some(Trigger::RenewalWindowReached);
        }
    }
    None
}

impl Engine {
    /// Run one sweep at `now`.
    ///
    /// Fails only if the subscriptions cannot be read; a failure on one
    /// subscription is reported in [`SweepReport::errors`].
    pub async fn run_renewal_sweep(&self, now: Timestamp) -> Result<SweepReport, LifecycleError> {
        let due: Vec<(SubscriptionId, Trigger)> = self
            .ledger
            .read(|t| {
                t.subscriptions()
                    .filter_map(|s| due_trigger(s, now).map(|trigger| (s.id(), trigger)))
                    .collect()
            })
            .await?;

        let mut report = SweepReport::default();
        for (subscription_id, trigger) in due {
            match self.sweep_one(subscription_id, trigger, now).await {
                Ok(Some(effect)) => {
                    match trigger {
                        Trigger::EndDatePassed => report.expired.push(subscription_id),
                        _ => report.renewal_due.push(subscription_id),
                    }
                    report.side_effects.push(effect);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(subscription_id = %subscription_id, error = %e, "renewal sweep step failed");
                    report.errors.push(SweepError {
                        subscription_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            renewal_due = report.renewal_due.len(),
            expired = report.expired.len(),
            errors = report.errors.len(),
            "renewal sweep finished"
        );
        Ok(report)
    }

    /// Apply `trigger` if it is still due once the lock is held. Returns the
    /// reminder email outcome, or `None` if the subscription moved on.
    async fn sweep_one(
        &self,
        subscription_id: SubscriptionId,
        trigger: Trigger,
        now: Timestamp,
    ) -> Result<Option<SideEffect>, LifecycleError> {
        let applied = self
            .ledger
            .transact(|uow| {
                let mut sub = uow
                    .subscription(subscription_id)
                    .ok_or_else(|| LifecycleError::not_found("subscription", subscription_id))?;
                if due_trigger(&sub, now) != Some(trigger) {
                    return Ok(None);
                }
                let record = sub.apply(trigger, TransitionContext::at(now))?;
                uow.save_subscription(sub.clone())?;
                uow.append_audit(
                    NewAuditEntry::new(sub.account_id(), Actor::Scheduler, trigger.as_str(), now)
                        .subscription(subscription_id)
                        .statuses(Some(record.from), Some(record.to)),
                )?;
                let (kind, title, message) = match trigger {
                    Trigger::EndDatePassed => (
                        NotificationKind::Expired,
                        "Service expired",
                        "Your registered office service has expired. Renew to restore it.",
                    ),
                    _ => (
                        NotificationKind::RenewalDue,
                        "Renewal due",
                        "Your annual renewal is due. Pay now to keep your service active.",
                    ),
                };
                uow.put_notification(Notification::new(sub.account_id(), kind, title, message, now))?;
                Ok(Some((record, uow.account(sub.account_id()))))
            })
            .await?;

        let Some((record, account)) = applied else {
            return Ok(None);
        };
        telemetry::transition(record.from, record.to);

        let effect = match account {
            Some(account) => {
                let email = emails::lifecycle_notice(
                    account.email,
                    &account.contact_name,
                    record.to,
                    &self.config.dashboard_url(),
                );
                match self.gateway.mailer.send(&email).await {
                    Ok(()) => SideEffect::succeeded("renewal_email"),
                    Err(e) => SideEffect::failed("renewal_email", e),
                }
            }
            None => SideEffect::skipped("renewal_email", "account not found"),
        };
        Ok(Some(effect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosp_core::AccountId;
    use rosp_state::AdminAction;

    fn at(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn active_since(start: Timestamp) -> Subscription {
        let mut sub = Subscription::draft(AccountId::new(), start);
        sub.apply(Trigger::PaymentSucceeded, TransitionContext::at(start)).unwrap();
        sub.apply(Trigger::Admin(AdminAction::Approve), TransitionContext::at(start))
            .unwrap();
        sub
    }

    #[test]
    fn nothing_due_mid_term() {
        let sub = active_since(at("2026-01-01T00:00:00Z"));
        assert_eq!(due_trigger(&sub, at("2026-06-01T00:00:00Z")), None);
    }

    #[test]
    fn renewal_window_opens_thirty_days_out() {
        let sub = active_since(at("2026-01-01T00:00:00Z"));
        // end = 2027-01-01
        assert_eq!(
            due_trigger(&sub, at("2026-12-02T00:00:00Z")),
            Some(Trigger::RenewalWindowReached)
        );
        assert_eq!(due_trigger(&sub, at("2026-11-30T00:00:00Z")), None);
    }

    #[test]
    fn expiry_beats_renewal() {
        let sub = active_since(at("2026-01-01T00:00:00Z"));
        assert_eq!(
            due_trigger(&sub, at("2027-01-02T00:00:00Z")),
            Some(Trigger::EndDatePassed)
        );
    }

    #[test]
    fn draft_is_never_due() {
        let sub = Subscription::draft(AccountId::new(), at("2026-01-01T00:00:00Z"));
        assert_eq!(due_trigger(&sub, at("2030-01-01T00:00:00Z")), None);
    }
}
