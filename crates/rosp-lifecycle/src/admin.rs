//! # Admin Action Processor
//!
//! Operator decisions on a subscription. Processing order:
//!
//! 1. Legality: the transition table must have a row for the action from
//!    the current status.
//! 2. Reason: REJECT and SUSPEND need a non-empty reason.
//! 3. One unit of work: transition, audit entry, in-app notification.
//! 4. REJECT only: a refund request per SUCCEEDED payment, keyed
//!    `refund-{payment_id}` so a repeated request cannot double-refund.
//!    A failed refund is logged and audited; the rejection stands.
//! 5. Best-effort decision email.

use serde::Serialize;

use rosp_core::{AccountId, SubscriptionId, Timestamp};
use rosp_gateway::RefundRequest;
use rosp_state::{AdminAction, Payment, PaymentStatus, SubscriptionStatus, TransitionContext, Trigger};

use crate::emails;
use crate::error::LifecycleError;
use crate::model::{Account, Actor, NewAuditEntry, Notification, NotificationKind};
use crate::outcome::SideEffect;
use crate::telemetry;
use crate::Engine;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub subscription_id: SubscriptionId,
    pub from: SubscriptionStatus,
    pub to: SubscriptionStatus,
    /// True once a refund was requested, whether or not the gateway
    /// accepted it.
    pub refund_initiated: bool,
    pub side_effects: Vec<SideEffect>,
}

fn decision_message(action: AdminAction, reason: Option<&str>) -> String {
    let base = match action {
        AdminAction::Approve => "Your registered office service is now active.",
        AdminAction::Reject => "Your application was not approved. Any payment will be refunded.",
        AdminAction::Suspend => "Your service has been suspended.",
        AdminAction::Reactivate => "Your service has been reactivated.",
        AdminAction::Cancel => "Your service has been cancelled.",
    };
    match reason {
        Some(reason) => format!("{base} Reason: {reason}"),
        None => base.to_string(),
    }
}

impl Engine {
    /// Apply an operator action to a subscription.
    pub async fn perform_action(
        &self,
        admin_id: AccountId,
        subscription_id: SubscriptionId,
        action: AdminAction,
        reason: Option<String>,
        notes: Option<String>,
    ) -> Result<ActionOutcome, LifecycleError> {
        let now = Timestamp::now();
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

        let (record, account, refundable) = self
            .ledger
            .transact(|uow| {
                let mut sub = uow
                    .subscription(subscription_id)
                    .ok_or_else(|| LifecycleError::not_found("subscription", subscription_id))?;
                let record = sub.apply(
                    Trigger::Admin(action),
                    TransitionContext::with_reason(now, reason.as_deref()),
                )?;
                uow.save_subscription(sub.clone())?;

                uow.append_audit(
                    NewAuditEntry::new(sub.account_id(), Actor::Admin(admin_id), action.as_str(), now)
                        .subscription(subscription_id)
                        .statuses(Some(record.from), Some(record.to))
                        .reason(reason.clone())
                        .notes(notes.clone()),
                )?;
                uow.put_notification(Notification::new(
                    sub.account_id(),
                    NotificationKind::StatusChanged,
                    format!("Status changed to {}", rosp_state::StatusView::for_status(record.to).label),
                    decision_message(action, reason.as_deref()),
                    now,
                ))?;

                let refundable: Vec<Payment> = if action == AdminAction::Reject {
                    uow.payments_for_subscription(subscription_id)
                        .into_iter()
                        .filter(|p| p.status() == PaymentStatus::Succeeded)
                        .collect()
                } else {
                    Vec::new()
                };
                Ok((record, uow.account(sub.account_id()), refundable))
            })
            .await?;

        telemetry::transition(record.from, record.to);
        tracing::info!(
            subscription_id = %subscription_id,
            admin_id = %admin_id,
            action = action.as_str(),
            from = %record.from,
            to = %record.to,
            "admin action applied"
        );

        let mut side_effects = Vec::new();
        let mut refund_initiated = false;
        for payment in &refundable {
            refund_initiated = true;
            side_effects.push(self.request_refund(admin_id, subscription_id, payment, now).await);
        }

        side_effects.push(match &account {
            Some(account) => self.send_decision_email(account, action, reason.as_deref()).await,
            None => SideEffect::skipped("decision_email", "account not found"),
        });

        Ok(ActionOutcome {
            subscription_id,
            from: record.from,
            to: record.to,
            refund_initiated,
            side_effects,
        })
    }

    async fn request_refund(
        &self,
        admin_id: AccountId,
        subscription_id: SubscriptionId,
        payment: &Payment,
        now: Timestamp,
    ) -> SideEffect {
        let request = RefundRequest {
            transaction_id: payment.transaction_id.clone(),
            amount_minor: payment.amount_minor,
            currency: payment.currency.clone(),
            idempotency_key: format!("refund-{}", payment.id),
        };
        let result = self.gateway.payments.refund(&request).await;

        let (action, notes, effect) = match result {
            Ok(receipt) => (
                "REFUND_REQUESTED",
                format!("transaction {} refund {} ({})", payment.transaction_id, receipt.id, receipt.status),
                SideEffect::succeeded_with("refund", receipt.id),
            ),
            Err(e) => {
                tracing::error!(
                    subscription_id = %subscription_id,
                    payment_id = %payment.id,
                    transaction_id = %payment.transaction_id,
                    amount_minor = payment.amount_minor,
                    error = %e,
                    "refund request failed; refund must be issued manually"
                );
                (
                    "REFUND_FAILED",
                    format!("transaction {}: {e}", payment.transaction_id),
                    SideEffect::failed("refund", e),
                )
            }
        };

        let audited = self
            .ledger
            .transact(|uow| {
                let account_id = uow
                    .subscription(subscription_id)
                    .map(|s| s.account_id())
                    .ok_or_else(|| LifecycleError::not_found("subscription", subscription_id))?;
                uow.append_audit(
                    NewAuditEntry::new(account_id, Actor::Admin(admin_id), action, now)
                        .subscription(subscription_id)
                        .notes(Some(notes)),
                )
            })
            .await;
        if let Err(e) = audited {
            tracing::error!(subscription_id = %subscription_id, error = %e, "failed to audit refund attempt");
        }
        effect
    }

    async fn send_decision_email(
        &self,
        account: &Account,
        action: AdminAction,
        reason: Option<&str>,
    ) -> SideEffect {
        let email = emails::admin_decision(
            account.email.clone(),
            &account.contact_name,
            action,
            reason,
            &self.config.dashboard_url(),
        );
        match self.gateway.mailer.send(&email).await {
            Ok(()) => SideEffect::succeeded("decision_email"),
            Err(e) => SideEffect::failed("decision_email", e),
        }
    }
}
