//! # Payment Reconciliation
//!
//! Applies verified payment-gateway events to subscriptions. Each event is
//! keyed by `"{kind}:{transaction_id}"`; a key already in the idempotency
//! ledger is refused with [`LifecycleError::DuplicateEvent`] before anything
//! is read, so gateway retries are safe.
//!
//! | Event | Payment row | Subscription |
//! |---|---|---|
//! | succeeded | upsert → SUCCEEDED | `PaymentSucceeded` if the table permits, else retry reset only |
//! | failed | new FAILED row (or PENDING → FAILED) | `PaymentFailed` |
//! | refunded | SUCCEEDED → REFUNDED | unchanged |

use serde::Serialize;

use rosp_core::{EmailAddress, PaymentId, SubscriptionId, Timestamp};
use rosp_gateway::{PaymentEvent, PaymentEventKind};
use rosp_state::{Payment, SubscriptionStatus, TransitionContext, TransitionRecord, Trigger};

use crate::emails;
use crate::error::LifecycleError;
use crate::model::{Actor, NewAuditEntry, Notification, NotificationKind, ProcessedEvent};
use crate::outcome::SideEffect;
use crate::telemetry;
use crate::Engine;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub token: String,
    pub kind: PaymentEventKind,
    pub subscription_id: SubscriptionId,
    pub payment_id: PaymentId,
    /// `None` when the event did not go through the transition table.
    pub transition: Option<TransitionRecord>,
    pub status: SubscriptionStatus,
    pub retry_count: u8,
    pub side_effects: Vec<SideEffect>,
}

/// Recipient details for the failed-payment email.
struct Contact {
    email: EmailAddress,
    name: String,
}

impl Engine {
    /// Apply one payment event.
    pub async fn apply_event(
        &self,
        event: &PaymentEvent,
    ) -> Result<ReconciliationReport, LifecycleError> {
        let kind = event.kind.as_str();
        let result = self.apply_event_inner(event).await;
        match &result {
            Ok(report) => {
                telemetry::payment_event(kind, "applied");
                tracing::info!(
                    token = %report.token,
                    subscription_id = %report.subscription_id,
                    status = %report.status,
                    retry_count = report.retry_count,
                    "payment event applied"
                );
            }
            Err(LifecycleError::DuplicateEvent { token }) => {
                telemetry::payment_event(kind, "duplicate");
                tracing::info!(token = %token, "duplicate payment event ignored");
            }
            Err(e) => {
                telemetry::payment_event(kind, "error");
                tracing::error!(
                    transaction_id = %event.transaction_id,
                    subscription_id = %event.subscription_id,
                    error = %e,
                    "payment event could not be applied"
                );
            }
        }
        result
    }

    async fn apply_event_inner(
        &self,
        event: &PaymentEvent,
    ) -> Result<ReconciliationReport, LifecycleError> {
        event
            .validate()
            .map_err(|e| LifecycleError::validation(e.to_string()))?;
        let currency = match &event.currency {
            Some(c) if !c.eq_ignore_ascii_case(&self.config.fee_currency) => {
                return Err(LifecycleError::validation(format!(
                    "event currency {c} does not match the fee currency {}",
                    self.config.fee_currency
                )));
            }
            _ => self.config.fee_currency.clone(),
        };
        let now = Timestamp::now();
        let token = event.idempotency_token();

        let (mut report, contact) = self
            .ledger
            .transact(|uow| {
                if uow.is_processed(&token) {
                    return Err(LifecycleError::DuplicateEvent { token: token.clone() });
                }
                let mut sub = uow
                    .subscription(event.subscription_id)
                    .ok_or_else(|| LifecycleError::not_found("subscription", event.subscription_id))?;
                let from = sub.status();
                let existing = uow.payment_by_transaction(&event.transaction_id);
                if let Some(p) = &existing {
                    if p.subscription_id != sub.id() {
                        return Err(LifecycleError::validation(format!(
                            "transaction {} belongs to another subscription",
                            event.transaction_id
                        )));
                    }
                }

                let mut contact = None;
                let (payment, transition, action, reason) = match event.kind {
                    PaymentEventKind::Succeeded => {
                        let mut payment = match existing {
                            Some(mut p) => {
                                p.record_succeeded(now)?;
                                p
                            }
                            None => Payment::succeeded(
                                sub.id(),
                                event.transaction_id.clone(),
                                event.amount_minor,
                                currency.clone(),
                                now,
                            ),
                        };
                        if let Some(method) = &event.method {
                            payment.method = Some(method.clone());
                            sub.set_payment_method(method.clone(), now);
                        }
                        let transition = if sub.accepts(Trigger::PaymentSucceeded) {
                            Some(sub.apply(Trigger::PaymentSucceeded, TransitionContext::at(now))?)
                        } else {
                            sub.clear_retries(now);
                            None
                        };
                        uow.save_subscription(sub.clone())?;
                        uow.put_notification(Notification::new(
                            sub.account_id(),
                            NotificationKind::PaymentReceived,
                            "Payment received",
                            format!(
                                "We received your payment of {} {}.",
                                format_minor(event.amount_minor),
                                currency
                            ),
                            now,
                        ))?;
                        (payment, transition, "PAYMENT_SUCCEEDED", None)
                    }

                    PaymentEventKind::Failed => {
                        let payment = match existing {
                            Some(mut p) => {
                                p.record_failed(event.failure_reason.clone(), now)?;
                                p
                            }
                            None => Payment::failed(
                                sub.id(),
                                event.transaction_id.clone(),
                                event.amount_minor,
                                currency.clone(),
                                event.failure_reason.clone(),
                                now,
                            ),
                        };
                        let record = sub.apply(Trigger::PaymentFailed, TransitionContext::at(now))?;
                        uow.save_subscription(sub.clone())?;
                        let message = if record.changed_status() {
                            "Your payment failed and your service has been suspended. Please update your payment details."
                        } else {
                            "Your payment failed. Please update your payment details."
                        };
                        uow.put_notification(Notification::new(
                            sub.account_id(),
                            NotificationKind::PaymentFailed,
                            "Payment failed",
                            message,
                            now,
                        ))?;
                        contact = uow.account(sub.account_id()).map(|a| Contact {
                            email: a.email,
                            name: a.contact_name,
                        });
                        (payment, Some(record), "PAYMENT_FAILED", event.failure_reason.clone())
                    }

                    PaymentEventKind::Refunded => {
                        let mut payment = existing.ok_or_else(|| {
                            LifecycleError::not_found("payment", &event.transaction_id)
                        })?;
                        payment.mark_refunded(now)?;
                        (payment, None, "PAYMENT_REFUNDED", None)
                    }
                };

                let payment_id = payment.id;
                uow.put_payment(payment)?;
                uow.record_event(ProcessedEvent {
                    token: token.clone(),
                    kind: event.kind.as_str().to_string(),
                    transaction_id: event.transaction_id.clone(),
                    subscription_id: sub.id(),
                    applied_at: now,
                })?;
                uow.append_audit(
                    NewAuditEntry::new(sub.account_id(), Actor::PaymentGateway, action, now)
                        .subscription(sub.id())
                        .statuses(Some(from), Some(sub.status()))
                        .reason(reason)
                        .notes(Some(format!(
                            "transaction {} amount {} retry {}",
                            event.transaction_id,
                            event.amount_minor,
                            sub.retry_count()
                        ))),
                )?;

                Ok((
                    ReconciliationReport {
                        token: token.clone(),
                        kind: event.kind,
                        subscription_id: sub.id(),
                        payment_id,
                        transition,
                        status: sub.status(),
                        retry_count: sub.retry_count(),
                        side_effects: Vec::new(),
                    },
                    contact,
                ))
            })
            .await?;

        if let Some(record) = &report.transition {
            if record.changed_status() {
                telemetry::transition(record.from, record.to);
            }
        }

        if event.kind == PaymentEventKind::Failed {
            let effect = match contact {
                Some(contact) => {
                    let email = emails::payment_failed(
                        contact.email,
                        &contact.name,
                        report.retry_count,
                        &self.config.dashboard_url(),
                    );
                    match self.gateway.mailer.send(&email).await {
                        Ok(()) => SideEffect::succeeded("payment_failed_email"),
                        Err(e) => SideEffect::failed("payment_failed_email", e),
                    }
                }
                None => SideEffect::skipped("payment_failed_email", "account not found"),
            };
            report.side_effects.push(effect);
        }

        Ok(report)
    }
}

/// `30000` → `300.00`.
fn format_minor(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_units_format_with_two_decimals() {
        assert_eq!(format_minor(30_000), "300.00");
        assert_eq!(format_minor(5), "0.05");
        assert_eq!(format_minor(-1250), "-12.50");
    }
}
