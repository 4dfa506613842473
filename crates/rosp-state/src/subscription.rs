//! # Subscription Status State Machine
//!
//! Models a client's standing with the registered-office service.
//!
//! ## States
//!
//! ```text
//!   DRAFT ──paid──▶ PENDING_APPROVAL ──approve──▶ ACTIVE ──window──▶ RENEWAL_PENDING
//!                         │                        │  ▲                  │
//!                         └──reject──▶ REJECTED    │  └──paid───────────┤
//!                                                  │                     │
//!                                       suspend /  │      end passed     ▼
//!                                   3 failures     ▼  ◀──paid────────  EXPIRED
//!                                              SUSPENDED
//!
//!   any state except REJECTED / WITHDRAWN ──cancel──▶ WITHDRAWN
//! ```
//!
//! ## Transition Table
//!
//! [`Rule::lookup`] is the single table. Enforcement ([`Subscription::apply`])
//! and presentation ([`crate::presentation`]) both read it, so the UI can
//! never offer an action the engine would refuse.
//!
//! Guards that depend on data rather than on the (state, trigger) pair, such
//! as a mandatory reason or the term end, are checked after the table lookup.
//! A pair missing from the table is always reported as
//! [`TransitionError::InvalidTransition`], whatever the guards would say.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rosp_core::{AccountId, SubscriptionId, Timestamp};

/// Consecutive failed payments that force suspension.
pub const RETRY_THRESHOLD: u8 = 3;

/// Length of one subscription term in days.
pub const TERM_DAYS: i64 = 365;

/// Days before the term end at which renewal becomes due.
pub const RENEWAL_WINDOW_DAYS: i64 = 30;

// ─── Subscription Status ────────────────────────────────────────────

/// The lifecycle status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    /// Registered, annual fee not yet paid.
    Draft,
    /// Paid, awaiting operator KYC review.
    PendingApproval,
    /// Service is live.
    Active,
    /// Service withheld by an operator or after repeated payment failure.
    Suspended,
    /// Term ended without renewal payment.
    Expired,
    /// Application refused by an operator (terminal).
    Rejected,
    /// Cancelled (terminal).
    Withdrawn,
    /// Term ends within the renewal window; renewal payment outstanding.
    RenewalPending,
}

impl SubscriptionStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [SubscriptionStatus; 8] = [
        Self::Draft,
        Self::PendingApproval,
        Self::Active,
        Self::Suspended,
        Self::Expired,
        Self::Rejected,
        Self::Withdrawn,
        Self::RenewalPending,
    ];

    /// Whether no further transitions are defined out of this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Withdrawn)
    }

    /// Whether the client currently receives the service.
    pub fn is_in_service(&self) -> bool {
        matches!(self, Self::Active | Self::RenewalPending)
    }

    /// The persisted / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Active => "ACTIVE",
            Self::Suspended => "SUSPENDED",
            Self::Expired => "EXPIRED",
            Self::Rejected => "REJECTED",
            Self::Withdrawn => "WITHDRAWN",
            Self::RenewalPending => "RENEWAL_PENDING",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TransitionError::UnknownStatus(s.to_string()))
    }
}

// ─── Triggers ───────────────────────────────────────────────────────

/// Operator-initiated actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminAction {
    Approve,
    Reject,
    Suspend,
    Reactivate,
    Cancel,
}

impl AdminAction {
    /// Every admin action.
    pub const ALL: [AdminAction; 5] = [
        Self::Approve,
        Self::Reject,
        Self::Suspend,
        Self::Reactivate,
        Self::Cancel,
    ];

    /// Whether the action needs a non-empty justification.
    pub fn requires_reason(&self) -> bool {
        matches!(self, Self::Reject | Self::Suspend)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
            Self::Suspend => "SUSPEND",
            Self::Reactivate => "REACTIVATE",
            Self::Cancel => "CANCEL",
        }
    }
}

impl std::fmt::Display for AdminAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AdminAction {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == upper)
            .ok_or_else(|| TransitionError::UnknownAction(s.to_string()))
    }
}

/// Anything that can move a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trigger {
    /// The payment gateway reported a successful charge.
    PaymentSucceeded,
    /// The payment gateway reported a failed charge.
    PaymentFailed,
    /// An operator action.
    Admin(AdminAction),
    /// The renewal timer found the term end within the window.
    RenewalWindowReached,
    /// The renewal timer found the term end in the past.
    EndDatePassed,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentSucceeded => "PAYMENT_SUCCEEDED",
            Self::PaymentFailed => "PAYMENT_FAILED",
            Self::Admin(action) => action.as_str(),
            Self::RenewalWindowReached => "RENEWAL_WINDOW_REACHED",
            Self::EndDatePassed => "END_DATE_PASSED",
        }
    }
}

impl From<AdminAction> for Trigger {
    fn from(action: AdminAction) -> Self {
        Self::Admin(action)
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Errors that can occur during subscription transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The (status, trigger) pair is not in the transition table.
    #[error("cannot {action} a subscription in status {from}")]
    InvalidTransition {
        from: SubscriptionStatus,
        action: Trigger,
    },

    /// The action needs a justification and none was given.
    #[error("{action} requires a non-empty reason")]
    ReasonRequired { action: AdminAction },

    /// The pair is in the table but a data guard refused it.
    #[error("{action} refused for subscription in status {from}: {reason}")]
    GuardRejected {
        from: SubscriptionStatus,
        action: Trigger,
        reason: String,
    },

    #[error("unknown subscription status {0:?}")]
    UnknownStatus(String),

    #[error("unknown admin action {0:?}")]
    UnknownAction(String),
}

// ─── Transition Table ───────────────────────────────────────────────

/// What a permitted transition does to the subscription term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermEffect {
    /// Dates untouched.
    Keep,
    /// `start = now`, `end = now + TERM_DAYS`.
    Start,
    /// `end = max(end, now) + TERM_DAYS`.
    Extend,
}

/// What a permitted transition does to the failed-payment counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEffect {
    Keep,
    Reset,
    /// Increment, saturating at [`RETRY_THRESHOLD`].
    Increment,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub to: SubscriptionStatus,
    pub term: TermEffect,
    pub retry: RetryEffect,
}

impl Rule {
    const fn to(to: SubscriptionStatus) -> Self {
        Self {
            to,
            term: TermEffect::Keep,
            retry: RetryEffect::Keep,
        }
    }

    /// Look up the table row for `(from, trigger)` given the current
    /// failed-payment count. `None` means the pair is not in the table.
    pub fn lookup(from: SubscriptionStatus, trigger: Trigger, retry_count: u8) -> Option<Rule> {
        use AdminAction as A;
        use SubscriptionStatus as S;

        match (from, trigger) {
            (S::Draft, Trigger::PaymentSucceeded) => Some(Rule {
                retry: RetryEffect::Reset,
                ..Rule::to(S::PendingApproval)
            }),
            (S::RenewalPending | S::Expired | S::Suspended, Trigger::PaymentSucceeded) => {
                Some(Rule {
                    to: S::Active,
                    term: TermEffect::Extend,
                    retry: RetryEffect::Reset,
                })
            }

            (S::PendingApproval, Trigger::Admin(A::Approve)) => Some(Rule {
                term: TermEffect::Start,
                ..Rule::to(S::Active)
            }),
            (S::PendingApproval, Trigger::Admin(A::Reject)) => Some(Rule::to(S::Rejected)),
            (S::Active, Trigger::Admin(A::Suspend)) => Some(Rule::to(S::Suspended)),
            (S::Suspended, Trigger::Admin(A::Reactivate)) => Some(Rule::to(S::Active)),
            (s, Trigger::Admin(A::Cancel)) if !s.is_terminal() => Some(Rule::to(S::Withdrawn)),

            (S::Active, Trigger::RenewalWindowReached) => Some(Rule::to(S::RenewalPending)),
            (S::Active | S::RenewalPending, Trigger::EndDatePassed) => Some(Rule::to(S::Expired)),

            (s, Trigger::PaymentFailed) => {
                let reaches_threshold = retry_count.saturating_add(1) >= RETRY_THRESHOLD;
                let to = match s {
                    S::Active | S::PendingApproval if reaches_threshold => S::Suspended,
                    other => other,
                };
                Some(Rule {
                    to,
                    term: TermEffect::Keep,
                    retry: RetryEffect::Increment,
                })
            }

            _ => None,
        }
    }

    /// Whether the table has any row for `(from, trigger)`.
    pub fn permits(from: SubscriptionStatus, trigger: Trigger) -> bool {
        Self::lookup(from, trigger, 0).is_some()
    }

    /// Admin actions the table permits from `status`.
    pub fn admin_actions(status: SubscriptionStatus) -> Vec<AdminAction> {
        AdminAction::ALL
            .into_iter()
            .filter(|action| Self::permits(status, Trigger::Admin(*action)))
            .collect()
    }
}

// ─── Transition Context & Record ────────────────────────────────────

/// Inputs the guards need besides the subscription itself.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    pub now: Timestamp,
    pub reason: Option<&'a str>,
}

impl<'a> TransitionContext<'a> {
    pub fn at(now: Timestamp) -> Self {
        Self { now, reason: None }
    }

    pub fn with_reason(now: Timestamp, reason: Option<&'a str>) -> Self {
        Self { now, reason }
    }
}

/// Record of an applied transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: SubscriptionStatus,
    pub to: SubscriptionStatus,
    pub trigger: Trigger,
    pub retry_before: u8,
    pub retry_after: u8,
    pub at: Timestamp,
}

impl TransitionRecord {
    /// Whether the status field moved (a failed payment below the
    /// threshold is a table row that leaves the status unchanged).
    pub fn changed_status(&self) -> bool {
        self.from != self.to
    }
}

// ─── Subscription ───────────────────────────────────────────────────

/// The subscription aggregate. Status, counter and term are private:
/// [`Subscription::apply`] is the only writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    id: SubscriptionId,
    account_id: AccountId,
    status: SubscriptionStatus,
    start_date: Option<Timestamp>,
    end_date: Option<Timestamp>,
    payment_method: Option<String>,
    retry_count: u8,
    gateway_customer_ref: Option<String>,
    version: u64,
    created_at: Timestamp,
    updated_at: Timestamp,
}

/// Plain field set used to rebuild a subscription from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub id: SubscriptionId,
    pub account_id: AccountId,
    pub status: SubscriptionStatus,
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
    pub payment_method: Option<String>,
    pub retry_count: u8,
    pub gateway_customer_ref: Option<String>,
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// A new subscription in the initial `DRAFT` status.
    pub fn draft(account_id: AccountId, now: Timestamp) -> Self {
        Self {
            id: SubscriptionId::new(),
            account_id,
            status: SubscriptionStatus::Draft,
            start_date: None,
            end_date: None,
            payment_method: None,
            retry_count: 0,
            gateway_customer_ref: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild from persisted fields. The retry counter is clamped to the
    /// threshold so a corrupt row cannot exceed it.
    pub fn restore(snapshot: SubscriptionSnapshot) -> Self {
        Self {
            id: snapshot.id,
            account_id: snapshot.account_id,
            status: snapshot.status,
            start_date: snapshot.start_date,
            end_date: snapshot.end_date,
            payment_method: snapshot.payment_method,
            retry_count: snapshot.retry_count.min(RETRY_THRESHOLD),
            gateway_customer_ref: snapshot.gateway_customer_ref,
            version: snapshot.version,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        }
    }

    pub fn snapshot(&self) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            id: self.id,
            account_id: self.account_id,
            status: self.status,
            start_date: self.start_date,
            end_date: self.end_date,
            payment_method: self.payment_method.clone(),
            retry_count: self.retry_count,
            gateway_customer_ref: self.gateway_customer_ref.clone(),
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.status
    }

    pub fn start_date(&self) -> Option<Timestamp> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<Timestamp> {
        self.end_date
    }

    pub fn payment_method(&self) -> Option<&str> {
        self.payment_method.as_deref()
    }

    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }

    pub fn gateway_customer_ref(&self) -> Option<&str> {
        self.gateway_customer_ref.as_deref()
    }

    /// Optimistic-concurrency version; bumped by the store on every write.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Whether the table permits `trigger` from the current status.
    pub fn accepts(&self, trigger: Trigger) -> bool {
        Rule::permits(self.status, trigger)
    }

    /// Apply a trigger through the transition table.
    ///
    /// On error nothing is modified.
    pub fn apply(
        &mut self,
        trigger: Trigger,
        ctx: TransitionContext<'_>,
    ) -> Result<TransitionRecord, TransitionError> {
        let from = self.status;
        let rule = Rule::lookup(from, trigger, self.retry_count).ok_or(
            TransitionError::InvalidTransition {
                from,
                action: trigger,
            },
        )?;
        self.check_guards(trigger, &ctx)?;

        let retry_before = self.retry_count;
        match rule.retry {
            RetryEffect::Keep => {}
            RetryEffect::Reset => self.retry_count = 0,
            RetryEffect::Increment => {
                self.retry_count = self.retry_count.saturating_add(1).min(RETRY_THRESHOLD)
            }
        }
        match rule.term {
            TermEffect::Keep => {}
            TermEffect::Start => {
                self.start_date = Some(ctx.now);
                self.end_date = Some(ctx.now.plus_days(TERM_DAYS));
            }
            TermEffect::Extend => {
                let base = match self.end_date {
                    Some(end) if end > ctx.now => end,
                    _ => ctx.now,
                };
                if self.start_date.is_none() {
                    self.start_date = Some(ctx.now);
                }
                self.end_date = Some(base.plus_days(TERM_DAYS));
            }
        }
        self.status = rule.to;
        self.updated_at = ctx.now;

        Ok(TransitionRecord {
            from,
            to: rule.to,
            trigger,
            retry_before,
            retry_after: self.retry_count,
            at: ctx.now,
        })
    }

    /// Reset the failed-payment counter for a successful payment that the
    /// table does not turn into a status change (e.g. an early payment while
    /// `ACTIVE`). Returns the previous count.
    pub fn clear_retries(&mut self, now: Timestamp) -> u8 {
        let previous = self.retry_count;
        self.retry_count = 0;
        self.updated_at = now;
        previous
    }

    /// Record the payment-gateway customer reference.
    pub fn attach_customer(&mut self, customer_ref: impl Into<String>, now: Timestamp) {
        self.gateway_customer_ref = Some(customer_ref.into());
        self.updated_at = now;
    }

    /// Record the method used for the most recent successful payment.
    pub fn set_payment_method(&mut self, method: impl Into<String>, now: Timestamp) {
        self.payment_method = Some(method.into());
        self.updated_at = now;
    }

    /// Advance the optimistic-concurrency version, returning the previous one.
    pub fn advance_version(&mut self) -> u64 {
        let previous = self.version;
        self.version += 1;
        previous
    }

    fn check_guards(&self, trigger: Trigger, ctx: &TransitionContext<'_>) -> Result<(), TransitionError> {
        match trigger {
            Trigger::Admin(action) if action.requires_reason() => {
                let has_reason = ctx.reason.is_some_and(|r| !r.trim().is_empty());
                if !has_reason {
                    return Err(TransitionError::ReasonRequired { action });
                }
            }
            Trigger::RenewalWindowReached => {
                let due = self
                    .end_date
                    .is_some_and(|end| ctx.now.days_until(&end) <= RENEWAL_WINDOW_DAYS);
                if !due {
                    return Err(self.guard_rejected(trigger, "term end is not within the renewal window"));
                }
            }
            Trigger::EndDatePassed => {
                let passed = self.end_date.is_some_and(|end| end < ctx.now);
                if !passed {
                    return Err(self.guard_rejected(trigger, "term end has not passed"));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn guard_rejected(&self, trigger: Trigger, reason: &str) -> TransitionError {
        TransitionError::GuardRejected {
            from: self.status,
            action: trigger,
            reason: reason.to_string(),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn now() -> Timestamp {
        Timestamp::parse("2026-04-01T09:00:00Z").unwrap()
    }

    fn in_status(status: SubscriptionStatus) -> Subscription {
        let mut snapshot = Subscription::draft(AccountId::new(), now()).snapshot();
        snapshot.status = status;
        if status.is_in_service() || status == SubscriptionStatus::Suspended {
            snapshot.start_date = Some(now().plus_days(-100));
            snapshot.end_date = Some(now().plus_days(265));
        }
        Subscription::restore(snapshot)
    }

    fn admin(sub: &mut Subscription, action: AdminAction, reason: Option<&str>) -> Result<TransitionRecord, TransitionError> {
        sub.apply(action.into(), TransitionContext::with_reason(now(), reason))
    }

    // ── Happy paths ────────────────────────────────────────────────

    #[test]
    fn draft_payment_moves_to_pending_approval() {
        let mut sub = Subscription::draft(AccountId::new(), now());
        let record = sub.apply(Trigger::PaymentSucceeded, TransitionContext::at(now())).unwrap();
        assert_eq!(record.from, SubscriptionStatus::Draft);
        assert_eq!(sub.status(), SubscriptionStatus::PendingApproval);
        assert!(sub.end_date().is_none());
    }

    #[test]
    fn approve_starts_one_year_term() {
        let mut sub = in_status(SubscriptionStatus::PendingApproval);
        admin(&mut sub, AdminAction::Approve, None).unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Active);
        assert_eq!(sub.start_date(), Some(now()));
        assert_eq!(sub.end_date(), Some(now().plus_days(365)));
    }

    #[test]
    fn reject_requires_reason() {
        let mut sub = in_status(SubscriptionStatus::PendingApproval);
        assert_eq!(
            admin(&mut sub, AdminAction::Reject, None),
            Err(TransitionError::ReasonRequired { action: AdminAction::Reject })
        );
        assert_eq!(
            admin(&mut sub, AdminAction::Reject, Some("   ")),
            Err(TransitionError::ReasonRequired { action: AdminAction::Reject })
        );
        assert_eq!(sub.status(), SubscriptionStatus::PendingApproval);

        admin(&mut sub, AdminAction::Reject, Some("KYC documents illegible")).unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Rejected);
    }

    #[test]
    fn suspend_and_reactivate_keep_term() {
        let mut sub = in_status(SubscriptionStatus::Active);
        let end = sub.end_date();
        admin(&mut sub, AdminAction::Suspend, Some("address proof expired")).unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Suspended);
        admin(&mut sub, AdminAction::Reactivate, None).unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Active);
        assert_eq!(sub.end_date(), end);
    }

    #[test]
    fn cancel_allowed_from_every_non_terminal_status() {
        for status in SubscriptionStatus::ALL {
            let mut sub = in_status(status);
            let result = admin(&mut sub, AdminAction::Cancel, None);
            if status.is_terminal() {
                assert!(matches!(result, Err(TransitionError::InvalidTransition { .. })));
                assert_eq!(sub.status(), status);
            } else {
                result.unwrap();
                assert_eq!(sub.status(), SubscriptionStatus::Withdrawn);
            }
        }
    }

    #[test]
    fn renewal_window_guard() {
        let mut sub = in_status(SubscriptionStatus::Active);
        let err = sub
            .apply(Trigger::RenewalWindowReached, TransitionContext::at(now()))
            .unwrap_err();
        assert!(matches!(err, TransitionError::GuardRejected { .. }));

        let later = now().plus_days(240);
        sub.apply(Trigger::RenewalWindowReached, TransitionContext::at(later)).unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::RenewalPending);
    }

    #[test]
    fn end_date_passed_expires_active_and_renewal_pending() {
        for status in [SubscriptionStatus::Active, SubscriptionStatus::RenewalPending] {
            let mut sub = in_status(status);
            assert!(sub.apply(Trigger::EndDatePassed, TransitionContext::at(now())).is_err());
            sub.apply(Trigger::EndDatePassed, TransitionContext::at(now().plus_days(266)))
                .unwrap();
            assert_eq!(sub.status(), SubscriptionStatus::Expired);
        }
    }

    #[test]
    fn renewal_payment_extends_from_current_end() {
        let mut sub = in_status(SubscriptionStatus::RenewalPending);
        let end = sub.end_date().unwrap();
        sub.apply(Trigger::PaymentSucceeded, TransitionContext::at(now())).unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Active);
        assert_eq!(sub.end_date(), Some(end.plus_days(365)));
    }

    #[test]
    fn expired_payment_extends_from_now() {
        let mut sub = in_status(SubscriptionStatus::Expired);
        let late = now().plus_days(400);
        sub.apply(Trigger::PaymentSucceeded, TransitionContext::at(late)).unwrap();
        assert_eq!(sub.status(), SubscriptionStatus::Active);
        assert_eq!(sub.end_date(), Some(late.plus_days(365)));
    }

    // ── Failed payments ────────────────────────────────────────────

    #[test]
    fn three_failures_suspend_active_subscription() {
        let mut sub = in_status(SubscriptionStatus::Active);
        for expected in 1..=2u8 {
            let record = sub.apply(Trigger::PaymentFailed, TransitionContext::at(now())).unwrap();
            assert!(!record.changed_status());
            assert_eq!(sub.retry_count(), expected);
            assert_eq!(sub.status(), SubscriptionStatus::Active);
        }
        let record = sub.apply(Trigger::PaymentFailed, TransitionContext::at(now())).unwrap();
        assert!(record.changed_status());
        assert_eq!(sub.retry_count(), 3);
        assert_eq!(sub.status(), SubscriptionStatus::Suspended);
    }

    #[test]
    fn retry_count_saturates_at_threshold() {
        let mut sub = Subscription::draft(AccountId::new(), now());
        for _ in 0..6 {
            sub.apply(Trigger::PaymentFailed, TransitionContext::at(now())).unwrap();
        }
        assert_eq!(sub.retry_count(), RETRY_THRESHOLD);
        assert_eq!(sub.status(), SubscriptionStatus::Draft);
    }

    #[test]
    fn success_resets_retry_count() {
        let mut sub = Subscription::draft(AccountId::new(), now());
        sub.apply(Trigger::PaymentFailed, TransitionContext::at(now())).unwrap();
        sub.apply(Trigger::PaymentFailed, TransitionContext::at(now())).unwrap();
        sub.apply(Trigger::PaymentSucceeded, TransitionContext::at(now())).unwrap();
        assert_eq!(sub.retry_count(), 0);
    }

    #[test]
    fn clear_retries_leaves_status() {
        let mut sub = in_status(SubscriptionStatus::Active);
        sub.apply(Trigger::PaymentFailed, TransitionContext::at(now())).unwrap();
        assert!(!sub.accepts(Trigger::PaymentSucceeded));
        assert_eq!(sub.clear_retries(now()), 1);
        assert_eq!(sub.retry_count(), 0);
        assert_eq!(sub.status(), SubscriptionStatus::Active);
    }

    // ── Table-driven invalid transitions ───────────────────────────

    #[test]
    fn invalid_transition_names_state_and_action() {
        let mut sub = Subscription::draft(AccountId::new(), now());
        let err = admin(&mut sub, AdminAction::Approve, None).unwrap_err();
        assert_eq!(err.to_string(), "cannot APPROVE a subscription in status DRAFT");
    }

    #[test]
    fn invalid_pair_wins_over_missing_reason() {
        let mut sub = in_status(SubscriptionStatus::Draft);
        let err = admin(&mut sub, AdminAction::Reject, None).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn admin_actions_follow_table() {
        use AdminAction::*;
        assert_eq!(Rule::admin_actions(SubscriptionStatus::Draft), vec![Cancel]);
        assert_eq!(
            Rule::admin_actions(SubscriptionStatus::PendingApproval),
            vec![Approve, Reject, Cancel]
        );
        assert_eq!(Rule::admin_actions(SubscriptionStatus::Active), vec![Suspend, Cancel]);
        assert_eq!(
            Rule::admin_actions(SubscriptionStatus::Suspended),
            vec![Reactivate, Cancel]
        );
        assert!(Rule::admin_actions(SubscriptionStatus::Withdrawn).is_empty());
        assert!(Rule::admin_actions(SubscriptionStatus::Rejected).is_empty());
    }

    fn any_status() -> impl Strategy<Value = SubscriptionStatus> {
        prop::sample::select(SubscriptionStatus::ALL.to_vec())
    }

    fn any_action() -> impl Strategy<Value = AdminAction> {
        prop::sample::select(AdminAction::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn actions_outside_table_never_mutate(status in any_status(), action in any_action()) {
            let mut sub = in_status(status);
            let before = sub.clone();
            let result = admin(&mut sub, action, Some("operator note"));
            if Rule::permits(status, Trigger::Admin(action)) {
                prop_assert!(result.is_ok());
            } else {
                let is_invalid = matches!(result, Err(TransitionError::InvalidTransition { .. }));
                prop_assert!(is_invalid);
                prop_assert_eq!(sub, before);
            }
        }

        #[test]
        fn retry_never_exceeds_threshold(status in any_status(), failures in 0usize..10) {
            let mut sub = in_status(status);
            for _ in 0..failures {
                sub.apply(Trigger::PaymentFailed, TransitionContext::at(now())).unwrap();
                prop_assert!(sub.retry_count() <= RETRY_THRESHOLD);
            }
        }
    }

    // ── Parsing & serialization ────────────────────────────────────

    #[test]
    fn status_round_trips_through_str() {
        for status in SubscriptionStatus::ALL {
            assert_eq!(status.as_str().parse::<SubscriptionStatus>().unwrap(), status);
        }
        assert!("PAUSED".parse::<SubscriptionStatus>().is_err());
    }

    #[test]
    fn admin_action_parses_case_insensitively() {
        assert_eq!("reject".parse::<AdminAction>().unwrap(), AdminAction::Reject);
        assert!("delete".parse::<AdminAction>().is_err());
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&SubscriptionStatus::PendingApproval).unwrap();
        assert_eq!(json, "\"PENDING_APPROVAL\"");
    }

    #[test]
    fn restore_clamps_corrupt_retry_count() {
        let mut snapshot = Subscription::draft(AccountId::new(), now()).snapshot();
        snapshot.retry_count = 9;
        assert_eq!(Subscription::restore(snapshot).retry_count(), RETRY_THRESHOLD);
    }
}
