//! # Payment Status
//!
//! A payment row is immutable once recorded except for its status, which
//! moves `PENDING → SUCCEEDED | FAILED` and `SUCCEEDED → REFUNDED`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rosp_core::{PaymentId, SubscriptionId, Timestamp};

/// Status of one payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        Self::Pending,
        Self::Succeeded,
        Self::Failed,
        Self::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Valid next statuses.
    pub fn valid_transitions(&self) -> &'static [PaymentStatus] {
        match self {
            Self::Pending => &[Self::Succeeded, Self::Failed],
            Self::Succeeded => &[Self::Refunded],
            Self::Failed | Self::Refunded => &[],
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| PaymentError::UnknownStatus(s.to_string()))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("unknown payment status {0:?}")]
    UnknownStatus(String),
}

/// One payment attempt against a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub subscription_id: SubscriptionId,
    pub amount_minor: i64,
    pub currency: String,
    pub method: Option<String>,
    /// Gateway transaction id; unique across all payments.
    pub transaction_id: String,
    status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Payment {
    fn new(
        subscription_id: SubscriptionId,
        transaction_id: impl Into<String>,
        amount_minor: i64,
        currency: impl Into<String>,
        status: PaymentStatus,
        now: Timestamp,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            subscription_id,
            amount_minor,
            currency: currency.into(),
            method: None,
            transaction_id: transaction_id.into(),
            status,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn pending(
        subscription_id: SubscriptionId,
        transaction_id: impl Into<String>,
        amount_minor: i64,
        currency: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self::new(subscription_id, transaction_id, amount_minor, currency, PaymentStatus::Pending, now)
    }

    pub fn succeeded(
        subscription_id: SubscriptionId,
        transaction_id: impl Into<String>,
        amount_minor: i64,
        currency: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self::new(subscription_id, transaction_id, amount_minor, currency, PaymentStatus::Succeeded, now)
    }

    pub fn failed(
        subscription_id: SubscriptionId,
        transaction_id: impl Into<String>,
        amount_minor: i64,
        currency: impl Into<String>,
        reason: Option<String>,
        now: Timestamp,
    ) -> Self {
        let mut payment =
            Self::new(subscription_id, transaction_id, amount_minor, currency, PaymentStatus::Failed, now);
        payment.failure_reason = reason;
        payment
    }

    /// Rebuild from a persisted row.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: PaymentId,
        subscription_id: SubscriptionId,
        amount_minor: i64,
        currency: String,
        method: Option<String>,
        transaction_id: String,
        status: PaymentStatus,
        failure_reason: Option<String>,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            id,
            subscription_id,
            amount_minor,
            currency,
            method,
            transaction_id,
            status,
            failure_reason,
            created_at,
            updated_at,
        }
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    /// Settle a pending payment as succeeded. Already-succeeded rows are left
    /// as they are.
    pub fn record_succeeded(&mut self, now: Timestamp) -> Result<(), PaymentError> {
        if self.status == PaymentStatus::Succeeded {
            return Ok(());
        }
        self.move_to(PaymentStatus::Succeeded, now)
    }

    /// Settle a pending payment as failed. Already-failed rows keep their
    /// original reason.
    pub fn record_failed(&mut self, reason: Option<String>, now: Timestamp) -> Result<(), PaymentError> {
        if self.status == PaymentStatus::Failed {
            return Ok(());
        }
        self.move_to(PaymentStatus::Failed, now)?;
        self.failure_reason = reason;
        Ok(())
    }

    /// Mark a succeeded payment as refunded.
    pub fn mark_refunded(&mut self, now: Timestamp) -> Result<(), PaymentError> {
        self.move_to(PaymentStatus::Refunded, now)
    }

    fn move_to(&mut self, to: PaymentStatus, now: Timestamp) -> Result<(), PaymentError> {
        if !self.status.valid_transitions().contains(&to) {
            return Err(PaymentError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}
