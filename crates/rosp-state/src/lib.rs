//! # rosp-state — Subscription Lifecycle State Machine
//!
//! The authoritative status model for a client's standing. Every status
//! change in the system goes through [`Subscription::apply`], which consults
//! a single transition table; nothing else writes the status field.
//!
//! ## State Machines
//!
//! - **Subscription** (`subscription.rs`): `DRAFT → PENDING_APPROVAL → ACTIVE`
//!   with `SUSPENDED`, `RENEWAL_PENDING`, `EXPIRED` branches and the
//!   terminal-ish `REJECTED` / `WITHDRAWN`. Driven by payment events,
//!   operator actions, and the renewal timer.
//!
//! - **Payment** (`payment.rs`): `PENDING → SUCCEEDED | FAILED`,
//!   `SUCCEEDED → REFUNDED`.
//!
//! - **Presentation** (`presentation.rs`): the read-only view every UI
//!   surface renders. Badge tone and offered actions are derived from the
//!   same table that enforces transitions.

pub mod payment;
pub mod presentation;
pub mod subscription;

pub use payment::{Payment, PaymentError, PaymentStatus};
pub use presentation::{StatusTone, StatusView};
pub use subscription::{
    AdminAction, RetryEffect, Rule, Subscription, SubscriptionSnapshot, SubscriptionStatus,
    TermEffect, TransitionContext, TransitionError, TransitionRecord, Trigger,
    RENEWAL_WINDOW_DAYS, RETRY_THRESHOLD, TERM_DAYS,
};
