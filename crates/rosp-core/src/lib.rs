//! # rosp-core — Foundational Types for the Registered-Office Portal
//!
//! Every other crate in the workspace depends on `rosp-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `AccountId`, `SubscriptionId`,
//!    `PaymentId` and friends are distinct types. An `AccountId` cannot be
//!    passed where a `SubscriptionId` is expected.
//!
//! 2. **Normalised identity keys.** [`EmailAddress`] and [`CompanyNumber`]
//!    normalise at construction, so duplicate detection is a plain equality
//!    check everywhere downstream.
//!
//! 3. **UTC-only timestamps.** [`Timestamp`] is UTC, seconds precision, and
//!    carries the calendar arithmetic the subscription term needs.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `rosp-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

pub use digest::{sha256_hex, ContentDigest};
pub use error::{CoreError, ValidationError};
pub use identity::{
    AccountId, AgreementId, BusinessProfileId, CompanyNumber, DirectorId, EmailAddress,
    NotificationId, PaymentId, SubscriptionId, TemplateId,
};
pub use temporal::Timestamp;
