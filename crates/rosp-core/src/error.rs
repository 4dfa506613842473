//! # Error Types
//!
//! Errors raised by the foundational types. Higher crates wrap these in
//! their own `thiserror` enums; nothing here knows about HTTP or storage.

use thiserror::Error;

/// Top-level error type for `rosp-core`.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A value failed format validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A timestamp could not be parsed or represented.
    #[error("temporal error: {0}")]
    Temporal(String),
}

/// Format validation failures for identity values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Email address is empty or not of the form `local@domain.tld`.
    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),

    /// Company registration number is empty, too long, or contains
    /// characters other than ASCII letters and digits.
    #[error("invalid company registration number: {0:?}")]
    InvalidCompanyNumber(String),

    /// A required field was missing or blank.
    #[error("{0} must not be empty")]
    Missing(&'static str),
}
