//! # Identity Newtypes
//!
//! Domain-primitive newtypes for identifiers throughout the portal.
//! Each identifier is a distinct type; a [`PaymentId`] cannot be passed
//! where a [`SubscriptionId`] is expected.
//!
//! ## Validation
//!
//! String-based identity keys ([`EmailAddress`], [`CompanyNumber`]) validate
//! and normalise at construction time. Two registrations that differ only in
//! letter case or whitespace produce equal keys, which is what the duplicate
//! guard relies on. UUID-based identifiers are always valid by construction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// UUID-based identifiers (always valid by construction)
// ---------------------------------------------------------------------------

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID (e.g. a database key).
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// A portal login: one per registered client, plus operator accounts.
    AccountId
);
uuid_id!(
    /// The business a client account registers for the service.
    BusinessProfileId
);
uuid_id!(
    /// A director attached to a business profile for KYC review.
    DirectorId
);
uuid_id!(
    /// A versioned service-agreement template.
    TemplateId
);
uuid_id!(
    /// A signed (or pending) service agreement.
    AgreementId
);
uuid_id!(
    /// The single subscription an account holds.
    SubscriptionId
);
uuid_id!(
    /// A payment attempt recorded against a subscription.
    PaymentId
);
uuid_id!(
    /// An in-app notification addressed to one account.
    NotificationId
);

// ---------------------------------------------------------------------------
// Normalised string identity keys
// ---------------------------------------------------------------------------

/// Maximum length of an email address (RFC 5321 path limit).
const MAX_EMAIL_LEN: usize = 254;

/// Maximum length of a company registration number after normalisation.
const MAX_COMPANY_NUMBER_LEN: usize = 16;

/// An email address, trimmed and lower-cased.
///
/// Comparison is case-insensitive by construction: `Ada@Example.COM` and
/// `ada@example.com` produce the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Validate and normalise an email address.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalised = raw.trim().to_lowercase();
        if normalised.is_empty() || normalised.len() > MAX_EMAIL_LEN {
            return Err(ValidationError::InvalidEmail(raw.to_string()));
        }
        if normalised.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidEmail(raw.to_string()));
        }
        let (local, domain) = normalised
            .split_once('@')
            .ok_or_else(|| ValidationError::InvalidEmail(raw.to_string()))?;
        let domain_ok = !domain.contains('@')
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.');
        if local.is_empty() || !domain_ok {
            return Err(ValidationError::InvalidEmail(raw.to_string()));
        }
        Ok(Self(normalised))
    }

    /// The normalised address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EmailAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A company registration number, upper-cased with all whitespace removed.
///
/// `sc 123456` and `SC123456` are the same company.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CompanyNumber(String);

impl CompanyNumber {
    /// Validate and normalise a company registration number.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalised: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if normalised.is_empty()
            || normalised.len() > MAX_COMPANY_NUMBER_LEN
            || !normalised.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ValidationError::InvalidCompanyNumber(raw.to_string()));
        }
        Ok(Self(normalised))
    }

    /// The normalised number.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CompanyNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CompanyNumber {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
