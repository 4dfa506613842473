//! # Identity & Duplicate Guard
//!
//! One client per email address and one client per company number. The
//! authoritative check runs inside the registration unit of work and again
//! as a unique constraint when it commits; [`Engine::check_availability`] is an advisory read for
//! forms and can be stale by the time the client submits.

use serde::Serialize;

use rosp_core::{CompanyNumber, EmailAddress};

use crate::error::LifecycleError;
use crate::ledger::UnitOfWork;
use crate::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub email_taken: bool,
    pub company_taken: bool,
}

impl Availability {
    pub fn is_available(&self) -> bool {
        !self.email_taken && !self.company_taken
    }
}

/// Check both keys against committed and staged rows.
pub fn check_available(
    uow: &UnitOfWork<'_>,
    email: &EmailAddress,
    company_number: &CompanyNumber,
) -> Availability {
    Availability {
        email_taken: uow.email_taken(email),
        company_taken: uow.company_taken(company_number),
    }
}

/// Fail with [`LifecycleError::DuplicateIdentity`] naming every taken key.
pub fn ensure_available(
    uow: &UnitOfWork<'_>,
    email: &EmailAddress,
    company_number: &CompanyNumber,
) -> Result<(), LifecycleError> {
    let availability = check_available(uow, email, company_number);
    if availability.is_available() {
        Ok(())
    } else {
        Err(LifecycleError::DuplicateIdentity {
            email_taken: availability.email_taken,
            company_taken: availability.company_taken,
        })
    }
}

impl Engine {
    /// Advisory availability check. Inputs are normalised the same way
    /// registration normalises them.
    pub async fn check_availability(
        &self,
        email: &str,
        company_number: &str,
    ) -> Result<Availability, LifecycleError> {
        let email = EmailAddress::parse(email)?;
        let company_number = CompanyNumber::parse(company_number)?;
        self.ledger
            .read(|t| Availability {
                email_taken: t.email_taken(&email),
                company_taken: t.company_taken(&company_number),
            })
            .await
    }
}
