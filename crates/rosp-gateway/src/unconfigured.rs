//! Stand-in for collaborators with no configuration. Every call fails with
//! [`GatewayError::NotConfigured`], which callers treat like any other
//! external failure.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::mail::{Email, Mailer};
use crate::payments::{
    CheckoutRequest, CheckoutSession, CustomerRequest, GatewayCustomer, PaymentGateway,
    RefundReceipt, RefundRequest,
};
use crate::registry::{CompanyProfile, CompanyRegistry, CompanySummary};
use crate::renderer::{AgreementRenderRequest, AgreementRenderer};
use crate::storage::{DocumentStore, StoredObject};

#[derive(Debug, Clone, Copy)]
pub struct Unconfigured {
    service: &'static str,
}

impl Unconfigured {
    pub fn new(service: &'static str) -> Self {
        Self { service }
    }

    fn err(&self) -> GatewayError {
        GatewayError::NotConfigured {
            service: self.service,
        }
    }
}

#[async_trait]
impl PaymentGateway for Unconfigured {
    async fn create_customer(&self, _: &CustomerRequest) -> Result<GatewayCustomer, GatewayError> {
        Err(self.err())
    }

    async fn create_checkout_session(&self, _: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        Err(self.err())
    }

    async fn refund(&self, _: &RefundRequest) -> Result<RefundReceipt, GatewayError> {
        Err(self.err())
    }
}

#[async_trait]
impl Mailer for Unconfigured {
    async fn send(&self, email: &Email) -> Result<(), GatewayError> {
        tracing::debug!(to = %email.to, subject = %email.subject, "mailer not configured, dropping email");
        Err(self.err())
    }
}

#[async_trait]
impl DocumentStore for Unconfigured {
    async fn store(&self, _: &str, _: &[u8], _: &str) -> Result<StoredObject, GatewayError> {
        Err(self.err())
    }
}

#[async_trait]
impl AgreementRenderer for Unconfigured {
    async fn render(&self, _: &AgreementRenderRequest) -> Result<Vec<u8>, GatewayError> {
        Err(self.err())
    }
}

#[async_trait]
impl CompanyRegistry for Unconfigured {
    async fn search(&self, _: &str) -> Result<Vec<CompanySummary>, GatewayError> {
        Err(self.err())
    }

    async fn profile(&self, _: &str) -> Result<Option<CompanyProfile>, GatewayError> {
        Err(self.err())
    }
}
