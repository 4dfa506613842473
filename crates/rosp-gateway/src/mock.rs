//! In-process collaborator doubles for tests and local development.
//!
//! Each double records what it was asked to do and can be switched into a
//! failing mode, so degraded-mode paths can be exercised without a network.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::GatewayError;
use crate::mail::{Email, Mailer};
use crate::payments::{
    CheckoutRequest, CheckoutSession, CustomerRequest, GatewayCustomer, PaymentGateway,
    RefundReceipt, RefundRequest,
};
use crate::registry::{CompanyProfile, CompanyRegistry, CompanySummary};
use crate::renderer::{AgreementRenderRequest, AgreementRenderer};
use crate::storage::{DocumentStore, StoredObject};
use crate::Collaborators;

fn unavailable(service: &'static str) -> GatewayError {
    GatewayError::Unavailable {
        service,
        reason: "mock set to fail".into(),
    }
}

// ─── Payment Gateway ────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockPaymentGateway {
    failing: AtomicBool,
    counter: AtomicU32,
    customers: Mutex<Vec<CustomerRequest>>,
    sessions: Mutex<Vec<CheckoutRequest>>,
    refunds: Mutex<Vec<RefundRequest>>,
}

impl MockPaymentGateway {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn customers(&self) -> Vec<CustomerRequest> {
        self.customers.lock().clone()
    }

    pub fn sessions(&self) -> Vec<CheckoutRequest> {
        self.sessions.lock().clone()
    }

    /// Every refund attempted, including ones that were made to fail.
    pub fn refunds(&self) -> Vec<RefundRequest> {
        self.refunds.lock().clone()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_mock_{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_customer(&self, req: &CustomerRequest) -> Result<GatewayCustomer, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("payments"));
        }
        self.customers.lock().push(req.clone());
        Ok(GatewayCustomer {
            id: self.next_id("cus"),
        })
    }

    async fn create_checkout_session(
        &self,
        req: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("payments"));
        }
        self.sessions.lock().push(req.clone());
        let id = self.next_id("cs");
        Ok(CheckoutSession {
            url: format!("https://checkout.mock/{id}"),
            id,
        })
    }

    async fn refund(&self, req: &RefundRequest) -> Result<RefundReceipt, GatewayError> {
        self.refunds.lock().push(req.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("payments"));
        }
        Ok(RefundReceipt {
            id: self.next_id("re"),
            status: "pending".into(),
        })
    }
}

// ─── Mailer ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockMailer {
    failing: AtomicBool,
    sent: Mutex<Vec<Email>>,
}

impl MockMailer {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successfully delivered messages.
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().iter().map(|e| e.subject.clone()).collect()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, email: &Email) -> Result<(), GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("mailer"));
        }
        self.sent.lock().push(email.clone());
        Ok(())
    }
}

// ─── Document Store ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockDocumentStore {
    failing: AtomicBool,
    objects: Mutex<Vec<(String, String, usize)>>,
}

impl MockDocumentStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// `(key, media_type, len)` of every stored object.
    pub fn objects(&self) -> Vec<(String, String, usize)> {
        self.objects.lock().clone()
    }
}

#[async_trait]
impl DocumentStore for MockDocumentStore {
    async fn store(
        &self,
        key: &str,
        bytes: &[u8],
        media_type: &str,
    ) -> Result<StoredObject, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("storage"));
        }
        self.objects
            .lock()
            .push((key.to_string(), media_type.to_string(), bytes.len()));
        Ok(StoredObject {
            key: key.to_string(),
            url: None,
        })
    }
}

// ─── Renderer ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockAgreementRenderer {
    failing: AtomicBool,
}

impl MockAgreementRenderer {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgreementRenderer for MockAgreementRenderer {
    async fn render(&self, req: &AgreementRenderRequest) -> Result<Vec<u8>, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("renderer"));
        }
        Ok(format!("%PDF-1.7\n% agreement {} signed by {}\n", req.agreement_id, req.signer_name).into_bytes())
    }
}

// ─── Company Registry ───────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockCompanyRegistry {
    companies: Mutex<Vec<CompanyProfile>>,
}

impl MockCompanyRegistry {
    pub fn insert(&self, profile: CompanyProfile) {
        self.companies.lock().push(profile);
    }
}

#[async_trait]
impl CompanyRegistry for MockCompanyRegistry {
    async fn search(&self, query: &str) -> Result<Vec<CompanySummary>, GatewayError> {
        let needle = query.to_lowercase();
        Ok(self
            .companies
            .lock()
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&needle) || c.number.eq_ignore_ascii_case(query))
            .map(|c| CompanySummary {
                name: c.name.clone(),
                number: c.number.clone(),
                kind: c.kind.clone(),
                status: c.status.clone(),
                address: c.registered_address.clone(),
            })
            .collect())
    }

    async fn profile(&self, number: &str) -> Result<Option<CompanyProfile>, GatewayError> {
        Ok(self
            .companies
            .lock()
            .iter()
            .find(|c| c.number.eq_ignore_ascii_case(number))
            .cloned())
    }
}

// ─── Bundle ─────────────────────────────────────────────────────────

/// Handles to every double, plus a [`Collaborators`] wired to them.
#[derive(Debug, Clone, Default)]
pub struct MockSet {
    pub payments: Arc<MockPaymentGateway>,
    pub mailer: Arc<MockMailer>,
    pub documents: Arc<MockDocumentStore>,
    pub renderer: Arc<MockAgreementRenderer>,
    pub registry: Arc<MockCompanyRegistry>,
}

impl MockSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            payments: self.payments.clone(),
            mailer: self.mailer.clone(),
            documents: self.documents.clone(),
            renderer: self.renderer.clone(),
            registry: self.registry.clone(),
        }
    }

    /// Make every outbound call fail.
    pub fn fail_all(&self) {
        self.payments.set_failing(true);
        self.mailer.set_failing(true);
        self.documents.set_failing(true);
        self.renderer.set_failing(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosp_core::{AccountId, EmailAddress};

    #[tokio::test]
    async fn failing_refund_is_still_recorded() {
        let gateway = MockPaymentGateway::default();
        gateway.set_failing(true);
        let req = RefundRequest {
            transaction_id: "txn_1".into(),
            amount_minor: 100,
            currency: "GBP".into(),
            idempotency_key: "refund-1".into(),
        };
        assert!(gateway.refund(&req).await.is_err());
        assert_eq!(gateway.refunds().len(), 1);
    }

    #[tokio::test]
    async fn customer_ids_are_distinct() {
        let gateway = MockPaymentGateway::default();
        let req = CustomerRequest {
            email: EmailAddress::parse("a@example.com").unwrap(),
            name: "A".into(),
            account_id: AccountId::new(),
        };
        let a = gateway.create_customer(&req).await.unwrap();
        let b = gateway.create_customer(&req).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn registry_search_matches_name_and_number() {
        let registry = MockCompanyRegistry::default();
        registry.insert(CompanyProfile {
            name: "Acme Widgets Ltd".into(),
            number: "01234567".into(),
            kind: Some("ltd".into()),
            status: Some("active".into()),
            incorporated_on: None,
            registered_address: None,
            officers: vec![],
        });
        assert_eq!(registry.search("widgets").await.unwrap().len(), 1);
        assert_eq!(registry.search("01234567").await.unwrap().len(), 1);
        assert!(registry.profile("99999999").await.unwrap().is_none());
    }
}
