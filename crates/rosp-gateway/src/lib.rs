//! # rosp-gateway — External Collaborators
//!
//! Every call the portal makes to a system it does not own goes through a
//! trait defined here:
//!
//! - **Payments** ([`PaymentGateway`]): customers, hosted checkout, refunds.
//!   Inbound events are verified and parsed by [`webhook`].
//! - **Email** ([`Mailer`]).
//! - **Document storage** ([`DocumentStore`]): KYC uploads, signed agreements.
//! - **Agreement rendering** ([`AgreementRenderer`]).
//! - **Company registry** ([`CompanyRegistry`]): lookups for form prefill.
//!
//! Each trait has a reqwest-backed HTTP implementation, an
//! [`unconfigured::Unconfigured`] stand-in, and a recording double in
//! [`mock`]. The engine only ever sees `Arc<dyn Trait>` via [`Collaborators`].

pub mod config;
pub mod error;
pub(crate) mod http;
pub mod mail;
pub mod mock;
pub mod payments;
pub mod registry;
pub mod renderer;
pub mod storage;
pub mod unconfigured;
pub mod webhook;

pub use config::{ConfigError, GatewayConfig, ServiceEndpoint};
pub use error::GatewayError;
pub use mail::{Email, HttpMailer, Mailer};
pub use payments::{
    CheckoutRequest, CheckoutSession, CustomerRequest, GatewayCustomer, HttpPaymentGateway,
    PaymentGateway, RefundReceipt, RefundRequest,
};
pub use registry::{CompanyProfile, CompanyRegistry, CompanySummary, HttpCompanyRegistry, Officer};
pub use renderer::{AgreementRenderRequest, AgreementRenderer, HttpAgreementRenderer};
pub use storage::{DocumentStore, HttpDocumentStore, StoredObject};
pub use unconfigured::Unconfigured;
pub use webhook::{PaymentEvent, PaymentEventKind, WebhookError, WebhookVerifier};

use std::sync::Arc;

/// The set of collaborators injected into the engine.
#[derive(Clone)]
pub struct Collaborators {
    pub payments: Arc<dyn PaymentGateway>,
    pub mailer: Arc<dyn Mailer>,
    pub documents: Arc<dyn DocumentStore>,
    pub renderer: Arc<dyn AgreementRenderer>,
    pub registry: Arc<dyn CompanyRegistry>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Build HTTP clients for every configured service; unconfigured
    /// services get an [`Unconfigured`] stand-in.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let timeout = config.timeout_secs;

        let payments: Arc<dyn PaymentGateway> = match &config.payments {
            Some(ep) => Arc::new(HttpPaymentGateway::new(ep.clone(), timeout)?),
            None => Arc::new(Unconfigured::new("payments")),
        };
        let mailer: Arc<dyn Mailer> = match &config.mailer {
            Some(ep) => Arc::new(HttpMailer::new(ep.clone(), config.mail_from.clone(), timeout)?),
            None => Arc::new(Unconfigured::new("mailer")),
        };
        let documents: Arc<dyn DocumentStore> = match &config.storage {
            Some(ep) => Arc::new(HttpDocumentStore::new(ep.clone(), timeout)?),
            None => Arc::new(Unconfigured::new("storage")),
        };
        let renderer: Arc<dyn AgreementRenderer> = match &config.renderer {
            Some(ep) => Arc::new(HttpAgreementRenderer::new(ep.clone(), timeout)?),
            None => Arc::new(Unconfigured::new("renderer")),
        };
        let registry: Arc<dyn CompanyRegistry> = match &config.registry {
            Some(ep) => Arc::new(HttpCompanyRegistry::new(ep.clone(), timeout)?),
            None => Arc::new(Unconfigured::new("registry")),
        };

        let configured = [
            ("payments", config.payments.is_some()),
            ("mailer", config.mailer.is_some()),
            ("storage", config.storage.is_some()),
            ("renderer", config.renderer.is_some()),
            ("registry", config.registry.is_some()),
        ];
        for (service, present) in configured {
            if !present {
                tracing::warn!(service, "collaborator not configured; related side effects will fail");
            }
        }

        Ok(Self {
            payments,
            mailer,
            documents,
            renderer,
            registry,
        })
    }

    /// Every collaborator unconfigured.
    pub fn unconfigured() -> Self {
        Self {
            payments: Arc::new(Unconfigured::new("payments")),
            mailer: Arc::new(Unconfigured::new("mailer")),
            documents: Arc::new(Unconfigured::new("storage")),
            renderer: Arc::new(Unconfigured::new("renderer")),
            registry: Arc::new(Unconfigured::new("registry")),
        }
    }
}
