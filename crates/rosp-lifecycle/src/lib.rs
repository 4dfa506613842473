//! # rosp-lifecycle — Client Lifecycle Engine
//!
//! Owns every state change a client goes through, from registration to
//! renewal:
//!
//! - **Registration** ([`registration`]): the atomic record bundle plus
//!   post-commit side effects.
//! - **Payment reconciliation** ([`reconciliation`]): idempotent application
//!   of gateway events.
//! - **Admin actions** ([`admin`]): operator transitions, refunds on reject.
//! - **Renewal sweep** ([`renewal`]): the scheduled end-of-term transitions.
//! - **Audit & notifications** ([`audit`], [`notifications`]).
//!
//! All mutations run through the [`ledger::Ledger`]. Collaborator calls
//! never happen inside a unit of work.

pub mod admin;
pub mod audit;
pub mod checkout;
pub mod config;
pub mod db;
pub(crate) mod emails;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod model;
pub mod notifications;
pub mod outcome;
pub mod password;
pub mod profile;
pub mod reconciliation;
pub mod registration;
pub mod renewal;
pub(crate) mod telemetry;

pub use admin::ActionOutcome;
pub use audit::ChainVerification;
pub use checkout::CheckoutOutcome;
pub use config::{EngineConfig, EngineConfigError};
pub use error::LifecycleError;
pub use guard::Availability;
pub use ledger::{Journal, Ledger, Table};
pub use outcome::SideEffect;
pub use profile::SubscriptionOverview;
pub use reconciliation::ReconciliationReport;
pub use registration::{
    RegistrationPayload, RegistrationReceipt, RegistrationRequest, UploadedDocument,
};
pub use renewal::SweepReport;

use std::sync::Arc;

use rosp_gateway::Collaborators;

/// The lifecycle engine. Cheap to clone; clones share the ledger.
#[derive(Debug, Clone)]
pub struct Engine {
    ledger: Arc<Ledger>,
    gateway: Collaborators,
    config: Arc<EngineConfig>,
}

impl Engine {
    pub fn new(ledger: Ledger, gateway: Collaborators, config: EngineConfig) -> Self {
        Self {
            ledger: Arc::new(ledger),
            gateway,
            config: Arc::new(config),
        }
    }

    /// An in-memory engine with every collaborator unconfigured.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Ledger::in_memory(), Collaborators::unconfigured(), config)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn gateway(&self) -> &Collaborators {
        &self.gateway
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
