//! Post-registration record maintenance and read models: address
//! corrections, KYC re-uploads, agreement template publishing and the
//! subscription overview shown on dashboards.

use serde::Serialize;

use rosp_core::{AccountId, SubscriptionId, TemplateId, Timestamp};
use rosp_state::{Payment, StatusView, SubscriptionSnapshot};

use crate::config::KYC_MEDIA_TYPES;
use crate::error::LifecycleError;
use crate::model::{
    Actor, Address, AgreementTemplate, BusinessProfile, DocumentKind, KycDocument, NewAuditEntry,
};
use crate::registration::UploadedDocument;
use crate::Engine;

/// Everything a dashboard shows about one subscription.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionOverview {
    pub account_id: AccountId,
    pub subscription: SubscriptionSnapshot,
    pub view: StatusView,
    pub payments: Vec<Payment>,
}

impl Engine {
    pub async fn subscription_overview(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<SubscriptionOverview, LifecycleError> {
        self.ledger
            .read(|t| {
                let sub = t
                    .subscription(subscription_id)
                    .ok_or_else(|| LifecycleError::not_found("subscription", subscription_id))?;
                Ok(SubscriptionOverview {
                    account_id: sub.account_id(),
                    subscription: sub.snapshot(),
                    view: StatusView::from(sub),
                    payments: t
                        .payments_for_subscription(subscription_id)
                        .into_iter()
                        .cloned()
                        .collect(),
                })
            })
            .await?
    }

    /// Replace the registered and trading addresses. `actor` is the owner
    /// or an admin making a correction.
    pub async fn update_addresses(
        &self,
        actor: Actor,
        account_id: AccountId,
        registered: Address,
        trading: Option<Address>,
    ) -> Result<BusinessProfile, LifecycleError> {
        if !registered.is_complete() {
            return Err(LifecycleError::validation(
                "registered address line 1 and postcode are required",
            ));
        }
        let now = Timestamp::now();
        self.ledger
            .transact(|uow| {
                let mut profile = uow
                    .profile_for_account(account_id)
                    .ok_or_else(|| LifecycleError::not_found("business profile", account_id))?;
                profile.update_addresses(registered, trading, now);
                uow.update_profile(profile.clone())?;
                let mut entry = NewAuditEntry::new(account_id, actor, "ADDRESS_UPDATED", now);
                if let Some(sub) = uow.subscription_for_account(account_id) {
                    entry = entry.subscription(sub.id());
                }
                uow.append_audit(entry)?;
                Ok(profile)
            })
            .await
    }

    /// Replace one KYC document on the account's director.
    pub async fn reupload_document(
        &self,
        actor: Actor,
        account_id: AccountId,
        kind: DocumentKind,
        upload: UploadedDocument,
    ) -> Result<KycDocument, LifecycleError> {
        let media_type = upload.media_type.to_ascii_lowercase();
        if upload.bytes.is_empty() {
            return Err(LifecycleError::validation(format!("{} is empty", kind.as_str())));
        }
        if upload.bytes.len() > self.config.kyc_max_bytes {
            return Err(LifecycleError::validation(format!(
                "{} exceeds the {} byte limit",
                kind.as_str(),
                self.config.kyc_max_bytes
            )));
        }
        if !KYC_MEDIA_TYPES.contains(&media_type.as_str()) {
            return Err(LifecycleError::validation(format!(
                "{} must be one of {}",
                kind.as_str(),
                KYC_MEDIA_TYPES.join(", ")
            )));
        }

        let now = Timestamp::now();
        let document = KycDocument::new(upload.filename, media_type, upload.bytes, now);
        self.ledger
            .transact(|uow| {
                let profile = uow
                    .profile_for_account(account_id)
                    .ok_or_else(|| LifecycleError::not_found("business profile", account_id))?;
                let mut director = uow
                    .director_for_business(profile.id)
                    .ok_or_else(|| LifecycleError::not_found("director", profile.id))?;
                let replaced = director.reupload(kind, document.clone());
                uow.put_director(director)?;
                let mut entry = NewAuditEntry::new(account_id, actor, "DOCUMENT_REUPLOADED", now)
                    .notes(Some(format!(
                        "{} replaced {} with {}",
                        kind.as_str(),
                        replaced,
                        document.sha256
                    )));
                if let Some(sub) = uow.subscription_for_account(account_id) {
                    entry = entry.subscription(sub.id());
                }
                uow.append_audit(entry)?;
                Ok(document)
            })
            .await
    }

    /// Publish a new agreement template version and make it the only active
    /// one. Later registrations sign this version.
    pub async fn publish_template(
        &self,
        title: &str,
    ) -> Result<AgreementTemplate, LifecycleError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(LifecycleError::validation("template title is required"));
        }
        let now = Timestamp::now();
        let template = self
            .ledger
            .transact(|uow| {
                for mut previous in uow.templates().into_iter().filter(|t| t.active) {
                    previous.active = false;
                    uow.put_template(previous);
                }
                let template = AgreementTemplate {
                    id: TemplateId::new(),
                    version: uow.latest_template_version() + 1,
                    title: title.to_string(),
                    active: true,
                    created_at: now,
                };
                uow.put_template(template.clone());
                Ok(template)
            })
            .await?;
        tracing::info!(template_id = %template.id, version = template.version, "agreement template published");
        Ok(template)
    }

    pub async fn templates(&self) -> Result<Vec<AgreementTemplate>, LifecycleError> {
        self.ledger
            .read(|t| {
                let mut all: Vec<_> = t.templates().cloned().collect();
                all.sort_by_key(|t| t.version);
                all
            })
            .await
    }
}
