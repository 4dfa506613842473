//! # Registration Transaction Engine
//!
//! A registration creates the whole client record bundle in one unit of
//! work:
//!
//! ```text
//! Account → BusinessProfile → Director (+ KYC) → Agreement → Subscription (DRAFT)
//!         → welcome Notification → REGISTERED audit entry
//! ```
//!
//! Either every record commits or none does. Only after commit do the
//! best-effort steps run (agreement PDF, checkout session, emails); their
//! failures are reported in [`RegistrationReceipt::side_effects`] and never
//! undo the registration.

use serde::{Deserialize, Serialize};

use rosp_core::{
    AccountId, AgreementId, BusinessProfileId, CompanyNumber, DirectorId, EmailAddress,
    SubscriptionId, Timestamp,
};
use rosp_gateway::AgreementRenderRequest;
use rosp_state::{Subscription, SubscriptionStatus};

use crate::config::KYC_MEDIA_TYPES;
use crate::emails;
use crate::error::LifecycleError;
use crate::guard;
use crate::model::{
    Account, Actor, Address, Agreement, AgreementStatus, AgreementTemplate, BusinessProfile,
    Director, KycDocument, NewAuditEntry, Notification, NotificationKind, Role, Signature,
    SignatureKind,
};
use crate::outcome::SideEffect;
use crate::password;
use crate::telemetry;
use crate::Engine;

// ─── Request ────────────────────────────────────────────────────────

/// A password as submitted. Never printed.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDetails {
    pub name: String,
    pub number: String,
    #[serde(default = "default_company_type")]
    pub company_type: String,
    #[serde(default)]
    pub incorporation_date: Option<String>,
    pub registered_address: Address,
    #[serde(default)]
    pub trading_address: Option<Address>,
}

fn default_company_type() -> String {
    "ltd".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorDetails {
    pub full_name: String,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementSigning {
    /// `typed` or `drawn`.
    #[serde(default)]
    pub signature_kind: Option<String>,
    #[serde(default)]
    pub signature_payload: String,
    /// Defaults to the director's name.
    #[serde(default)]
    pub signer_name: Option<String>,
}

/// The JSON part of a registration submission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPayload {
    pub email: String,
    pub password: Password,
    /// Defaults to the director's name.
    #[serde(default)]
    pub contact_name: Option<String>,
    pub company: CompanyDetails,
    pub director: DirectorDetails,
    pub agreement: AgreementSigning,
}

/// An uploaded file.
#[derive(Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedDocument")
            .field("filename", &self.filename)
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub payload: RegistrationPayload,
    pub identity_document: Option<UploadedDocument>,
    pub address_proof: Option<UploadedDocument>,
    /// Source address of the submission, recorded on the agreement.
    pub origin_address: Option<String>,
}

// ─── Receipt ────────────────────────────────────────────────────────

/// Returned iff the record bundle committed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationReceipt {
    #[serde(rename = "userId")]
    pub account_id: AccountId,
    pub subscription_id: SubscriptionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement_id: Option<AgreementId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    pub core_committed: bool,
    pub side_effects: Vec<SideEffect>,
}

// ─── Validation ─────────────────────────────────────────────────────

/// A request that passed every precondition.
struct Validated {
    email: EmailAddress,
    password: String,
    contact_name: String,
    company: CompanyDetails,
    company_number: CompanyNumber,
    director: DirectorDetails,
    identity_document: KycDocument,
    address_proof: KycDocument,
    signature: Signature,
    signer_name: String,
    origin_address: Option<String>,
}

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn check_document(
    label: &str,
    upload: Option<UploadedDocument>,
    max_bytes: usize,
    now: Timestamp,
    problems: &mut Vec<String>,
) -> Option<KycDocument> {
    let Some(upload) = upload else {
        problems.push(format!("{label} is required"));
        return None;
    };
    let before = problems.len();
    if upload.bytes.is_empty() {
        problems.push(format!("{label} is empty"));
    }
    if upload.bytes.len() > max_bytes {
        problems.push(format!("{label} exceeds the {max_bytes} byte limit"));
    }
    let media_type = upload.media_type.to_ascii_lowercase();
    if !KYC_MEDIA_TYPES.contains(&media_type.as_str()) {
        problems.push(format!(
            "{label} must be one of {} (got {})",
            KYC_MEDIA_TYPES.join(", "),
            upload.media_type
        ));
    }
    (problems.len() == before)
        .then(|| KycDocument::new(upload.filename, media_type, upload.bytes, now))
}

fn validate(
    request: RegistrationRequest,
    max_bytes: usize,
    now: Timestamp,
) -> Result<Validated, LifecycleError> {
    let RegistrationRequest {
        payload,
        identity_document,
        address_proof,
        origin_address,
    } = request;
    let mut problems = Vec::new();

    let email = EmailAddress::parse(&payload.email)
        .map_err(|e| problems.push(e.to_string()))
        .ok();
    let company_number = CompanyNumber::parse(&payload.company.number)
        .map_err(|e| problems.push(e.to_string()))
        .ok();
    if let Err(msg) = password::check_policy(&payload.password.0) {
        problems.push(msg);
    }
    if blank(&payload.company.name) {
        problems.push("company name is required".into());
    }
    if !payload.company.registered_address.is_complete() {
        problems.push("registered address line 1 and postcode are required".into());
    }
    if blank(&payload.director.full_name) {
        problems.push("director name is required".into());
    }

    let identity_document = check_document("identity document", identity_document, max_bytes, now, &mut problems);
    let address_proof = check_document("address proof", address_proof, max_bytes, now, &mut problems);

    let signature_kind = match payload.agreement.signature_kind.as_deref() {
        None => {
            problems.push("agreement signature type is required".into());
            None
        }
        Some(raw) => {
            let parsed = SignatureKind::parse(&raw.trim().to_ascii_lowercase());
            if parsed.is_none() {
                problems.push(format!("unknown signature type {raw:?}"));
            }
            parsed
        }
    };
    if blank(&payload.agreement.signature_payload) {
        problems.push("agreement signature is required".into());
    }

    match (email, company_number, identity_document, address_proof, signature_kind) {
        (Some(email), Some(company_number), Some(identity_document), Some(address_proof), Some(kind))
            if problems.is_empty() =>
        {
            let director_name = payload.director.full_name.trim().to_string();
            let contact_name = payload
                .contact_name
                .filter(|n| !blank(n))
                .unwrap_or_else(|| director_name.clone());
            let signer_name = payload
                .agreement
                .signer_name
                .filter(|n| !blank(n))
                .unwrap_or_else(|| director_name.clone());
            Ok(Validated {
                email,
                password: payload.password.0,
                contact_name,
                company: payload.company,
                company_number,
                director: payload.director,
                identity_document,
                address_proof,
                signature: Signature {
                    kind,
                    payload: payload.agreement.signature_payload,
                },
                signer_name,
                origin_address,
            })
        }
        _ => Err(LifecycleError::Validation(problems.join("; "))),
    }
}

// ─── Engine ─────────────────────────────────────────────────────────

/// What the unit of work committed, carried into the side effects.
struct Committed {
    account: Account,
    profile: BusinessProfile,
    agreement: Option<(Agreement, AgreementTemplate)>,
    subscription_id: SubscriptionId,
}

impl Engine {
    /// Register a new client.
    pub async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<RegistrationReceipt, LifecycleError> {
        let now = Timestamp::now();
        let v = validate(request, self.config.kyc_max_bytes, now)?;
        let password_hash = password::hash(v.password).await?;

        let committed = self
            .ledger
            .transact(move |uow| {
                guard::ensure_available(uow, &v.email, &v.company_number)?;

                let account = Account {
                    id: AccountId::new(),
                    email: v.email,
                    password_hash,
                    role: Role::Client,
                    active: true,
                    contact_name: v.contact_name,
                    created_at: now,
                };
                uow.insert_account(account.clone())?;

                let profile = BusinessProfile {
                    id: BusinessProfileId::new(),
                    account_id: account.id,
                    company_name: v.company.name.trim().to_string(),
                    company_number: v.company_number,
                    company_type: v.company.company_type,
                    incorporation_date: v.company.incorporation_date,
                    registered_address: v.company.registered_address,
                    trading_address: v.company.trading_address,
                    created_at: now,
                    updated_at: now,
                };
                uow.insert_profile(profile.clone())?;

                uow.put_director(Director {
                    id: DirectorId::new(),
                    business_id: profile.id,
                    full_name: v.director.full_name.trim().to_string(),
                    date_of_birth: v.director.date_of_birth,
                    nationality: v.director.nationality,
                    identity_document: v.identity_document,
                    address_proof: v.address_proof,
                })?;

                let agreement = match uow.active_template() {
                    Some(template) => {
                        let agreement = Agreement {
                            id: AgreementId::new(),
                            account_id: account.id,
                            template_id: template.id,
                            template_version: template.version,
                            signature: v.signature,
                            signer_name: v.signer_name,
                            signer_email: account.email.clone(),
                            origin_address: v.origin_address,
                            status: AgreementStatus::Signed,
                            document_key: None,
                            signed_at: now,
                        };
                        uow.put_agreement(agreement.clone())?;
                        Some((agreement, template))
                    }
                    None => {
                        tracing::warn!(
                            account_id = %account.id,
                            "no active agreement template; registration proceeds without a signed agreement"
                        );
                        None
                    }
                };

                let subscription = Subscription::draft(account.id, now);
                let subscription_id = subscription.id();
                uow.insert_subscription(subscription)?;

                uow.put_notification(Notification::new(
                    account.id,
                    NotificationKind::Welcome,
                    "Welcome",
                    "Your registration has been received. Complete your annual payment to continue.",
                    now,
                ))?;

                let notes = match &agreement {
                    Some((_, template)) => format!("agreement template v{}", template.version),
                    None => "no active agreement template".to_string(),
                };
                uow.append_audit(
                    NewAuditEntry::new(account.id, Actor::Client(account.id), "REGISTERED", now)
                        .subscription(subscription_id)
                        .statuses(None, Some(SubscriptionStatus::Draft))
                        .notes(Some(notes)),
                )?;

                Ok(Committed {
                    account,
                    profile,
                    agreement,
                    subscription_id,
                })
            })
            .await?;

        telemetry::registration();
        tracing::info!(
            account_id = %committed.account.id,
            subscription_id = %committed.subscription_id,
            company_number = %committed.profile.company_number,
            "registration committed"
        );

        let mut side_effects = Vec::with_capacity(4);

        side_effects.push(match &committed.agreement {
            Some((agreement, template)) => {
                self.store_agreement_document(agreement, template, &committed.profile.company_name)
                    .await
            }
            None => SideEffect::skipped("agreement_document", "no active agreement template"),
        });

        let checkout_url = match self.begin_checkout(committed.subscription_id).await {
            Ok(outcome) => {
                side_effects.push(SideEffect::succeeded_with("checkout_session", outcome.session_id));
                Some(outcome.url)
            }
            Err(e) => {
                side_effects.push(SideEffect::failed("checkout_session", e));
                None
            }
        };

        let dashboard = self.config.dashboard_url();
        let welcome = emails::welcome(
            committed.account.email.clone(),
            &committed.account.contact_name,
            &committed.profile.company_name,
            &dashboard,
        );
        side_effects.push(match self.gateway.mailer.send(&welcome).await {
            Ok(()) => SideEffect::succeeded("welcome_email"),
            Err(e) => SideEffect::failed("welcome_email", e),
        });

        side_effects.push(match &self.config.operator_alert_email {
            Some(operator) => {
                let alert = emails::operator_alert(
                    operator.clone(),
                    &committed.profile.company_name,
                    committed.profile.company_number.as_str(),
                    committed.account.email.as_str(),
                );
                match self.gateway.mailer.send(&alert).await {
                    Ok(()) => SideEffect::succeeded("operator_alert"),
                    Err(e) => SideEffect::failed("operator_alert", e),
                }
            }
            None => SideEffect::skipped("operator_alert", "OPERATOR_ALERT_EMAIL not set"),
        });

        Ok(RegistrationReceipt {
            account_id: committed.account.id,
            subscription_id: committed.subscription_id,
            agreement_id: committed.agreement.as_ref().map(|(a, _)| a.id),
            checkout_url,
            core_committed: true,
            side_effects,
        })
    }

    /// Render the signed agreement, store it and record its key.
    async fn store_agreement_document(
        &self,
        agreement: &Agreement,
        template: &AgreementTemplate,
        company_name: &str,
    ) -> SideEffect {
        const NAME: &str = "agreement_document";

        let request = AgreementRenderRequest {
            agreement_id: agreement.id,
            template_version: template.version,
            template_title: template.title.clone(),
            company_name: company_name.to_string(),
            signer_name: agreement.signer_name.clone(),
            signer_email: agreement.signer_email.to_string(),
            signature_kind: agreement.signature.kind.as_str().to_string(),
            signature_payload: agreement.signature.payload.clone(),
            signed_at: agreement.signed_at,
        };
        let pdf = match self.gateway.renderer.render(&request).await {
            Ok(pdf) => pdf,
            Err(e) => return SideEffect::failed(NAME, e),
        };

        let key = format!("agreements/{}/{}.pdf", agreement.account_id, agreement.id);
        if let Err(e) = self.gateway.documents.store(&key, &pdf, "application/pdf").await {
            return SideEffect::failed(NAME, e);
        }

        let agreement_id = agreement.id;
        let recorded = self
            .ledger
            .transact(|uow| {
                let mut stored = uow
                    .agreement(agreement_id)
                    .ok_or_else(|| LifecycleError::not_found("agreement", agreement_id))?;
                stored.document_key = Some(key.clone());
                uow.put_agreement(stored)
            })
            .await;
        match recorded {
            Ok(()) => SideEffect::succeeded_with(NAME, key),
            Err(e) => SideEffect::failed(NAME, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        Timestamp::parse("2026-04-01T09:00:00Z").unwrap()
    }

    fn doc(media_type: &str, bytes: &[u8]) -> Option<UploadedDocument> {
        Some(UploadedDocument {
            filename: "file".into(),
            media_type: media_type.into(),
            bytes: bytes.to_vec(),
        })
    }

    fn request() -> RegistrationRequest {
        let payload: RegistrationPayload = serde_json::from_value(serde_json::json!({
            "email": "Ada@Example.com",
            "password": "analytical1",
            "company": {
                "name": "Engines Ltd",
                "number": "ab 123456",
                "registeredAddress": {"line1": "1 Difference St", "postcode": "EC1A 1AA"}
            },
            "director": {"fullName": "Ada Lovelace"},
            "agreement": {"signatureKind": "typed", "signaturePayload": "Ada Lovelace"}
        }))
        .unwrap();
        RegistrationRequest {
            payload,
            identity_document: doc("application/pdf", b"%PDF"),
            address_proof: doc("image/PNG", b"png"),
            origin_address: None,
        }
    }

    #[test]
    fn valid_request_normalises_identity() {
        let v = validate(request(), 1024, now()).unwrap();
        assert_eq!(v.email.as_str(), "ada@example.com");
        assert_eq!(v.company_number.as_str(), "AB123456");
        assert_eq!(v.contact_name, "Ada Lovelace");
        assert_eq!(v.address_proof.media_type, "image/png");
    }

    #[test]
    fn every_problem_is_reported() {
        let mut req = request();
        req.payload.password = Password::new("short");
        req.identity_document = None;
        req.address_proof = doc("text/plain", b"hi");
        req.payload.agreement.signature_payload = "  ".into();
        let err = validate(req, 1024, now()).err().unwrap();
        let msg = err.to_string();
        assert!(msg.contains("password"));
        assert!(msg.contains("identity document is required"));
        assert!(msg.contains("address proof must be one of"));
        assert!(msg.contains("signature is required"));
    }

    #[test]
    fn oversize_and_empty_documents_are_refused() {
        let mut req = request();
        req.identity_document = doc("application/pdf", &[0u8; 2048]);
        req.address_proof = doc("image/jpeg", b"");
        let msg = validate(req, 1024, now()).err().unwrap().to_string();
        assert!(msg.contains("exceeds the 1024 byte limit"));
        assert!(msg.contains("address proof is empty"));
    }

    #[test]
    fn missing_signature_type_is_refused() {
        let mut req = request();
        req.payload.agreement.signature_kind = None;
        assert!(matches!(validate(req, 1024, now()), Err(LifecycleError::Validation(_))));
    }

    #[test]
    fn password_debug_is_redacted() {
        assert_eq!(format!("{:?}", Password::new("analytical1")), "Password([REDACTED])");
    }
}
