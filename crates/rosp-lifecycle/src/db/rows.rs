//! Row types for SQLx mapping, and their conversion into records.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use rosp_core::{
    AccountId, AgreementId, BusinessProfileId, CompanyNumber, ContentDigest, DirectorId,
    EmailAddress, NotificationId, PaymentId, SubscriptionId, TemplateId, Timestamp,
};
use rosp_state::{Payment, PaymentStatus, Subscription, SubscriptionSnapshot, SubscriptionStatus};

use crate::error::LifecycleError;
use crate::model::{
    Account, Actor, Address, Agreement, AgreementStatus, AgreementTemplate, AuditEntry,
    BusinessProfile, Director, DocumentKind, KycDocument, Notification, NotificationKind,
    ProcessedEvent, Role, Signature, SignatureKind,
};

fn corrupt(table: &str, detail: impl std::fmt::Display) -> LifecycleError {
    LifecycleError::Persistence(format!("corrupt {table} row: {detail}"))
}

fn ts(dt: DateTime<Utc>) -> Timestamp {
    Timestamp::from_utc(dt)
}

fn status(table: &str, raw: &str) -> Result<SubscriptionStatus, LifecycleError> {
    raw.parse().map_err(|e| corrupt(table, e))
}

#[derive(sqlx::FromRow)]
pub(super) struct AccountRow {
    id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    active: bool,
    contact_name: String,
    created_at: DateTime<Utc>,
}

impl AccountRow {
    pub(super) fn into_record(self) -> Result<Account, LifecycleError> {
        Ok(Account {
            id: AccountId::from_uuid(self.id),
            email: EmailAddress::parse(&self.email).map_err(|e| corrupt("accounts", e))?,
            password_hash: self.password_hash,
            role: Role::parse(&self.role).ok_or_else(|| corrupt("accounts", &self.role))?,
            active: self.active,
            contact_name: self.contact_name,
            created_at: ts(self.created_at),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct ProfileRow {
    id: Uuid,
    account_id: Uuid,
    company_name: String,
    company_number: String,
    company_type: String,
    incorporation_date: Option<String>,
    registered_address: serde_json::Value,
    trading_address: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProfileRow {
    pub(super) fn into_record(self) -> Result<BusinessProfile, LifecycleError> {
        let address = |v: serde_json::Value| {
            serde_json::from_value::<Address>(v).map_err(|e| corrupt("business_profiles", e))
        };
        Ok(BusinessProfile {
            id: BusinessProfileId::from_uuid(self.id),
            account_id: AccountId::from_uuid(self.account_id),
            company_name: self.company_name,
            company_number: CompanyNumber::parse(&self.company_number)
                .map_err(|e| corrupt("business_profiles", e))?,
            company_type: self.company_type,
            incorporation_date: self.incorporation_date,
            registered_address: address(self.registered_address)?,
            trading_address: self.trading_address.map(address).transpose()?,
            created_at: ts(self.created_at),
            updated_at: ts(self.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct DirectorRow {
    pub(super) id: Uuid,
    business_id: Uuid,
    full_name: String,
    date_of_birth: Option<String>,
    nationality: Option<String>,
}

#[derive(sqlx::FromRow)]
pub(super) struct KycRow {
    pub(super) director_id: Uuid,
    pub(super) kind: String,
    filename: String,
    media_type: String,
    bytes: Vec<u8>,
    sha256: String,
    uploaded_at: DateTime<Utc>,
}

impl KycRow {
    fn into_document(self) -> KycDocument {
        KycDocument {
            filename: self.filename,
            media_type: self.media_type,
            bytes: self.bytes,
            sha256: ContentDigest::from_hex(self.sha256),
            uploaded_at: ts(self.uploaded_at),
        }
    }
}

impl DirectorRow {
    /// Join with the director's two KYC rows.
    pub(super) fn into_record(self, documents: Vec<KycRow>) -> Result<Director, LifecycleError> {
        let mut identity = None;
        let mut proof = None;
        for doc in documents {
            match DocumentKind::parse(&doc.kind) {
                Some(DocumentKind::IdentityDocument) => identity = Some(doc.into_document()),
                Some(DocumentKind::AddressProof) => proof = Some(doc.into_document()),
                None => return Err(corrupt("kyc_documents", &doc.kind)),
            }
        }
        let missing = |kind: &str| corrupt("directors", format!("{} has no {kind}", self.id));
        Ok(Director {
            id: DirectorId::from_uuid(self.id),
            business_id: BusinessProfileId::from_uuid(self.business_id),
            identity_document: identity.ok_or_else(|| missing("identity_document"))?,
            address_proof: proof.ok_or_else(|| missing("address_proof"))?,
            full_name: self.full_name,
            date_of_birth: self.date_of_birth,
            nationality: self.nationality,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct TemplateRow {
    id: Uuid,
    version: i32,
    title: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl TemplateRow {
    pub(super) fn into_record(self) -> AgreementTemplate {
        AgreementTemplate {
            id: TemplateId::from_uuid(self.id),
            version: self.version,
            title: self.title,
            active: self.active,
            created_at: ts(self.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct AgreementRow {
    id: Uuid,
    account_id: Uuid,
    template_id: Uuid,
    template_version: i32,
    signature_kind: String,
    signature_payload: String,
    signer_name: String,
    signer_email: String,
    origin_address: Option<String>,
    status: String,
    document_key: Option<String>,
    signed_at: DateTime<Utc>,
}

impl AgreementRow {
    pub(super) fn into_record(self) -> Result<Agreement, LifecycleError> {
        Ok(Agreement {
            id: AgreementId::from_uuid(self.id),
            account_id: AccountId::from_uuid(self.account_id),
            template_id: TemplateId::from_uuid(self.template_id),
            template_version: self.template_version,
            signature: Signature {
                kind: SignatureKind::parse(&self.signature_kind)
                    .ok_or_else(|| corrupt("agreements", &self.signature_kind))?,
                payload: self.signature_payload,
            },
            signer_name: self.signer_name,
            signer_email: EmailAddress::parse(&self.signer_email).map_err(|e| corrupt("agreements", e))?,
            origin_address: self.origin_address,
            status: AgreementStatus::parse(&self.status).ok_or_else(|| corrupt("agreements", &self.status))?,
            document_key: self.document_key,
            signed_at: ts(self.signed_at),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct SubscriptionRow {
    id: Uuid,
    account_id: Uuid,
    status: String,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    payment_method: Option<String>,
    retry_count: i16,
    gateway_customer_ref: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SubscriptionRow {
    pub(super) fn into_record(self) -> Result<Subscription, LifecycleError> {
        Ok(Subscription::restore(SubscriptionSnapshot {
            id: SubscriptionId::from_uuid(self.id),
            account_id: AccountId::from_uuid(self.account_id),
            status: status("subscriptions", &self.status)?,
            start_date: self.start_date.map(ts),
            end_date: self.end_date.map(ts),
            payment_method: self.payment_method,
            retry_count: u8::try_from(self.retry_count).map_err(|e| corrupt("subscriptions", e))?,
            gateway_customer_ref: self.gateway_customer_ref,
            version: u64::try_from(self.version).map_err(|e| corrupt("subscriptions", e))?,
            created_at: ts(self.created_at),
            updated_at: ts(self.updated_at),
        }))
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct PaymentRow {
    id: Uuid,
    subscription_id: Uuid,
    amount_minor: i64,
    currency: String,
    method: Option<String>,
    transaction_id: String,
    status: String,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    pub(super) fn into_record(self) -> Result<Payment, LifecycleError> {
        let status: PaymentStatus = self.status.parse().map_err(|e| corrupt("payments", e))?;
        Ok(Payment::restore(
            PaymentId::from_uuid(self.id),
            SubscriptionId::from_uuid(self.subscription_id),
            self.amount_minor,
            self.currency,
            self.method,
            self.transaction_id,
            status,
            self.failure_reason,
            ts(self.created_at),
            ts(self.updated_at),
        ))
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct AuditRow {
    sequence: i64,
    id: Uuid,
    account_id: Uuid,
    subscription_id: Option<Uuid>,
    actor_kind: String,
    actor_id: Option<Uuid>,
    action: String,
    reason: Option<String>,
    notes: Option<String>,
    from_status: Option<String>,
    to_status: Option<String>,
    occurred_at: DateTime<Utc>,
    previous_hash: String,
    entry_hash: String,
}

impl AuditRow {
    pub(super) fn into_record(self) -> Result<AuditEntry, LifecycleError> {
        let actor = Actor::from_parts(&self.actor_kind, self.actor_id.map(AccountId::from_uuid))
            .ok_or_else(|| corrupt("audit_entries", &self.actor_kind))?;
        Ok(AuditEntry {
            sequence: u64::try_from(self.sequence).map_err(|e| corrupt("audit_entries", e))?,
            id: self.id,
            account_id: AccountId::from_uuid(self.account_id),
            subscription_id: self.subscription_id.map(SubscriptionId::from_uuid),
            actor,
            action: self.action,
            reason: self.reason,
            notes: self.notes,
            from_status: self.from_status.as_deref().map(|s| status("audit_entries", s)).transpose()?,
            to_status: self.to_status.as_deref().map(|s| status("audit_entries", s)).transpose()?,
            occurred_at: ts(self.occurred_at),
            previous_hash: self.previous_hash,
            entry_hash: self.entry_hash,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct NotificationRow {
    id: Uuid,
    account_id: Uuid,
    kind: String,
    title: String,
    message: String,
    read: bool,
    created_at: DateTime<Utc>,
}

impl NotificationRow {
    pub(super) fn into_record(self) -> Result<Notification, LifecycleError> {
        Ok(Notification {
            id: NotificationId::from_uuid(self.id),
            account_id: AccountId::from_uuid(self.account_id),
            kind: NotificationKind::parse(&self.kind).ok_or_else(|| corrupt("notifications", &self.kind))?,
            title: self.title,
            message: self.message,
            read: self.read,
            created_at: ts(self.created_at),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct ProcessedEventRow {
    token: String,
    kind: String,
    transaction_id: String,
    subscription_id: Uuid,
    applied_at: DateTime<Utc>,
}

impl ProcessedEventRow {
    pub(super) fn into_record(self) -> ProcessedEvent {
        ProcessedEvent {
            token: self.token,
            kind: self.kind,
            transaction_id: self.transaction_id,
            subscription_id: SubscriptionId::from_uuid(self.subscription_id),
            applied_at: ts(self.applied_at),
        }
    }
}
