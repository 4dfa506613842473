//! # Client Records
//!
//! The record bundle a registration creates, plus the append-only audit and
//! notification rows. The subscription and payment aggregates live in
//! `rosp-state`.

use serde::{Deserialize, Serialize};

use rosp_core::{
    AccountId, AgreementId, BusinessProfileId, CompanyNumber, ContentDigest, DirectorId,
    EmailAddress, NotificationId, SubscriptionId, TemplateId, Timestamp,
};
use rosp_state::SubscriptionStatus;

// ─── Account ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "client" => Some(Self::Client),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// A portal login. Never deleted; `active` is cleared instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub email: EmailAddress,
    /// Argon2 PHC string.
    #[serde(skip)]
    pub password_hash: String,
    pub role: Role,
    pub active: bool,
    pub contact_name: String,
    pub created_at: Timestamp,
}

// ─── Business Profile ───────────────────────────────────────────────

/// A postal address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    pub postcode: String,
    #[serde(default)]
    pub country: Option<String>,
}

impl Address {
    pub fn is_complete(&self) -> bool {
        !self.line1.trim().is_empty() && !self.postcode.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessProfile {
    pub id: BusinessProfileId,
    pub account_id: AccountId,
    pub company_name: String,
    pub company_number: CompanyNumber,
    pub company_type: String,
    pub incorporation_date: Option<String>,
    pub registered_address: Address,
    pub trading_address: Option<Address>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl BusinessProfile {
    pub fn update_addresses(
        &mut self,
        registered: Address,
        trading: Option<Address>,
        now: Timestamp,
    ) {
        self.registered_address = registered;
        self.trading_address = trading;
        self.updated_at = now;
    }
}

// ─── Director & KYC ─────────────────────────────────────────────────

/// Which KYC slot a document fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    IdentityDocument,
    AddressProof,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdentityDocument => "identity_document",
            Self::AddressProof => "address_proof",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "identity_document" => Some(Self::IdentityDocument),
            "address_proof" => Some(Self::AddressProof),
            _ => None,
        }
    }
}

/// An uploaded KYC file.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KycDocument {
    pub filename: String,
    pub media_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub sha256: ContentDigest,
    pub uploaded_at: Timestamp,
}

impl std::fmt::Debug for KycDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KycDocument")
            .field("filename", &self.filename)
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .field("sha256", &self.sha256)
            .finish()
    }
}

impl KycDocument {
    pub fn new(filename: String, media_type: String, bytes: Vec<u8>, now: Timestamp) -> Self {
        let sha256 = ContentDigest::of(&bytes);
        Self {
            filename,
            media_type,
            bytes,
            sha256,
            uploaded_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Director {
    pub id: DirectorId,
    pub business_id: BusinessProfileId,
    pub full_name: String,
    pub date_of_birth: Option<String>,
    pub nationality: Option<String>,
    pub identity_document: KycDocument,
    pub address_proof: KycDocument,
}

impl Director {
    /// Replace one KYC document. Returns the digest of the replaced file.
    pub fn reupload(&mut self, kind: DocumentKind, document: KycDocument) -> ContentDigest {
        let slot = match kind {
            DocumentKind::IdentityDocument => &mut self.identity_document,
            DocumentKind::AddressProof => &mut self.address_proof,
        };
        std::mem::replace(slot, document).sha256
    }
}

// ─── Agreements ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementTemplate {
    pub id: TemplateId,
    pub version: i32,
    pub title: String,
    pub active: bool,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureKind {
    Typed,
    Drawn,
}

impl SignatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Typed => "typed",
            Self::Drawn => "drawn",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "typed" => Some(Self::Typed),
            "drawn" => Some(Self::Drawn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub kind: SignatureKind,
    /// Typed name, or a data URI for a drawn signature.
    #[serde(skip)]
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgreementStatus {
    Pending,
    Signed,
}

impl AgreementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Signed => "SIGNED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "SIGNED" => Some(Self::Signed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Agreement {
    pub id: AgreementId,
    pub account_id: AccountId,
    pub template_id: TemplateId,
    pub template_version: i32,
    pub signature: Signature,
    pub signer_name: String,
    pub signer_email: EmailAddress,
    /// Source address of the signing request.
    pub origin_address: Option<String>,
    pub status: AgreementStatus,
    /// Storage key of the rendered PDF, once stored.
    pub document_key: Option<String>,
    pub signed_at: Timestamp,
}

// ─── Audit ──────────────────────────────────────────────────────────

/// Who caused an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Admin(AccountId),
    Client(AccountId),
    PaymentGateway,
    Scheduler,
}

impl Actor {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Admin(_) => "admin",
            Self::Client(_) => "client",
            Self::PaymentGateway => "payment_gateway",
            Self::Scheduler => "scheduler",
        }
    }

    pub fn account_id(&self) -> Option<AccountId> {
        match self {
            Self::Admin(id) | Self::Client(id) => Some(*id),
            Self::PaymentGateway | Self::Scheduler => None,
        }
    }

    pub fn from_parts(kind: &str, id: Option<AccountId>) -> Option<Self> {
        match (kind, id) {
            ("admin", Some(id)) => Some(Self::Admin(id)),
            ("client", Some(id)) => Some(Self::Client(id)),
            ("payment_gateway", _) => Some(Self::PaymentGateway),
            ("scheduler", _) => Some(Self::Scheduler),
            _ => None,
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.account_id() {
            Some(id) => write!(f, "{}:{id}", self.kind()),
            None => f.write_str(self.kind()),
        }
    }
}

/// One audit row. Append-only; `entry_hash` chains to the previous row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub sequence: u64,
    pub id: uuid::Uuid,
    pub account_id: AccountId,
    pub subscription_id: Option<SubscriptionId>,
    pub actor: Actor,
    pub action: String,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub from_status: Option<SubscriptionStatus>,
    pub to_status: Option<SubscriptionStatus>,
    pub occurred_at: Timestamp,
    pub previous_hash: String,
    pub entry_hash: String,
}

/// An audit row before it is placed on the chain.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub account_id: AccountId,
    pub subscription_id: Option<SubscriptionId>,
    pub actor: Actor,
    pub action: String,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub from_status: Option<SubscriptionStatus>,
    pub to_status: Option<SubscriptionStatus>,
    pub occurred_at: Timestamp,
}

impl NewAuditEntry {
    pub fn new(account_id: AccountId, actor: Actor, action: impl Into<String>, now: Timestamp) -> Self {
        Self {
            account_id,
            subscription_id: None,
            actor,
            action: action.into(),
            reason: None,
            notes: None,
            from_status: None,
            to_status: None,
            occurred_at: now,
        }
    }

    pub fn subscription(mut self, id: SubscriptionId) -> Self {
        self.subscription_id = Some(id);
        self
    }

    pub fn statuses(mut self, from: Option<SubscriptionStatus>, to: Option<SubscriptionStatus>) -> Self {
        self.from_status = from;
        self.to_status = to;
        self
    }

    pub fn reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}

// ─── Notifications ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Welcome,
    PaymentReceived,
    PaymentFailed,
    StatusChanged,
    RenewalDue,
    Expired,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::PaymentReceived => "payment_received",
            Self::PaymentFailed => "payment_failed",
            Self::StatusChanged => "status_changed",
            Self::RenewalDue => "renewal_due",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            Self::Welcome,
            Self::PaymentReceived,
            Self::PaymentFailed,
            Self::StatusChanged,
            Self::RenewalDue,
            Self::Expired,
        ]
        .into_iter()
        .find(|k| k.as_str() == s)
    }
}

/// An in-app message shown on the client dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub account_id: AccountId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: Timestamp,
}

impl Notification {
    pub fn new(
        account_id: AccountId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            account_id,
            kind,
            title: title.into(),
            message: message.into(),
            read: false,
            created_at: now,
        }
    }
}

// ─── Idempotency Ledger ─────────────────────────────────────────────

/// A payment event that has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedEvent {
    pub token: String,
    pub kind: String,
    pub transaction_id: String,
    pub subscription_id: SubscriptionId,
    pub applied_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        Timestamp::parse("2026-02-01T12:00:00Z").unwrap()
    }

    #[test]
    fn reupload_replaces_slot_and_returns_old_digest() {
        let mut director = Director {
            id: DirectorId::new(),
            business_id: BusinessProfileId::new(),
            full_name: "Ada Lovelace".into(),
            date_of_birth: None,
            nationality: None,
            identity_document: KycDocument::new("id.pdf".into(), "application/pdf".into(), b"one".to_vec(), now()),
            address_proof: KycDocument::new("bill.png".into(), "image/png".into(), b"two".to_vec(), now()),
        };
        let old = director.reupload(
            DocumentKind::AddressProof,
            KycDocument::new("bill2.png".into(), "image/png".into(), b"three".to_vec(), now()),
        );
        assert_eq!(old, ContentDigest::of(b"two"));
        assert_eq!(director.address_proof.filename, "bill2.png");
        assert_eq!(director.identity_document.filename, "id.pdf");
    }

    #[test]
    fn actor_round_trips_through_parts() {
        let id = AccountId::new();
        for actor in [Actor::Admin(id), Actor::Client(id), Actor::PaymentGateway, Actor::Scheduler] {
            assert_eq!(Actor::from_parts(actor.kind(), actor.account_id()), Some(actor));
        }
        assert_eq!(Actor::from_parts("admin", None), None);
    }

    #[test]
    fn kyc_debug_hides_bytes() {
        let doc = KycDocument::new("id.pdf".into(), "application/pdf".into(), vec![1, 2, 3], now());
        let rendered = format!("{doc:?}");
        assert!(rendered.contains("len: 3"));
    }

    #[test]
    fn notification_kind_parses() {
        assert_eq!(NotificationKind::parse("renewal_due"), Some(NotificationKind::RenewalDue));
        assert_eq!(NotificationKind::parse("nope"), None);
    }
}
