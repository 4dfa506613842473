//! # Transactional Ledger
//!
//! The engine's system of record. Every mutation runs through
//! [`Ledger::transact`]:
//!
//! 1. A snapshot of [`Tables`] is taken. In memory this is the tables
//!    themselves, under an async mutex. With a [`Journal`] it is a fresh
//!    load from the store, so nothing read by an earlier request is reused.
//! 2. The closure stages writes in a [`UnitOfWork`]; reads see staged rows
//!    over the snapshot. Uniqueness (email, company number, one
//!    subscription per account, transaction id, event token) is checked
//!    here, against the snapshot.
//! 3. If the closure fails, the staged [`ChangeSet`] is dropped. Nothing
//!    is visible.
//! 4. Otherwise the change set is committed. A journal writes it in one
//!    store transaction whose unique constraints and subscription version
//!    check reject a write that raced another instance; the loser gets
//!    [`LifecycleError::ConcurrentModification`] and its next attempt reads
//!    the winner's rows.
//!
//! The closure is synchronous, so no external call can run inside a unit
//! of work.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use rosp_core::{
    AccountId, AgreementId, BusinessProfileId, CompanyNumber, DirectorId, EmailAddress,
    NotificationId, PaymentId, SubscriptionId, TemplateId,
};
use rosp_state::{Payment, Subscription};

use crate::audit::{chain_hash, GENESIS_HASH};
use crate::error::LifecycleError;
use crate::model::{
    Account, Agreement, AgreementTemplate, AuditEntry, BusinessProfile, Director, NewAuditEntry,
    Notification, ProcessedEvent,
};

// ─── Tables ─────────────────────────────────────────────────────────

/// Committed state plus the lookup indexes that back uniqueness.
#[derive(Debug, Default, Clone)]
pub struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    profiles: BTreeMap<BusinessProfileId, BusinessProfile>,
    directors: BTreeMap<DirectorId, Director>,
    templates: BTreeMap<TemplateId, AgreementTemplate>,
    agreements: BTreeMap<AgreementId, Agreement>,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    payments: BTreeMap<PaymentId, Payment>,
    audit: Vec<AuditEntry>,
    notifications: BTreeMap<NotificationId, Notification>,
    processed_events: HashMap<String, ProcessedEvent>,

    email_index: HashMap<EmailAddress, AccountId>,
    company_index: HashMap<CompanyNumber, BusinessProfileId>,
    subscription_by_account: HashMap<AccountId, SubscriptionId>,
    payment_by_txn: HashMap<String, PaymentId>,
}

impl Tables {
    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    pub fn account_by_email(&self, email: &EmailAddress) -> Option<&Account> {
        self.email_index.get(email).and_then(|id| self.accounts.get(id))
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn email_taken(&self, email: &EmailAddress) -> bool {
        self.email_index.contains_key(email)
    }

    pub fn company_taken(&self, number: &CompanyNumber) -> bool {
        self.company_index.contains_key(number)
    }

    pub fn profile_for_account(&self, account_id: AccountId) -> Option<&BusinessProfile> {
        self.profiles.values().find(|p| p.account_id == account_id)
    }

    pub fn director_for_business(&self, business_id: BusinessProfileId) -> Option<&Director> {
        self.directors.values().find(|d| d.business_id == business_id)
    }

    /// The active template with the highest version.
    pub fn active_template(&self) -> Option<&AgreementTemplate> {
        self.templates
            .values()
            .filter(|t| t.active)
            .max_by_key(|t| t.version)
    }

    pub fn templates(&self) -> impl Iterator<Item = &AgreementTemplate> {
        self.templates.values()
    }

    pub fn agreement(&self, id: AgreementId) -> Option<&Agreement> {
        self.agreements.get(&id)
    }

    pub fn agreements_for_account(&self, account_id: AccountId) -> Vec<&Agreement> {
        self.agreements
            .values()
            .filter(|a| a.account_id == account_id)
            .collect()
    }

    pub fn subscription(&self, id: SubscriptionId) -> Option<&Subscription> {
        self.subscriptions.get(&id)
    }

    pub fn subscription_for_account(&self, account_id: AccountId) -> Option<&Subscription> {
        self.subscription_by_account
            .get(&account_id)
            .and_then(|id| self.subscriptions.get(id))
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    pub fn payment_by_transaction(&self, transaction_id: &str) -> Option<&Payment> {
        self.payment_by_txn
            .get(transaction_id)
            .and_then(|id| self.payments.get(id))
    }

    /// Payments for a subscription, oldest first.
    pub fn payments_for_subscription(&self, subscription_id: SubscriptionId) -> Vec<&Payment> {
        let mut payments: Vec<_> = self
            .payments
            .values()
            .filter(|p| p.subscription_id == subscription_id)
            .collect();
        payments.sort_by_key(|p| p.created_at);
        payments
    }

    /// The full audit chain in sequence order.
    pub fn audit(&self) -> &[AuditEntry] {
        &self.audit
    }

    pub fn notification(&self, id: NotificationId) -> Option<&Notification> {
        self.notifications.get(&id)
    }

    /// Notifications for an account, newest first.
    pub fn notifications_for(&self, account_id: AccountId) -> Vec<&Notification> {
        let mut list: Vec<_> = self
            .notifications
            .values()
            .filter(|n| n.account_id == account_id)
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    pub fn is_processed(&self, token: &str) -> bool {
        self.processed_events.contains_key(token)
    }

    /// Fold a committed change set into the tables.
    pub(crate) fn apply(&mut self, changes: ChangeSet) {
        for (id, account) in changes.accounts {
            self.email_index.insert(account.email.clone(), id);
            self.accounts.insert(id, account);
        }
        for (id, profile) in changes.profiles {
            self.company_index.insert(profile.company_number.clone(), id);
            self.profiles.insert(id, profile);
        }
        self.directors.extend(changes.directors);
        self.templates.extend(changes.templates);
        self.agreements.extend(changes.agreements);
        for (id, write) in changes.subscriptions {
            self.subscription_by_account.insert(write.record.account_id(), id);
            self.subscriptions.insert(id, write.record);
        }
        for (id, payment) in changes.payments {
            self.payment_by_txn.insert(payment.transaction_id.clone(), id);
            self.payments.insert(id, payment);
        }
        self.audit.extend(changes.audit);
        self.notifications.extend(changes.notifications);
        for event in changes.processed_events {
            self.processed_events.insert(event.token.clone(), event);
        }
    }
}

// ─── Change Set ─────────────────────────────────────────────────────

/// A subscription write and the version it must replace.
#[derive(Debug, Clone)]
pub(crate) struct VersionedWrite {
    pub record: Subscription,
    /// `None` for an insert.
    pub expected_version: Option<u64>,
}

/// Writes staged by one unit of work.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub(crate) accounts: BTreeMap<AccountId, Account>,
    pub(crate) profiles: BTreeMap<BusinessProfileId, BusinessProfile>,
    pub(crate) directors: BTreeMap<DirectorId, Director>,
    pub(crate) templates: BTreeMap<TemplateId, AgreementTemplate>,
    pub(crate) agreements: BTreeMap<AgreementId, Agreement>,
    pub(crate) subscriptions: BTreeMap<SubscriptionId, VersionedWrite>,
    pub(crate) payments: BTreeMap<PaymentId, Payment>,
    pub(crate) audit: Vec<AuditEntry>,
    pub(crate) notifications: BTreeMap<NotificationId, Notification>,
    pub(crate) processed_events: Vec<ProcessedEvent>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
            && self.profiles.is_empty()
            && self.directors.is_empty()
            && self.templates.is_empty()
            && self.agreements.is_empty()
            && self.subscriptions.is_empty()
            && self.payments.is_empty()
            && self.audit.is_empty()
            && self.notifications.is_empty()
            && self.processed_events.is_empty()
    }
}

/// Tables a write can be aimed at; used for fault injection in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Accounts,
    Profiles,
    Directors,
    Agreements,
    Subscriptions,
    Payments,
    Audit,
    Notifications,
}

// ─── Unit of Work ───────────────────────────────────────────────────

/// Staged writes over a read-only view of the committed tables.
pub struct UnitOfWork<'a> {
    base: &'a Tables,
    changes: ChangeSet,
    fail_at: Option<Table>,
}

impl<'a> UnitOfWork<'a> {
    fn new(base: &'a Tables, fail_at: Option<Table>) -> Self {
        Self {
            base,
            changes: ChangeSet::default(),
            fail_at,
        }
    }

    fn into_changes(self) -> ChangeSet {
        self.changes
    }

    fn check_fault(&self, table: Table) -> Result<(), LifecycleError> {
        if self.fail_at == Some(table) {
            return Err(LifecycleError::Persistence(format!(
                "injected write failure on {table:?}"
            )));
        }
        Ok(())
    }

    /// Committed tables, without staged writes.
    pub fn committed(&self) -> &Tables {
        self.base
    }

    // ── Reads (staged over committed) ──────────────────────────────

    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.changes
            .accounts
            .get(&id)
            .or_else(|| self.base.account(id))
            .cloned()
    }

    pub fn email_taken(&self, email: &EmailAddress) -> bool {
        self.base.email_taken(email) || self.changes.accounts.values().any(|a| &a.email == email)
    }

    pub fn company_taken(&self, number: &CompanyNumber) -> bool {
        self.base.company_taken(number)
            || self
                .changes
                .profiles
                .values()
                .any(|p| &p.company_number == number)
    }

    pub fn profile_for_account(&self, account_id: AccountId) -> Option<BusinessProfile> {
        self.changes
            .profiles
            .values()
            .find(|p| p.account_id == account_id)
            .or_else(|| self.base.profile_for_account(account_id))
            .cloned()
    }

    pub fn director_for_business(&self, business_id: BusinessProfileId) -> Option<Director> {
        self.changes
            .directors
            .values()
            .find(|d| d.business_id == business_id)
            .or_else(|| self.base.director_for_business(business_id))
            .cloned()
    }

    pub fn active_template(&self) -> Option<AgreementTemplate> {
        let staged = self.changes.templates.values();
        let committed = self
            .base
            .templates()
            .filter(|t| !self.changes.templates.contains_key(&t.id));
        staged
            .chain(committed)
            .filter(|t| t.active)
            .max_by_key(|t| t.version)
            .cloned()
    }

    /// Highest template version ever published.
    pub fn latest_template_version(&self) -> i32 {
        self.changes
            .templates
            .values()
            .chain(self.base.templates())
            .map(|t| t.version)
            .max()
            .unwrap_or(0)
    }

    pub fn templates(&self) -> Vec<AgreementTemplate> {
        let mut all: Vec<_> = self
            .base
            .templates()
            .filter(|t| !self.changes.templates.contains_key(&t.id))
            .chain(self.changes.templates.values())
            .cloned()
            .collect();
        all.sort_by_key(|t| t.version);
        all
    }

    pub fn agreement(&self, id: AgreementId) -> Option<Agreement> {
        self.changes
            .agreements
            .get(&id)
            .or_else(|| self.base.agreement(id))
            .cloned()
    }

    pub fn subscription(&self, id: SubscriptionId) -> Option<Subscription> {
        self.changes
            .subscriptions
            .get(&id)
            .map(|w| &w.record)
            .or_else(|| self.base.subscription(id))
            .cloned()
    }

    pub fn subscription_for_account(&self, account_id: AccountId) -> Option<Subscription> {
        self.changes
            .subscriptions
            .values()
            .map(|w| &w.record)
            .find(|s| s.account_id() == account_id)
            .or_else(|| self.base.subscription_for_account(account_id))
            .cloned()
    }

    pub fn payment_by_transaction(&self, transaction_id: &str) -> Option<Payment> {
        self.changes
            .payments
            .values()
            .find(|p| p.transaction_id == transaction_id)
            .or_else(|| self.base.payment_by_transaction(transaction_id))
            .cloned()
    }

    /// Payments for a subscription, oldest first.
    pub fn payments_for_subscription(&self, subscription_id: SubscriptionId) -> Vec<Payment> {
        let mut payments: Vec<Payment> = self
            .base
            .payments_for_subscription(subscription_id)
            .into_iter()
            .filter(|p| !self.changes.payments.contains_key(&p.id))
            .chain(
                self.changes
                    .payments
                    .values()
                    .filter(|p| p.subscription_id == subscription_id),
            )
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        payments
    }

    pub fn notification(&self, id: NotificationId) -> Option<Notification> {
        self.changes
            .notifications
            .get(&id)
            .or_else(|| self.base.notification(id))
            .cloned()
    }

    pub fn is_processed(&self, token: &str) -> bool {
        self.base.is_processed(token)
            || self.changes.processed_events.iter().any(|e| e.token == token)
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Stage a new account. Fails if the email is already registered.
    pub fn insert_account(&mut self, account: Account) -> Result<(), LifecycleError> {
        self.check_fault(Table::Accounts)?;
        if self.email_taken(&account.email) {
            return Err(LifecycleError::DuplicateIdentity {
                email_taken: true,
                company_taken: false,
            });
        }
        self.changes.accounts.insert(account.id, account);
        Ok(())
    }

    /// Stage a new business profile. Fails if the company number is taken.
    pub fn insert_profile(&mut self, profile: BusinessProfile) -> Result<(), LifecycleError> {
        self.check_fault(Table::Profiles)?;
        if self.company_taken(&profile.company_number) {
            return Err(LifecycleError::DuplicateIdentity {
                email_taken: false,
                company_taken: true,
            });
        }
        self.changes.profiles.insert(profile.id, profile);
        Ok(())
    }

    /// Stage an update to an existing profile. The company number is fixed.
    pub fn update_profile(&mut self, profile: BusinessProfile) -> Result<(), LifecycleError> {
        self.check_fault(Table::Profiles)?;
        let existing = self
            .changes
            .profiles
            .get(&profile.id)
            .or_else(|| self.base.profiles.get(&profile.id))
            .ok_or_else(|| LifecycleError::not_found("business profile", profile.id))?;
        if existing.company_number != profile.company_number {
            return Err(LifecycleError::validation("company number cannot be changed"));
        }
        self.changes.profiles.insert(profile.id, profile);
        Ok(())
    }

    pub fn put_director(&mut self, director: Director) -> Result<(), LifecycleError> {
        self.check_fault(Table::Directors)?;
        self.changes.directors.insert(director.id, director);
        Ok(())
    }

    pub fn put_template(&mut self, template: AgreementTemplate) {
        self.changes.templates.insert(template.id, template);
    }

    pub fn put_agreement(&mut self, agreement: Agreement) -> Result<(), LifecycleError> {
        self.check_fault(Table::Agreements)?;
        self.changes.agreements.insert(agreement.id, agreement);
        Ok(())
    }

    /// Stage a new subscription. Fails if the account already has one.
    pub fn insert_subscription(&mut self, subscription: Subscription) -> Result<(), LifecycleError> {
        self.check_fault(Table::Subscriptions)?;
        if self.subscription_for_account(subscription.account_id()).is_some() {
            return Err(LifecycleError::InvalidTransition(format!(
                "account {} already has a subscription",
                subscription.account_id()
            )));
        }
        self.changes.subscriptions.insert(
            subscription.id(),
            VersionedWrite {
                record: subscription,
                expected_version: None,
            },
        );
        Ok(())
    }

    /// Stage an update to an existing subscription.
    ///
    /// `subscription` must carry the version it was read at; the write fails
    /// with [`LifecycleError::ConcurrentModification`] if that is no longer
    /// current. The stored version is advanced by one.
    pub fn save_subscription(&mut self, mut subscription: Subscription) -> Result<(), LifecycleError> {
        self.check_fault(Table::Subscriptions)?;
        let id = subscription.id();
        let (current_version, expected_version) = match self.changes.subscriptions.get(&id) {
            Some(staged) => (staged.record.version(), staged.expected_version),
            None => {
                let committed = self
                    .base
                    .subscription(id)
                    .ok_or_else(|| LifecycleError::not_found("subscription", id))?;
                (committed.version(), Some(committed.version()))
            }
        };
        if subscription.version() != current_version {
            return Err(LifecycleError::ConcurrentModification {
                entity: "subscription",
                id: id.to_string(),
            });
        }
        if expected_version.is_some() && self.changes.subscriptions.get(&id).is_none() {
            subscription.advance_version();
        }
        self.changes.subscriptions.insert(
            id,
            VersionedWrite {
                record: subscription,
                expected_version,
            },
        );
        Ok(())
    }

    /// Stage a payment. A new row must not reuse an existing transaction id.
    pub fn put_payment(&mut self, payment: Payment) -> Result<(), LifecycleError> {
        self.check_fault(Table::Payments)?;
        if let Some(existing) = self.payment_by_transaction(&payment.transaction_id) {
            if existing.id != payment.id {
                return Err(LifecycleError::ConcurrentModification {
                    entity: "payment",
                    id: payment.transaction_id.clone(),
                });
            }
        }
        self.changes.payments.insert(payment.id, payment);
        Ok(())
    }

    /// Place an entry on the audit chain.
    pub fn append_audit(&mut self, entry: NewAuditEntry) -> Result<AuditEntry, LifecycleError> {
        self.check_fault(Table::Audit)?;
        let (sequence, previous_hash) = match self
            .changes
            .audit
            .last()
            .or_else(|| self.base.audit.last())
        {
            Some(last) => (last.sequence + 1, last.entry_hash.clone()),
            None => (1, GENESIS_HASH.to_string()),
        };
        let entry_hash = chain_hash(&previous_hash, sequence, &entry);
        let entry = AuditEntry {
            sequence,
            id: uuid::Uuid::new_v4(),
            account_id: entry.account_id,
            subscription_id: entry.subscription_id,
            actor: entry.actor,
            action: entry.action,
            reason: entry.reason,
            notes: entry.notes,
            from_status: entry.from_status,
            to_status: entry.to_status,
            occurred_at: entry.occurred_at,
            previous_hash,
            entry_hash,
        };
        self.changes.audit.push(entry.clone());
        Ok(entry)
    }

    pub fn put_notification(&mut self, notification: Notification) -> Result<(), LifecycleError> {
        self.check_fault(Table::Notifications)?;
        self.changes.notifications.insert(notification.id, notification);
        Ok(())
    }

    /// Record an applied payment event. Fails if the token was seen before.
    pub fn record_event(&mut self, event: ProcessedEvent) -> Result<(), LifecycleError> {
        if self.is_processed(&event.token) {
            return Err(LifecycleError::DuplicateEvent { token: event.token });
        }
        self.changes.processed_events.push(event);
        Ok(())
    }
}

// ─── Journal ────────────────────────────────────────────────────────

/// Durable store behind a [`Ledger`].
///
/// Implementations must reject, atomically and without partial effects, a
/// change set whose subscription writes carry a stale `expected_version`
/// or whose rows break a uniqueness rule another writer already claimed.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Read every table into a fresh [`Tables`].
    async fn load(&self) -> Result<Tables, LifecycleError>;

    /// Commit one change set in a single store transaction.
    async fn write(&self, changes: &ChangeSet) -> Result<(), LifecycleError>;

    async fn ping(&self) -> Result<(), LifecycleError>;
}

// ─── Ledger ─────────────────────────────────────────────────────────

enum Backing {
    Memory(tokio::sync::Mutex<Tables>),
    Journal {
        store: Arc<dyn Journal>,
        /// Orders this process's units of work; holds no rows.
        turn: tokio::sync::Mutex<()>,
    },
}

/// Atomic units of work over the tables, in memory or against a journal.
pub struct Ledger {
    backing: Backing,
    fail_next: parking_lot::Mutex<Option<Table>>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("persistent", &self.is_persistent())
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// A ledger with no persistence. State is lost on restart.
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory(tokio::sync::Mutex::new(Tables::default())),
            fail_next: parking_lot::Mutex::new(None),
        }
    }

    /// A ledger backed by `journal`. The store is read once here to prove
    /// it is reachable; no rows are kept.
    pub async fn open(journal: impl Journal + 'static) -> Result<Self, LifecycleError> {
        let tables = journal.load().await?;
        tracing::info!(
            accounts = tables.accounts.len(),
            subscriptions = tables.subscriptions.len(),
            audit_entries = tables.audit.len(),
            "ledger opened against journal"
        );
        Ok(Self {
            backing: Backing::Journal {
                store: Arc::new(journal),
                turn: tokio::sync::Mutex::new(()),
            },
            fail_next: parking_lot::Mutex::new(None),
        })
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.backing, Backing::Journal { .. })
    }

    /// Run `f` as one atomic unit of work.
    pub async fn transact<R>(
        &self,
        f: impl FnOnce(&mut UnitOfWork<'_>) -> Result<R, LifecycleError>,
    ) -> Result<R, LifecycleError> {
        match &self.backing {
            Backing::Memory(tables) => {
                let mut tables = tables.lock().await;
                let (result, changes) = self.stage(&tables, f)?;
                if !changes.is_empty() {
                    tables.apply(changes);
                }
                Ok(result)
            }
            Backing::Journal { store, turn } => {
                let _turn = turn.lock().await;
                let snapshot = store.load().await?;
                let (result, changes) = self.stage(&snapshot, f)?;
                if changes.is_empty() {
                    return Ok(result);
                }
                if let Err(e) = store.write(&changes).await {
                    if matches!(e, LifecycleError::ConcurrentModification { .. }) {
                        tracing::warn!(error = %e, "unit of work lost a write race; nothing committed");
                    }
                    return Err(e);
                }
                Ok(result)
            }
        }
    }

    fn stage<R>(
        &self,
        tables: &Tables,
        f: impl FnOnce(&mut UnitOfWork<'_>) -> Result<R, LifecycleError>,
    ) -> Result<(R, ChangeSet), LifecycleError> {
        let fail_at = self.fail_next.lock().take();
        let mut uow = UnitOfWork::new(tables, fail_at);
        let result = f(&mut uow)?;
        Ok((result, uow.into_changes()))
    }

    /// Read committed state. With a journal this is a fresh load.
    pub async fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, LifecycleError> {
        match &self.backing {
            Backing::Memory(tables) => Ok(f(&*tables.lock().await)),
            Backing::Journal { store, .. } => Ok(f(&store.load().await?)),
        }
    }

    /// Check the backing store is reachable. Always succeeds in memory.
    pub async fn ping(&self) -> Result<(), LifecycleError> {
        match &self.backing {
            Backing::Journal { store, .. } => store.ping().await,
            Backing::Memory(_) => Ok(()),
        }
    }

    /// Make the next unit of work fail when it writes to `table`.
    #[doc(hidden)]
    pub fn fail_next_write(&self, table: Table) {
        *self.fail_next.lock() = Some(table);
    }
}
