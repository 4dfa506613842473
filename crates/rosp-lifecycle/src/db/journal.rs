//! Postgres implementation of the ledger [`Journal`].

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::ledger::{ChangeSet, Journal, Tables, VersionedWrite};
use crate::model::{Address, Director, KycDocument};

use super::rows::{
    AccountRow, AgreementRow, AuditRow, DirectorRow, KycRow, NotificationRow, PaymentRow,
    ProcessedEventRow, ProfileRow, SubscriptionRow, TemplateRow,
};

/// Map a unique-constraint violation to a domain error; anything else is a
/// persistence failure.
fn on_unique(err: sqlx::Error, conflict: impl FnOnce() -> LifecycleError) -> LifecycleError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => conflict(),
        _ => LifecycleError::from(err),
    }
}

fn to_json(address: &Address) -> Result<serde_json::Value, LifecycleError> {
    serde_json::to_value(address)
        .map_err(|e| LifecycleError::Persistence(format!("failed to serialize address: {e}")))
}

/// Postgres-backed journal for the ledger.
#[derive(Debug, Clone)]
pub struct PgJournal {
    pool: PgPool,
}

impl PgJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Journal for PgJournal {
    async fn ping(&self) -> Result<(), LifecycleError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Write one change set in a single SQL transaction.
    async fn write(&self, changes: &ChangeSet) -> Result<(), LifecycleError> {
        let mut tx = self.pool.begin().await?;

        for account in changes.accounts.values() {
            sqlx::query(
                "INSERT INTO accounts (id, email, password_hash, role, active, contact_name, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (id) DO UPDATE SET
                    password_hash = EXCLUDED.password_hash,
                    role = EXCLUDED.role,
                    active = EXCLUDED.active,
                    contact_name = EXCLUDED.contact_name",
            )
            .bind(account.id.as_uuid())
            .bind(account.email.as_str())
            .bind(&account.password_hash)
            .bind(account.role.as_str())
            .bind(account.active)
            .bind(&account.contact_name)
            .bind(account.created_at.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                on_unique(e, || LifecycleError::DuplicateIdentity {
                    email_taken: true,
                    company_taken: false,
                })
            })?;
        }

        for profile in changes.profiles.values() {
            let trading = profile.trading_address.as_ref().map(to_json).transpose()?;
            sqlx::query(
                "INSERT INTO business_profiles (id, account_id, company_name, company_number, company_type,
                    incorporation_date, registered_address, trading_address, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                 ON CONFLICT (id) DO UPDATE SET
                    registered_address = EXCLUDED.registered_address,
                    trading_address = EXCLUDED.trading_address,
                    updated_at = EXCLUDED.updated_at",
            )
            .bind(profile.id.as_uuid())
            .bind(profile.account_id.as_uuid())
            .bind(&profile.company_name)
            .bind(profile.company_number.as_str())
            .bind(&profile.company_type)
            .bind(&profile.incorporation_date)
            .bind(to_json(&profile.registered_address)?)
            .bind(trading)
            .bind(profile.created_at.as_datetime())
            .bind(profile.updated_at.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                on_unique(e, || LifecycleError::DuplicateIdentity {
                    email_taken: false,
                    company_taken: true,
                })
            })?;
        }

        for director in changes.directors.values() {
            write_director(&mut tx, director).await?;
        }

        for template in changes.templates.values() {
            sqlx::query(
                "INSERT INTO agreement_templates (id, version, title, active, created_at)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (id) DO UPDATE SET active = EXCLUDED.active",
            )
            .bind(template.id.as_uuid())
            .bind(template.version)
            .bind(&template.title)
            .bind(template.active)
            .bind(template.created_at.as_datetime())
            .execute(&mut *tx)
            .await?;
        }

        for agreement in changes.agreements.values() {
            sqlx::query(
                "INSERT INTO agreements (id, account_id, template_id, template_version, signature_kind,
                    signature_payload, signer_name, signer_email, origin_address, status, document_key, signed_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                 ON CONFLICT (id) DO UPDATE SET
                    status = EXCLUDED.status,
                    document_key = EXCLUDED.document_key",
            )
            .bind(agreement.id.as_uuid())
            .bind(agreement.account_id.as_uuid())
            .bind(agreement.template_id.as_uuid())
            .bind(agreement.template_version)
            .bind(agreement.signature.kind.as_str())
            .bind(&agreement.signature.payload)
            .bind(&agreement.signer_name)
            .bind(agreement.signer_email.as_str())
            .bind(&agreement.origin_address)
            .bind(agreement.status.as_str())
            .bind(&agreement.document_key)
            .bind(agreement.signed_at.as_datetime())
            .execute(&mut *tx)
            .await?;
        }

        for write in changes.subscriptions.values() {
            write_subscription(&mut tx, write).await?;
        }

        for payment in changes.payments.values() {
            sqlx::query(
                "INSERT INTO payments (id, subscription_id, amount_minor, currency, method, transaction_id,
                    status, failure_reason, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                 ON CONFLICT (id) DO UPDATE SET
                    method = EXCLUDED.method,
                    status = EXCLUDED.status,
                    failure_reason = EXCLUDED.failure_reason,
                    updated_at = EXCLUDED.updated_at",
            )
            .bind(payment.id.as_uuid())
            .bind(payment.subscription_id.as_uuid())
            .bind(payment.amount_minor)
            .bind(&payment.currency)
            .bind(&payment.method)
            .bind(&payment.transaction_id)
            .bind(payment.status().as_str())
            .bind(&payment.failure_reason)
            .bind(payment.created_at.as_datetime())
            .bind(payment.updated_at.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                on_unique(e, || LifecycleError::ConcurrentModification {
                    entity: "payment",
                    id: payment.transaction_id.clone(),
                })
            })?;
        }

        for entry in &changes.audit {
            let sequence = i64::try_from(entry.sequence)
                .map_err(|e| LifecycleError::Persistence(format!("audit sequence overflow: {e}")))?;
            sqlx::query(
                "INSERT INTO audit_entries (sequence, id, account_id, subscription_id, actor_kind, actor_id,
                    action, reason, notes, from_status, to_status, occurred_at, previous_hash, entry_hash)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            )
            .bind(sequence)
            .bind(entry.id)
            .bind(entry.account_id.as_uuid())
            .bind(entry.subscription_id.map(|id| *id.as_uuid()))
            .bind(entry.actor.kind())
            .bind(entry.actor.account_id().map(|id| *id.as_uuid()))
            .bind(&entry.action)
            .bind(&entry.reason)
            .bind(&entry.notes)
            .bind(entry.from_status.map(|s| s.as_str()))
            .bind(entry.to_status.map(|s| s.as_str()))
            .bind(entry.occurred_at.as_datetime())
            .bind(&entry.previous_hash)
            .bind(&entry.entry_hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                on_unique(e, || LifecycleError::ConcurrentModification {
                    entity: "audit chain",
                    id: entry.sequence.to_string(),
                })
            })?;
        }

        for notification in changes.notifications.values() {
            sqlx::query(
                "INSERT INTO notifications (id, account_id, kind, title, message, read, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (id) DO UPDATE SET read = EXCLUDED.read",
            )
            .bind(notification.id.as_uuid())
            .bind(notification.account_id.as_uuid())
            .bind(notification.kind.as_str())
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.read)
            .bind(notification.created_at.as_datetime())
            .execute(&mut *tx)
            .await?;
        }

        for event in &changes.processed_events {
            let inserted = sqlx::query(
                "INSERT INTO processed_events (token, kind, transaction_id, subscription_id, applied_at)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (token) DO NOTHING",
            )
            .bind(&event.token)
            .bind(&event.kind)
            .bind(&event.transaction_id)
            .bind(event.subscription_id.as_uuid())
            .bind(event.applied_at.as_datetime())
            .execute(&mut *tx)
            .await?;
            if inserted.rows_affected() == 0 {
                return Err(LifecycleError::DuplicateEvent {
                    token: event.token.clone(),
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Read every table into a fresh [`Tables`].
    async fn load(&self) -> Result<Tables, LifecycleError> {
        let mut changes = ChangeSet::default();

        let accounts = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, password_hash, role, active, contact_name, created_at FROM accounts",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in accounts {
            let account = row.into_record()?;
            changes.accounts.insert(account.id, account);
        }

        let profiles = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, account_id, company_name, company_number, company_type, incorporation_date,
                    registered_address, trading_address, created_at, updated_at
             FROM business_profiles",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in profiles {
            let profile = row.into_record()?;
            changes.profiles.insert(profile.id, profile);
        }

        let mut documents: HashMap<Uuid, Vec<KycRow>> = HashMap::new();
        let kyc = sqlx::query_as::<_, KycRow>(
            "SELECT director_id, kind, filename, media_type, bytes, sha256, uploaded_at FROM kyc_documents",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in kyc {
            documents.entry(row.director_id).or_default().push(row);
        }
        let directors = sqlx::query_as::<_, DirectorRow>(
            "SELECT id, business_id, full_name, date_of_birth, nationality FROM directors",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in directors {
            let docs = documents.remove(&row.id).unwrap_or_default();
            let director = row.into_record(docs)?;
            changes.directors.insert(director.id, director);
        }

        let templates = sqlx::query_as::<_, TemplateRow>(
            "SELECT id, version, title, active, created_at FROM agreement_templates",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in templates {
            let template = row.into_record();
            changes.templates.insert(template.id, template);
        }

        let agreements = sqlx::query_as::<_, AgreementRow>(
            "SELECT id, account_id, template_id, template_version, signature_kind, signature_payload,
                    signer_name, signer_email, origin_address, status, document_key, signed_at
             FROM agreements",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in agreements {
            let agreement = row.into_record()?;
            changes.agreements.insert(agreement.id, agreement);
        }

        let subscriptions = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, account_id, status, start_date, end_date, payment_method, retry_count,
                    gateway_customer_ref, version, created_at, updated_at
             FROM subscriptions",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in subscriptions {
            let record = row.into_record()?;
            changes.subscriptions.insert(
                record.id(),
                VersionedWrite {
                    record,
                    expected_version: None,
                },
            );
        }

        let payments = sqlx::query_as::<_, PaymentRow>(
            "SELECT id, subscription_id, amount_minor, currency, method, transaction_id, status,
                    failure_reason, created_at, updated_at
             FROM payments",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in payments {
            let payment = row.into_record()?;
            changes.payments.insert(payment.id, payment);
        }

        let audit = sqlx::query_as::<_, AuditRow>(
            "SELECT sequence, id, account_id, subscription_id, actor_kind, actor_id, action, reason, notes,
                    from_status, to_status, occurred_at, previous_hash, entry_hash
             FROM audit_entries ORDER BY sequence",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in audit {
            changes.audit.push(row.into_record()?);
        }

        let notifications = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, account_id, kind, title, message, read, created_at FROM notifications",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in notifications {
            let notification = row.into_record()?;
            changes.notifications.insert(notification.id, notification);
        }

        let events = sqlx::query_as::<_, ProcessedEventRow>(
            "SELECT token, kind, transaction_id, subscription_id, applied_at FROM processed_events",
        )
        .fetch_all(&self.pool)
        .await?;
        changes
            .processed_events
            .extend(events.into_iter().map(ProcessedEventRow::into_record));

        let mut tables = Tables::default();
        tables.apply(changes);
        Ok(tables)
    }
}

async fn write_director(
    tx: &mut Transaction<'_, Postgres>,
    director: &Director,
) -> Result<(), LifecycleError> {
    sqlx::query(
        "INSERT INTO directors (id, business_id, full_name, date_of_birth, nationality)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (id) DO UPDATE SET
            full_name = EXCLUDED.full_name,
            date_of_birth = EXCLUDED.date_of_birth,
            nationality = EXCLUDED.nationality",
    )
    .bind(director.id.as_uuid())
    .bind(director.business_id.as_uuid())
    .bind(&director.full_name)
    .bind(&director.date_of_birth)
    .bind(&director.nationality)
    .execute(&mut **tx)
    .await?;

    let slots: [(&str, &KycDocument); 2] = [
        ("identity_document", &director.identity_document),
        ("address_proof", &director.address_proof),
    ];
    for (kind, doc) in slots {
        sqlx::query(
            "INSERT INTO kyc_documents (director_id, kind, filename, media_type, bytes, sha256, uploaded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (director_id, kind) DO UPDATE SET
                filename = EXCLUDED.filename,
                media_type = EXCLUDED.media_type,
                bytes = EXCLUDED.bytes,
                sha256 = EXCLUDED.sha256,
                uploaded_at = EXCLUDED.uploaded_at",
        )
        .bind(director.id.as_uuid())
        .bind(kind)
        .bind(&doc.filename)
        .bind(&doc.media_type)
        .bind(&doc.bytes)
        .bind(doc.sha256.as_hex())
        .bind(doc.uploaded_at.as_datetime())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn write_subscription(
    tx: &mut Transaction<'_, Postgres>,
    write: &VersionedWrite,
) -> Result<(), LifecycleError> {
    let s = write.record.snapshot();
    let version = i64::try_from(s.version)
        .map_err(|e| LifecycleError::Persistence(format!("subscription version overflow: {e}")))?;
    let retry = i16::from(s.retry_count);

    match write.expected_version {
        None => {
            sqlx::query(
                "INSERT INTO subscriptions (id, account_id, status, start_date, end_date, payment_method,
                    retry_count, gateway_customer_ref, version, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(s.id.as_uuid())
            .bind(s.account_id.as_uuid())
            .bind(s.status.as_str())
            .bind(s.start_date.map(|t| *t.as_datetime()))
            .bind(s.end_date.map(|t| *t.as_datetime()))
            .bind(&s.payment_method)
            .bind(retry)
            .bind(&s.gateway_customer_ref)
            .bind(version)
            .bind(s.created_at.as_datetime())
            .bind(s.updated_at.as_datetime())
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                on_unique(e, || {
                    LifecycleError::InvalidTransition(format!(
                        "account {} already has a subscription",
                        s.account_id
                    ))
                })
            })?;
        }
        Some(expected) => {
            let expected = i64::try_from(expected)
                .map_err(|e| LifecycleError::Persistence(format!("subscription version overflow: {e}")))?;
            let updated = sqlx::query(
                "UPDATE subscriptions SET status = $1, start_date = $2, end_date = $3, payment_method = $4,
                    retry_count = $5, gateway_customer_ref = $6, version = $7, updated_at = $8
                 WHERE id = $9 AND version = $10",
            )
            .bind(s.status.as_str())
            .bind(s.start_date.map(|t| *t.as_datetime()))
            .bind(s.end_date.map(|t| *t.as_datetime()))
            .bind(&s.payment_method)
            .bind(retry)
            .bind(&s.gateway_customer_ref)
            .bind(version)
            .bind(s.updated_at.as_datetime())
            .bind(s.id.as_uuid())
            .bind(expected)
            .execute(&mut **tx)
            .await?;
            if updated.rows_affected() == 0 {
                return Err(LifecycleError::ConcurrentModification {
                    entity: "subscription",
                    id: s.id.to_string(),
                });
            }
        }
    }
    Ok(())
}
