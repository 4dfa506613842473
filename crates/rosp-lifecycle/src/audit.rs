//! # Audit Trail
//!
//! Every status transition, payment event and operator action appends one
//! entry. Entries form a SHA-256 hash chain:
//!
//! ```text
//! entry_hash = sha256(previous_hash | sequence | account | subscription | actor
//!                     | action | reason | notes | from | to | occurred_at)
//! ```
//!
//! The first entry chains to [`GENESIS_HASH`]. Editing or deleting any row
//! breaks verification from that row onward.

use serde::Serialize;

use rosp_core::{sha256_hex, AccountId, SubscriptionId};

use crate::error::LifecycleError;
use crate::model::{AuditEntry, NewAuditEntry};
use crate::Engine;

/// Previous-hash value of the first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Compute the chained hash of an entry at `sequence`.
pub fn chain_hash(previous_hash: &str, sequence: u64, entry: &NewAuditEntry) -> String {
    let opt = |v: Option<String>| v.unwrap_or_default();
    let input = [
        previous_hash.to_string(),
        sequence.to_string(),
        entry.account_id.to_string(),
        opt(entry.subscription_id.map(|id| id.to_string())),
        entry.actor.to_string(),
        entry.action.clone(),
        opt(entry.reason.clone()),
        opt(entry.notes.clone()),
        opt(entry.from_status.map(|s| s.to_string())),
        opt(entry.to_status.map(|s| s.to_string())),
        entry.occurred_at.to_iso8601(),
    ]
    .join("|");
    sha256_hex(&input)
}

impl From<&AuditEntry> for NewAuditEntry {
    fn from(entry: &AuditEntry) -> Self {
        Self {
            account_id: entry.account_id,
            subscription_id: entry.subscription_id,
            actor: entry.actor,
            action: entry.action.clone(),
            reason: entry.reason.clone(),
            notes: entry.notes.clone(),
            from_status: entry.from_status,
            to_status: entry.to_status,
            occurred_at: entry.occurred_at,
        }
    }
}

/// Result of walking the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub total_entries: usize,
    /// Sequence numbers whose link or content hash does not verify.
    pub broken_links: Vec<u64>,
    pub chain_valid: bool,
}

/// Verify link continuity, sequence continuity and every content hash.
pub fn verify_chain(entries: &[AuditEntry]) -> ChainVerification {
    let mut broken = Vec::new();
    let mut expected_previous = GENESIS_HASH;
    let mut expected_sequence = 1u64;

    for entry in entries {
        let linked = entry.previous_hash == expected_previous && entry.sequence == expected_sequence;
        let recomputed = chain_hash(&entry.previous_hash, entry.sequence, &NewAuditEntry::from(entry));
        if !linked || recomputed != entry.entry_hash {
            broken.push(entry.sequence);
        }
        expected_previous = &entry.entry_hash;
        expected_sequence = entry.sequence + 1;
    }

    ChainVerification {
        total_entries: entries.len(),
        chain_valid: broken.is_empty(),
        broken_links: broken,
    }
}

impl Engine {
    /// Audit entries for one subscription, oldest first.
    pub async fn audit_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<AuditEntry>, LifecycleError> {
        self.ledger
            .read(|t| {
                if t.subscription(subscription_id).is_none() {
                    return Err(LifecycleError::not_found("subscription", subscription_id));
                }
                Ok(t.audit()
                    .iter()
                    .filter(|e| e.subscription_id == Some(subscription_id))
                    .cloned()
                    .collect())
            })
            .await?
    }

    /// Audit entries for one account, oldest first.
    pub async fn audit_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<AuditEntry>, LifecycleError> {
        self.ledger
            .read(|t| {
                t.audit()
                    .iter()
                    .filter(|e| e.account_id == account_id)
                    .cloned()
                    .collect()
            })
            .await
    }

    pub async fn verify_audit_chain(&self) -> Result<ChainVerification, LifecycleError> {
        let result = self.ledger.read(|t| verify_chain(t.audit())).await?;
        if !result.chain_valid {
            tracing::error!(broken = ?result.broken_links, "audit chain verification failed");
        }
        Ok(result)
    }
}
