//! Append-only audit log of financial events.
//!
//! The ledger is the history of how escrow state came to be. Entries are
//! never mutated or removed (apart from [`Ledger::clear`] for test resets).
//! Each entry is hash-chained to its predecessor with blake3 so that
//! after-the-fact edits are detectable with [`Ledger::verify_chain`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use hire_core::Amount;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::MarketError;
use crate::escrow::EscrowId;

/// Hash used as `prev_hash` of the first entry.
pub const GENESIS_HASH: [u8; 32] = [0; 32];

/// Financial event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventType {
    /// Buyer asked to pay an agent.
    PaymentRequested,
    /// Payment passed the verification hook.
    PaymentVerified,
    /// Payment was refused by the verification hook.
    PaymentRejected,
    /// Funds placed in escrow.
    EscrowHeld,
    /// Escrowed funds paid to the agent.
    EscrowReleased,
    /// Escrowed funds returned to the buyer.
    EscrowRefunded,
}

impl LedgerEventType {
    /// Stable name used in hashes and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentRequested => "payment_requested",
            Self::PaymentVerified => "payment_verified",
            Self::PaymentRejected => "payment_rejected",
            Self::EscrowHeld => "escrow_held",
            Self::EscrowReleased => "escrow_released",
            Self::EscrowRefunded => "escrow_refunded",
        }
    }
}

impl fmt::Display for LedgerEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller-supplied part of a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEvent {
    /// Kind of event.
    pub event_type: LedgerEventType,
    /// Party paying.
    pub payer: String,
    /// Party being paid.
    pub payee: String,
    /// Amount involved.
    pub amount: Amount,
    /// Related task.
    pub task_id: Option<String>,
    /// Related escrow.
    pub escrow_id: Option<EscrowId>,
    /// Free-form annotations.
    pub metadata: BTreeMap<String, String>,
}

impl LedgerEvent {
    /// Creates an event with no task, escrow or metadata.
    pub fn new(
        event_type: LedgerEventType,
        payer: impl Into<String>,
        payee: impl Into<String>,
        amount: Amount,
    ) -> Self {
        Self {
            event_type,
            payer: payer.into(),
            payee: payee.into(),
            amount,
            task_id: None,
            escrow_id: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Attaches a task id.
    #[must_use]
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Attaches an escrow id.
    #[must_use]
    pub fn with_escrow(mut self, escrow_id: EscrowId) -> Self {
        self.escrow_id = Some(escrow_id);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// An immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry id.
    pub entry_id: String,
    /// Position in the ledger, starting at 0.
    pub sequence: u64,
    /// Kind of event.
    pub event_type: LedgerEventType,
    /// Party paying.
    pub payer: String,
    /// Party being paid.
    pub payee: String,
    /// Amount involved.
    pub amount: Amount,
    /// Related task.
    pub task_id: Option<String>,
    /// Related escrow.
    pub escrow_id: Option<EscrowId>,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Free-form annotations.
    pub metadata: BTreeMap<String, String>,
    /// Hash of the previous entry.
    pub prev_hash: [u8; 32],
    /// Hash of this entry chained from `prev_hash`.
    pub hash: [u8; 32],
}

impl LedgerEntry {
    fn compute_hash(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.prev_hash);
        hasher.update(&self.sequence.to_le_bytes());
        hasher.update(self.entry_id.as_bytes());
        hasher.update(self.event_type.as_str().as_bytes());
        hasher.update(self.payer.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.payee.as_bytes());
        hasher.update(&[0]);
        hasher.update(&self.amount.as_nano().to_le_bytes());
        hasher.update(self.task_id.as_deref().unwrap_or("").as_bytes());
        hasher.update(&[0]);
        hasher.update(self.escrow_id.as_ref().map_or("", EscrowId::as_str).as_bytes());
        hasher.update(&[0]);
        hasher.update(&self.timestamp.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        for (key, value) in &self.metadata {
            hasher.update(key.as_bytes());
            hasher.update(&[0]);
            hasher.update(value.as_bytes());
            hasher.update(&[0]);
        }
        *hasher.finalize().as_bytes()
    }

    /// True if `agent_id` is the payer or the payee.
    #[must_use]
    pub fn involves(&self, agent_id: &str) -> bool {
        self.payer == agent_id || self.payee == agent_id
    }
}

/// Filter for [`Ledger::query`]. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct LedgerQuery {
    /// Only this kind of event.
    pub event_type: Option<LedgerEventType>,
    /// Only events where this party pays or is paid.
    pub agent_id: Option<String>,
    /// Only events for this task.
    pub task_id: Option<String>,
}

impl LedgerQuery {
    /// Matches everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to one event type.
    #[must_use]
    pub fn event_type(mut self, event_type: LedgerEventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Restricts to one party.
    #[must_use]
    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Restricts to one task.
    #[must_use]
    pub fn task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    fn matches(&self, entry: &LedgerEntry) -> bool {
        self.event_type.is_none_or(|t| t == entry.event_type)
            && self.agent_id.as_deref().is_none_or(|a| entry.involves(a))
            && self
                .task_id
                .as_deref()
                .is_none_or(|t| entry.task_id.as_deref() == Some(t))
    }
}

/// Append-only, hash-chained event log.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: RwLock<Vec<LedgerEntry>>,
}

impl Ledger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event. Always succeeds.
    pub fn record(&self, event: LedgerEvent) -> LedgerEntry {
        let mut entries = self.entries.write();
        let (sequence, prev_hash) = entries
            .last()
            .map_or((0, GENESIS_HASH), |last| (last.sequence + 1, last.hash));

        let mut entry = LedgerEntry {
            entry_id: format!("ledger-{}", Uuid::new_v4()),
            sequence,
            event_type: event.event_type,
            payer: event.payer,
            payee: event.payee,
            amount: event.amount,
            task_id: event.task_id,
            escrow_id: event.escrow_id,
            timestamp: Utc::now(),
            metadata: event.metadata,
            prev_hash,
            hash: [0; 32],
        };
        entry.hash = entry.compute_hash();

        debug!(
            sequence,
            event_type = %entry.event_type,
            amount = %entry.amount,
            "ledger entry recorded"
        );
        entries.push(entry.clone());
        entry
    }

    /// Entries matching `query`, in append order.
    pub fn query(&self, query: &LedgerQuery) -> Vec<LedgerEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect()
    }

    /// Every entry, in append order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.read().clone()
    }

    /// Sum of every entry's amount, whatever its type.
    pub fn total_volume(&self) -> Amount {
        self.entries.read().iter().map(|e| e.amount).sum()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Checks sequence numbers and the hash chain from the first entry.
    pub fn verify_chain(&self) -> Result<(), MarketError> {
        let entries = self.entries.read();
        let mut prev_hash = GENESIS_HASH;
        for (expected_sequence, entry) in (0u64..).zip(entries.iter()) {
            if entry.sequence != expected_sequence
                || entry.prev_hash != prev_hash
                || entry.compute_hash() != entry.hash
            {
                return Err(MarketError::LedgerIntegrity {
                    sequence: entry.sequence,
                });
            }
            prev_hash = entry.hash;
        }
        Ok(())
    }

    /// Drops every entry. Test-time reset only.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    #[cfg(test)]
    pub(crate) fn tamper(&self, index: usize, amount: Amount) {
        if let Some(entry) = self.entries.write().get_mut(index) {
            entry.amount = amount;
        }
    }
}
