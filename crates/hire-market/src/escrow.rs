//! Funds held against a task until it settles.
//!
//! Each entry sits behind its own mutex, so concurrent resolutions of the
//! same entry are serialized while different entries resolve in parallel.
//! Resolving an entry that is unknown or already terminal is a no-op that
//! returns `None`; the payee is never credited twice.
//!
//! The book also keeps a running balance per party. Release credits the
//! payee and refund credits the payer, inside the same critical section as
//! the status change.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hire_core::Amount;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::MarketError;
use crate::ledger::{Ledger, LedgerEvent, LedgerEventType};

/// Unique escrow identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EscrowId(String);

impl EscrowId {
    /// Generates a fresh id.
    pub fn generate() -> Self {
        Self(format!("escrow-{}", Uuid::new_v4()))
    }

    /// Wraps an existing id.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EscrowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of an escrow entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Funds locked.
    Held,
    /// Paid to the payee. Terminal.
    Released,
    /// Returned to the payer. Terminal.
    Refunded,
}

impl EscrowStatus {
    /// Only `held -> released` and `held -> refunded` are allowed.
    #[must_use]
    pub const fn can_transition_to(&self, target: &Self) -> bool {
        matches!(
            (self, target),
            (Self::Held, Self::Released | Self::Refunded)
        )
    }

    /// Returns true for released and refunded.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Held => write!(f, "held"),
            Self::Released => write!(f, "released"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

/// Funds held for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowEntry {
    /// Unique id.
    pub escrow_id: EscrowId,
    /// Who put the funds in.
    pub payer: String,
    /// Who receives them on release.
    pub payee: String,
    /// Amount held.
    pub amount: Amount,
    /// Task the funds are held against.
    pub task_id: String,
    /// Current status.
    pub status: EscrowStatus,
    /// When the funds were held.
    pub created_at: DateTime<Utc>,
    /// When the entry reached a terminal status.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl EscrowEntry {
    fn transition_to(&mut self, target: EscrowStatus) -> Result<(), MarketError> {
        if !self.status.can_transition_to(&target) {
            return Err(MarketError::InvalidStateTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}

/// Escrow book backed by a shared ledger.
#[derive(Debug)]
pub struct Escrow {
    entries: RwLock<HashMap<EscrowId, Arc<Mutex<EscrowEntry>>>>,
    balances: RwLock<HashMap<String, Amount>>,
    ledger: Arc<Ledger>,
}

impl Escrow {
    /// Creates an empty escrow book writing to `ledger`.
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            balances: RwLock::new(HashMap::new()),
            ledger,
        }
    }

    /// Locks `amount` from `payer` for `payee` against `task_id`.
    pub fn hold(
        &self,
        payer: &str,
        payee: &str,
        amount: Amount,
        task_id: &str,
    ) -> EscrowEntry {
        let entry = EscrowEntry {
            escrow_id: EscrowId::generate(),
            payer: payer.to_string(),
            payee: payee.to_string(),
            amount,
            task_id: task_id.to_string(),
            status: EscrowStatus::Held,
            created_at: Utc::now(),
            resolved_at: None,
        };

        self.ledger.record(
            LedgerEvent::new(LedgerEventType::EscrowHeld, payer, payee, amount)
                .with_task(task_id)
                .with_escrow(entry.escrow_id.clone()),
        );
        self.entries
            .write()
            .insert(entry.escrow_id.clone(), Arc::new(Mutex::new(entry.clone())));

        debug!(escrow_id = %entry.escrow_id, %amount, task_id, "escrow held");
        entry
    }

    /// Pays the held funds to the payee.
    ///
    /// Returns `None` if the entry is unknown or already resolved.
    pub fn release(&self, escrow_id: &EscrowId) -> Option<EscrowEntry> {
        self.resolve(escrow_id, EscrowStatus::Released)
    }

    /// Returns the held funds to the payer.
    ///
    /// Returns `None` if the entry is unknown or already resolved.
    pub fn refund(&self, escrow_id: &EscrowId) -> Option<EscrowEntry> {
        self.resolve(escrow_id, EscrowStatus::Refunded)
    }

    fn resolve(&self, escrow_id: &EscrowId, target: EscrowStatus) -> Option<EscrowEntry> {
        let slot = self.entries.read().get(escrow_id).cloned()?;
        let mut entry = slot.lock();

        if let Err(err) = entry.transition_to(target) {
            debug!(%escrow_id, %err, "escrow already resolved");
            return None;
        }

        let (event_type, recipient) = match target {
            EscrowStatus::Released => (LedgerEventType::EscrowReleased, entry.payee.clone()),
            EscrowStatus::Refunded | EscrowStatus::Held => {
                (LedgerEventType::EscrowRefunded, entry.payer.clone())
            }
        };
        self.credit(&recipient, entry.amount);
        self.ledger.record(
            LedgerEvent::new(event_type, entry.payer.as_str(), entry.payee.as_str(), entry.amount)
                .with_task(entry.task_id.as_str())
                .with_escrow(escrow_id.clone()),
        );

        info!(
            %escrow_id,
            status = %entry.status,
            amount = %entry.amount,
            payee = %entry.payee,
            "escrow resolved"
        );
        Some(entry.clone())
    }

    /// Current state of an entry.
    pub fn get(&self, escrow_id: &EscrowId) -> Option<EscrowEntry> {
        self.entries
            .read()
            .get(escrow_id)
            .map(|slot| slot.lock().clone())
    }

    /// Entries in `status`, oldest first.
    pub fn entries_with_status(&self, status: EscrowStatus) -> Vec<EscrowEntry> {
        let mut found: Vec<EscrowEntry> = self
            .entries
            .read()
            .values()
            .map(|slot| slot.lock().clone())
            .filter(|e| e.status == status)
            .collect();
        found.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.escrow_id.cmp(&b.escrow_id))
        });
        found
    }

    /// Every entry held against `task_id`, oldest first.
    pub fn entries_for_task(&self, task_id: &str) -> Vec<EscrowEntry> {
        let mut found: Vec<EscrowEntry> = self
            .entries
            .read()
            .values()
            .map(|slot| slot.lock().clone())
            .filter(|e| e.task_id == task_id)
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        found
    }

    /// Sum of funds still held.
    pub fn held_total(&self) -> Amount {
        self.total_with_status(EscrowStatus::Held)
    }

    /// Sum of funds paid out to payees.
    pub fn total_released(&self) -> Amount {
        self.total_with_status(EscrowStatus::Released)
    }

    fn total_with_status(&self, status: EscrowStatus) -> Amount {
        self.entries
            .read()
            .values()
            .map(|slot| {
                let entry = slot.lock();
                if entry.status == status { entry.amount } else { Amount::ZERO }
            })
            .sum()
    }

    /// Balance credited to `party`, zero if never credited.
    pub fn balance(&self, party: &str) -> Amount {
        self.balances
            .read()
            .get(party)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Every known party's balance, ordered by party.
    pub fn balances(&self) -> BTreeMap<String, Amount> {
        self.balances
            .read()
            .iter()
            .map(|(party, amount)| (party.clone(), *amount))
            .collect()
    }

    /// Adds `amount` to `party`'s balance.
    pub fn credit(&self, party: &str, amount: Amount) {
        let mut balances = self.balances.write();
        let balance = balances.entry(party.to_string()).or_insert(Amount::ZERO);
        *balance = balance.saturating_add(amount);
        debug!(party, %amount, balance = %balance, "balance credited");
    }

    /// Takes `amount` from `party`'s balance.
    ///
    /// Returns false, leaving the balance untouched, if it holds less than
    /// `amount`.
    pub fn debit(&self, party: &str, amount: Amount) -> bool {
        let mut balances = self.balances.write();
        let current = balances.get(party).copied().unwrap_or(Amount::ZERO);
        match current.checked_sub(amount) {
            Some(left) => {
                balances.insert(party.to_string(), left);
                debug!(party, %amount, balance = %left, "balance debited");
                true
            }
            None => {
                warn!(party, %amount, balance = %current, "insufficient balance");
                false
            }
        }
    }

    /// The ledger this escrow writes to.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerQuery;
    use test_case::test_case;

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    fn escrow() -> Escrow {
        Escrow::new(Arc::new(Ledger::new()))
    }

    #[test_case(EscrowStatus::Held, EscrowStatus::Released, true)]
    #[test_case(EscrowStatus::Held, EscrowStatus::Refunded, true)]
    #[test_case(EscrowStatus::Held, EscrowStatus::Held, false)]
    #[test_case(EscrowStatus::Released, EscrowStatus::Refunded, false)]
    #[test_case(EscrowStatus::Refunded, EscrowStatus::Released, false)]
    #[test_case(EscrowStatus::Released, EscrowStatus::Released, false)]
    fn status_transitions(from: EscrowStatus, to: EscrowStatus, allowed: bool) {
        assert_eq!(from.can_transition_to(&to), allowed);
    }

    #[test]
    fn hold_records_ledger_event() {
        let escrow = escrow();
        let entry = escrow.hold("buyer", "design-studio", amount("0.15"), "task-1");

        assert_eq!(entry.status, EscrowStatus::Held);
        assert!(entry.resolved_at.is_none());
        assert!(entry.escrow_id.as_str().starts_with("escrow-"));

        let events = escrow.ledger().entries();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, LedgerEventType::EscrowHeld);
        assert_eq!(events[0].escrow_id.as_ref(), Some(&entry.escrow_id));
        assert_eq!(escrow.held_total(), amount("0.15"));
    }

    #[test]
    fn release_is_idempotent() {
        let escrow = escrow();
        let entry = escrow.hold("buyer", "agent", amount("1"), "task-1");

        let released = escrow.release(&entry.escrow_id).expect("first release");
        assert_eq!(released.status, EscrowStatus::Released);
        assert!(released.resolved_at.is_some());

        assert!(escrow.release(&entry.escrow_id).is_none());
        assert!(escrow.refund(&entry.escrow_id).is_none());

        let releases = escrow
            .ledger()
            .query(&LedgerQuery::all().event_type(LedgerEventType::EscrowReleased));
        assert_eq!(releases.len(), 1);
        assert!(escrow
            .ledger()
            .query(&LedgerQuery::all().event_type(LedgerEventType::EscrowRefunded))
            .is_empty());
        assert_eq!(
            escrow.get(&entry.escrow_id).map(|e| e.status),
            Some(EscrowStatus::Released)
        );
    }

    #[test]
    fn refund_is_idempotent() {
        let escrow = escrow();
        let entry = escrow.hold("buyer", "agent", amount("0.5"), "task-1");

        assert!(escrow.refund(&entry.escrow_id).is_some());
        assert!(escrow.refund(&entry.escrow_id).is_none());
        assert!(escrow.release(&entry.escrow_id).is_none());
        assert_eq!(escrow.ledger().len(), 2);
        assert_eq!(escrow.held_total(), Amount::ZERO);
    }

    #[test]
    fn unknown_escrow_is_not_found() {
        let escrow = escrow();
        let ghost = EscrowId::from_string("escrow-ghost");
        assert!(escrow.release(&ghost).is_none());
        assert!(escrow.refund(&ghost).is_none());
        assert!(escrow.get(&ghost).is_none());
        assert!(escrow.ledger().is_empty());
    }

    #[test]
    fn entries_with_status_partitions_the_book() {
        let escrow = escrow();
        let a = escrow.hold("buyer", "a", amount("1"), "t-a");
        let b = escrow.hold("buyer", "b", amount("2"), "t-b");
        let _c = escrow.hold("buyer", "c", amount("3"), "t-c");

        escrow.release(&a.escrow_id);
        escrow.refund(&b.escrow_id);

        assert_eq!(escrow.entries_with_status(EscrowStatus::Held).len(), 1);
        assert_eq!(escrow.entries_with_status(EscrowStatus::Released)[0].payee, "a");
        assert_eq!(escrow.entries_with_status(EscrowStatus::Refunded)[0].payee, "b");
        assert_eq!(escrow.held_total(), amount("3"));
    }

    #[test]
    fn release_credits_payee_and_refund_credits_payer() {
        let escrow = escrow();
        let paid = escrow.hold("buyer", "seller", amount("1"), "task-1");
        let returned = escrow.hold("buyer", "seller", amount("0.25"), "task-2");

        escrow.release(&paid.escrow_id);
        assert_eq!(escrow.balance("seller"), amount("1"));
        assert_eq!(escrow.balance("buyer"), Amount::ZERO);

        escrow.refund(&returned.escrow_id);
        assert_eq!(escrow.balance("buyer"), amount("0.25"));
        assert_eq!(escrow.balance("seller"), amount("1"));
        assert_eq!(escrow.total_released(), amount("1"));

        // repeated resolutions never credit again
        escrow.release(&paid.escrow_id);
        escrow.refund(&paid.escrow_id);
        escrow.refund(&returned.escrow_id);
        assert_eq!(escrow.balance("seller"), amount("1"));
        assert_eq!(escrow.balance("buyer"), amount("0.25"));

        let balances = escrow.balances();
        assert_eq!(balances.len(), 2);
        assert_eq!(balances["seller"], amount("1"));
    }

    #[test]
    fn debit_refuses_overdraft() {
        let escrow = escrow();
        assert_eq!(escrow.balance("nobody"), Amount::ZERO);
        assert!(!escrow.debit("nobody", amount("0.01")));

        escrow.credit("agent", amount("2"));
        escrow.credit("agent", amount("0.5"));
        assert!(escrow.debit("agent", amount("1.5")));
        assert_eq!(escrow.balance("agent"), amount("1"));
        assert!(!escrow.debit("agent", amount("1.01")));
        assert_eq!(escrow.balance("agent"), amount("1"));
        assert!(escrow.debit("agent", amount("1")));
        assert_eq!(escrow.balance("agent"), Amount::ZERO);
    }

    #[test]
    fn entries_for_task_filters_by_task() {
        let escrow = escrow();
        escrow.hold("buyer", "a", amount("1"), "task-1");
        escrow.hold("buyer", "b", amount("2"), "task-2");
        escrow.hold("buyer", "c", amount("3"), "task-1");

        let found = escrow.entries_for_task("task-1");
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|e| e.task_id == "task-1"));
        assert!(escrow.entries_for_task("task-9").is_empty());
    }

    #[test]
    fn concurrent_release_credits_once() {
        let escrow = Arc::new(escrow());
        let entry = escrow.hold("buyer", "agent", amount("0.15"), "task-1");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let escrow = Arc::clone(&escrow);
                let id = entry.escrow_id.clone();
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        escrow.release(&id).is_some()
                    } else {
                        escrow.refund(&id).is_some()
                    }
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        // hold + exactly one resolution
        assert_eq!(escrow.ledger().len(), 2);
        let credited = escrow.balance("agent").saturating_add(escrow.balance("buyer"));
        assert_eq!(credited, amount("0.15"));
        assert!(escrow.ledger().verify_chain().is_ok());
    }
}
