//! Global spending ceiling shared by every hire.

use std::sync::atomic::{AtomicU64, Ordering};

use hire_core::Amount;
use tracing::{debug, warn};

/// Tracks cumulative spend against a fixed total.
///
/// [`reserve`](Self::reserve) is the single enforcement point: it checks and
/// commits in one compare-and-swap, so concurrent hires can never jointly
/// overspend.
#[derive(Debug)]
pub struct BudgetTracker {
    total: Amount,
    spent: AtomicU64,
}

impl BudgetTracker {
    /// Creates a tracker with nothing spent.
    pub fn new(total: Amount) -> Self {
        Self {
            total,
            spent: AtomicU64::new(0),
        }
    }

    /// Commits `amount` if `spent + amount <= total`. Returns false otherwise,
    /// leaving the tracker unchanged.
    pub fn reserve(&self, amount: Amount) -> bool {
        let total = self.total.as_nano();
        let result = self
            .spent
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |spent| {
                spent
                    .checked_add(amount.as_nano())
                    .filter(|next| *next <= total)
            });
        match result {
            Ok(previous) => {
                debug!(%amount, spent = %Amount::from_nano(previous), "budget reserved");
                true
            }
            Err(spent) => {
                warn!(
                    %amount,
                    spent = %Amount::from_nano(spent),
                    total = %self.total,
                    "budget reservation rejected"
                );
                false
            }
        }
    }

    /// Returns a reservation, never dropping spend below zero.
    pub fn release(&self, amount: Amount) {
        let _ = self
            .spent
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |spent| {
                Some(spent.saturating_sub(amount.as_nano()))
            });
        debug!(%amount, "budget released");
    }

    /// Amount committed so far.
    pub fn spent(&self) -> Amount {
        Amount::from_nano(self.spent.load(Ordering::Acquire))
    }

    /// Amount still available.
    pub fn remaining(&self) -> Amount {
        self.total.saturating_sub(self.spent())
    }

    /// The ceiling.
    pub fn total(&self) -> Amount {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn reserve_within_budget() {
        let budget = BudgetTracker::new(amount("5.0"));
        assert!(budget.reserve(amount("0.15")));
        assert_eq!(budget.spent(), amount("0.15"));
        assert_eq!(budget.remaining(), amount("4.85"));
        assert_eq!(budget.remaining().to_string(), "4.85");
    }

    #[test]
    fn reserve_exact_remaining_succeeds() {
        let budget = BudgetTracker::new(amount("1"));
        assert!(budget.reserve(amount("0.4")));
        assert!(budget.reserve(amount("0.6")));
        assert_eq!(budget.remaining(), Amount::ZERO);
        assert!(!budget.reserve(amount("0.000000001")));
    }

    #[test]
    fn rejected_reservation_leaves_state_unchanged() {
        let budget = BudgetTracker::new(amount("0.10"));
        assert!(!budget.reserve(amount("0.15")));
        assert_eq!(budget.spent(), Amount::ZERO);
    }

    #[test]
    fn zero_price_always_fits() {
        let budget = BudgetTracker::new(Amount::ZERO);
        assert!(budget.reserve(Amount::ZERO));
        assert!(budget.reserve(Amount::ZERO));
    }

    #[test]
    fn huge_reservation_does_not_overflow() {
        let budget = BudgetTracker::new(Amount::MAX);
        assert!(budget.reserve(amount("1")));
        assert!(!budget.reserve(Amount::MAX));
    }

    #[test]
    fn release_returns_funds() {
        let budget = BudgetTracker::new(amount("1"));
        assert!(budget.reserve(amount("0.7")));
        budget.release(amount("0.7"));
        assert_eq!(budget.spent(), Amount::ZERO);
        budget.release(amount("5"));
        assert_eq!(budget.spent(), Amount::ZERO);
    }

    #[test]
    fn concurrent_reservations_never_overspend() {
        let budget = Arc::new(BudgetTracker::new(amount("1.0")));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let budget = Arc::clone(&budget);
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| budget.reserve(amount("0.03")))
                        .count()
                })
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 33);
        assert_eq!(budget.spent(), amount("0.99"));
    }

    proptest! {
        #[test]
        fn spent_never_exceeds_total(
            total in 0u64..10_000_000_000,
            requests in proptest::collection::vec(0u64..2_000_000_000, 0..40),
        ) {
            let budget = BudgetTracker::new(Amount::from_nano(total));
            let mut granted = 0u64;
            for nano in requests {
                if budget.reserve(Amount::from_nano(nano)) {
                    granted += nano;
                }
            }
            prop_assert!(budget.spent() <= budget.total());
            prop_assert_eq!(budget.spent().as_nano(), granted);
        }
    }
}
