use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::shared::{SourceId, WorkerId};
use crate::target::Timeslot;

// State word layout: 0 = pending, (id << 1) = claimed by id, (id << 1) | 1 = won by id.
// A won word with id 0 marks a date restored from a previous run.
const PENDING: u64 = 0;
const WON_BIT: u64 = 1;
const RESTORED_WIN: u64 = WON_BIT;

fn claimed_word(worker: WorkerId) -> u64 {
    worker.get() << 1
}

/// Who took a date, and with which slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub source: SourceId,
    pub timeslot: Timeslot,
    /// `None` when the win was restored from a previous run.
    pub worker: Option<WorkerId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateOutcome {
    Pending,
    /// A worker holds the right to attempt acquisition; not yet confirmed.
    Claimed { by: WorkerId },
    Won(Winner),
}

struct DateEntry {
    state: AtomicU64,
    winner: OnceLock<Winner>,
}

impl DateEntry {
    fn pending() -> Self {
        Self {
            state: AtomicU64::new(PENDING),
            winner: OnceLock::new(),
        }
    }
}

/// Per-date claim table shared by every worker of a run.
///
/// The set of dates is fixed at construction, so every operation is a single
/// atomic on that date's state word and nothing here ever blocks. A date
/// moves Pending -> Claimed -> Won, or back from Claimed to Pending when the
/// claim holder releases it. Won is terminal for the lifetime of the registry.
pub struct DateOutcomeRegistry {
    dates: HashMap<NaiveDate, DateEntry>,
}

impl DateOutcomeRegistry {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates
                .into_iter()
                .map(|date| (date, DateEntry::pending()))
                .collect(),
        }
    }

    /// Mark a date as already won by an earlier run. Returns false when the
    /// date is unknown or no longer pending.
    pub fn restore_won(&self, date: NaiveDate, source: SourceId, timeslot: Timeslot) -> bool {
        let Some(entry) = self.dates.get(&date) else {
            return false;
        };
        if entry
            .state
            .compare_exchange(PENDING, RESTORED_WIN, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let _ = entry.winner.set(Winner {
            source,
            timeslot,
            worker: None,
        });
        true
    }

    /// Atomically take the right to attempt acquisition for `date`.
    ///
    /// Exactly one concurrent caller observes `true` for a pending date.
    /// Unknown dates are never claimable.
    pub fn try_claim(&self, date: NaiveDate, worker: WorkerId) -> bool {
        self.dates.get(&date).is_some_and(|entry| {
            entry
                .state
                .compare_exchange(
                    PENDING,
                    claimed_word(worker),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
        })
    }

    /// Turn the caller's claim into a confirmed win.
    ///
    /// Fails when `worker` does not hold the claim.
    pub fn confirm_win(&self, date: NaiveDate, worker: WorkerId, winner: Winner) -> bool {
        let Some(entry) = self.dates.get(&date) else {
            return false;
        };
        let claimed = claimed_word(worker);
        if entry.state.load(Ordering::Acquire) != claimed {
            return false;
        }
        // Only the claim holder reaches this point, so the winner slot is
        // written before the state word publishes it.
        if entry.winner.set(winner).is_err() {
            return false;
        }
        entry
            .state
            .compare_exchange(
                claimed,
                claimed | WON_BIT,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Release the caller's claim so peers may try again.
    ///
    /// A no-op (returning false) unless `worker` currently holds the claim;
    /// a confirmed win is never reverted.
    pub fn reset(&self, date: NaiveDate, worker: WorkerId) -> bool {
        self.dates.get(&date).is_some_and(|entry| {
            entry
                .state
                .compare_exchange(
                    claimed_word(worker),
                    PENDING,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
        })
    }

    pub fn is_won(&self, date: NaiveDate) -> bool {
        self.dates
            .get(&date)
            .is_some_and(|entry| entry.state.load(Ordering::Acquire) & WON_BIT == WON_BIT)
    }

    /// True when the date is won by anyone other than `worker`.
    pub fn is_won_by_peer(&self, date: NaiveDate, worker: WorkerId) -> bool {
        self.dates.get(&date).is_some_and(|entry| {
            let word = entry.state.load(Ordering::Acquire);
            word & WON_BIT == WON_BIT && word != (claimed_word(worker) | WON_BIT)
        })
    }

    /// True while another worker holds an unconfirmed claim on the date.
    pub fn is_claimed_by_peer(&self, date: NaiveDate, worker: WorkerId) -> bool {
        self.dates.get(&date).is_some_and(|entry| {
            let word = entry.state.load(Ordering::Acquire);
            word != PENDING && word & WON_BIT == 0 && word != claimed_word(worker)
        })
    }

    pub fn outcome(&self, date: NaiveDate) -> Option<DateOutcome> {
        let entry = self.dates.get(&date)?;
        let word = entry.state.load(Ordering::Acquire);
        if word == PENDING {
            return Some(DateOutcome::Pending);
        }
        if word & WON_BIT == WON_BIT {
            // The winner slot is written before the won bit, so it is present.
            return entry.winner.get().cloned().map(DateOutcome::Won);
        }
        WorkerId::new(word >> 1).map(|by| DateOutcome::Claimed { by })
    }

    pub fn winner(&self, date: NaiveDate) -> Option<Winner> {
        match self.outcome(date)? {
            DateOutcome::Won(winner) => Some(winner),
            _ => None,
        }
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.dates.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 25).unwrap()
    }

    fn worker(raw: u64) -> WorkerId {
        WorkerId::new(raw).unwrap()
    }

    fn winner(worker_id: u64) -> Winner {
        Winner {
            source: SourceId::from_string("room-a"),
            timeslot: Timeslot::parse("19:00").unwrap(),
            worker: Some(worker(worker_id)),
        }
    }

    #[test]
    fn test_claim_confirm_and_peer_views() {
        let registry = DateOutcomeRegistry::new([date()]);

        assert!(registry.try_claim(date(), worker(1)));
        assert!(!registry.try_claim(date(), worker(2)));
        assert!(registry.is_claimed_by_peer(date(), worker(2)));
        assert!(!registry.is_claimed_by_peer(date(), worker(1)));
        assert!(!registry.is_won(date()));

        assert!(registry.confirm_win(date(), worker(1), winner(1)));
        assert!(registry.is_won(date()));
        assert!(registry.is_won_by_peer(date(), worker(2)));
        assert!(!registry.is_won_by_peer(date(), worker(1)));
        assert_eq!(registry.winner(date()), Some(winner(1)));
    }

    #[test]
    fn test_reset_only_releases_own_claim() {
        let registry = DateOutcomeRegistry::new([date()]);
        assert!(registry.try_claim(date(), worker(1)));

        assert!(!registry.reset(date(), worker(2)));
        assert_eq!(
            registry.outcome(date()),
            Some(DateOutcome::Claimed { by: worker(1) })
        );

        assert!(registry.reset(date(), worker(1)));
        assert_eq!(registry.outcome(date()), Some(DateOutcome::Pending));
        assert!(registry.try_claim(date(), worker(2)));
    }

    #[test]
    fn test_won_is_irreversible() {
        let registry = DateOutcomeRegistry::new([date()]);
        assert!(registry.try_claim(date(), worker(1)));
        assert!(registry.confirm_win(date(), worker(1), winner(1)));

        assert!(!registry.reset(date(), worker(1)));
        assert!(!registry.try_claim(date(), worker(2)));
        assert!(registry.is_won(date()));
    }

    #[test]
    fn test_confirm_requires_claim() {
        let registry = DateOutcomeRegistry::new([date()]);
        assert!(!registry.confirm_win(date(), worker(1), winner(1)));
        assert_eq!(registry.outcome(date()), Some(DateOutcome::Pending));
    }

    #[test]
    fn test_unknown_date_is_inert() {
        let registry = DateOutcomeRegistry::new([date()]);
        let other = NaiveDate::from_ymd_opt(2026, 10, 26).unwrap();

        assert!(!registry.try_claim(other, worker(1)));
        assert!(!registry.is_won(other));
        assert!(registry.outcome(other).is_none());
    }

    #[test]
    fn test_restored_win_blocks_every_worker() {
        let registry = DateOutcomeRegistry::new([date()]);
        assert!(registry.restore_won(
            date(),
            SourceId::from_string("room-b"),
            Timeslot::parse("20:00").unwrap()
        ));

        assert!(registry.is_won_by_peer(date(), worker(1)));
        assert!(!registry.try_claim(date(), worker(1)));
        assert_eq!(registry.winner(date()).and_then(|w| w.worker), None);
    }

    #[test]
    fn test_concurrent_claims_have_single_winner() {
        let registry = Arc::new(DateOutcomeRegistry::new([date()]));
        let granted = Arc::new(AtomicUsize::new(0));
        let contenders = 16;
        let barrier = Arc::new(Barrier::new(contenders));

        let handles: Vec<_> = (1..=contenders as u64)
            .map(|raw| {
                let registry = Arc::clone(&registry);
                let granted = Arc::clone(&granted);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    if registry.try_claim(date(), worker(raw)) {
                        granted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(granted.load(Ordering::SeqCst), 1);
    }
}
