//! Count of project builds currently in flight.
//!
//! The zero transition picks the single moment the trace pipeline is torn
//! down: whichever terminal callback observes it runs the shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared atomic count of open top-level project builds.
#[derive(Debug, Default)]
pub struct ActiveProjectCounter(AtomicUsize);

impl ActiveProjectCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called on project start. Returns the new count, for diagnostics only.
    pub fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Called on a project's terminal callback. True for exactly the call
    /// that brings the count to zero: the single `fetch_sub` makes the
    /// transition atomic, so two racing terminal callbacks can never both
    /// observe it.
    pub fn decrement_and_check_zero(&self) -> bool {
        self.0.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn paired_calls_balance() {
        let counter = ActiveProjectCounter::new();
        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.increment(), 2);
        assert!(!counter.decrement_and_check_zero());
        assert!(counter.decrement_and_check_zero());
    }

    #[test]
    fn zero_is_observed_exactly_once_under_contention() {
        let counter = Arc::new(ActiveProjectCounter::new());
        let threads = 8;
        for _ in 0..threads {
            counter.increment();
        }

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || counter.decrement_and_check_zero())
            })
            .collect();

        let zero_observations = handles
            .into_iter()
            .map(|handle| handle.join().expect("decrement thread panicked"))
            .filter(|observed| *observed)
            .count();
        assert_eq!(zero_observations, 1);
    }
}
