//! Generation-counted rendezvous for a fixed set of partition workers.
//!
//! Unlike `std::sync::Barrier`, this one can be abandoned: a worker whose
//! transition failed breaks the barrier so its peers stop waiting for it.

use std::sync::{Condvar, Mutex, MutexGuard};

/// Returned by [`Barrier::wait`] once the barrier has been abandoned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BarrierAbandoned;

struct BarrierState {
    remaining: usize,
    generation: u64,
    abandoned: bool,
}

pub struct Barrier {
    threshold: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl Barrier {
    pub fn new(participants: usize) -> Self {
        let threshold = participants.max(1);
        Self {
            threshold,
            state: Mutex::new(BarrierState {
                remaining: threshold,
                generation: 0,
                abandoned: false,
            }),
            released: Condvar::new(),
        }
    }

    #[inline]
    pub fn participants(&self) -> usize {
        self.threshold
    }

    /// Number of completed rounds.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Block until every participant of the current round has arrived.
    ///
    /// Returns `Ok(true)` for exactly one participant per round (the one whose
    /// arrival released the others).
    pub fn wait(&self) -> Result<bool, BarrierAbandoned> {
        let mut state = self.lock();
        if state.abandoned {
            return Err(BarrierAbandoned);
        }
        let arrived_in = state.generation;
        state.remaining -= 1;
        if state.remaining == 0 {
            state.generation += 1;
            state.remaining = self.threshold;
            self.released.notify_all();
            return Ok(true);
        }
        while state.generation == arrived_in && !state.abandoned {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if state.generation == arrived_in {
            Err(BarrierAbandoned)
        } else {
            Ok(false)
        }
    }

    /// Break the barrier: wake every waiter and make later waits fail fast.
    pub fn abandon(&self) {
        let mut state = self.lock();
        state.abandoned = true;
        self.released.notify_all();
    }

    pub fn is_abandoned(&self) -> bool {
        self.lock().abandoned
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        // State is a pair of counters; a poisoned guard still holds consistent values.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::{Barrier, BarrierAbandoned};

    #[test]
    fn single_participant_never_blocks() {
        let barrier = Barrier::new(1);
        for _ in 0..16 {
            assert_eq!(barrier.wait(), Ok(true));
        }
        assert_eq!(barrier.generation(), 16);
    }

    #[test]
    fn zero_participants_is_treated_as_one() {
        let barrier = Barrier::new(0);
        assert_eq!(barrier.participants(), 1);
        assert_eq!(barrier.wait(), Ok(true));
    }

    #[test]
    fn exactly_one_leader_per_round() {
        const THREADS: usize = 6;
        const ROUNDS: usize = 200;
        let barrier = Barrier::new(THREADS);
        let leaders = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    for _ in 0..ROUNDS {
                        if barrier.wait().expect("barrier intact") {
                            leaders.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(leaders.load(Ordering::Relaxed), ROUNDS);
        assert_eq!(barrier.generation(), ROUNDS as u64);
    }

    #[test]
    fn no_participant_runs_ahead_of_the_round() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 100;
        let barrier = Barrier::new(THREADS);
        let arrivals = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    for round in 0..ROUNDS {
                        arrivals.fetch_add(1, Ordering::SeqCst);
                        barrier.wait().expect("barrier intact");
                        let seen = arrivals.load(Ordering::SeqCst);
                        assert!(
                            seen >= (round + 1) * THREADS,
                            "round {round}: only {seen} arrivals visible after release"
                        );
                        barrier.wait().expect("barrier intact");
                    }
                });
            }
        });
    }

    #[test]
    fn abandon_releases_blocked_waiters() {
        let barrier = Barrier::new(3);

        thread::scope(|s| {
            let waiters: Vec<_> = (0..2).map(|_| s.spawn(|| barrier.wait())).collect();
            while barrier.lock().remaining != 1 {
                thread::yield_now();
            }
            barrier.abandon();
            for waiter in waiters {
                assert_eq!(waiter.join().expect("waiter joined"), Err(BarrierAbandoned));
            }
        });

        assert!(barrier.is_abandoned());
        assert_eq!(barrier.wait(), Err(BarrierAbandoned));
    }
}
