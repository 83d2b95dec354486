//! Event-loop-affine connection scheduling with least-loaded selection (§4.1).
//!
//! [`EventLoopScheduler`] binds one connection-candidate *entry* per remote
//! authority to an event loop, chosen by a per-authority binary min-heap
//! ordered by `(active_request_count, id)`. Map lookups are lock-free
//! (backed by [`dashmap`]); per-authority heap mutation serializes through a
//! short [`parking_lot::Mutex`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;

/// Every 256th acquire, at most once per minute, the authority map is swept
/// for idle states (§4.1 "Cleanup"). Both predicates are a required
/// conjunction, not independent triggers (§9, Open Question (a)).
const CLEANUP_EVERY_N_ACQUIRES: u64 = 256;
const CLEANUP_MIN_INTERVAL: Duration = Duration::from_secs(60);
const STATE_IDLE_THRESHOLD: Duration = Duration::from_secs(60);

/// One event-loop binding for a given authority, ordered in the heap by
/// `(active, id)`.
#[derive(Debug, Clone, Copy)]
struct Entry {
    event_loop_id: usize,
    id: u64,
    active: usize,
}

fn less(a: &Entry, b: &Entry) -> bool {
    (a.active, a.id) < (b.active, b.id)
}

struct AuthorityState {
    /// Binary min-heap array; `entries[i]` is always at heap position `i`.
    entries: Vec<Entry>,
    /// `id -> position in entries`, kept in lockstep with every heap swap.
    index_by_id: HashMap<u64, usize>,
    aggregate_active: usize,
    last_zero_at: Option<Instant>,
    next_event_loop: usize,
    next_id: u64,
}

impl AuthorityState {
    fn new(event_loop_count: usize) -> Self {
        let start = if event_loop_count == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..event_loop_count)
        };
        Self {
            entries: Vec::new(),
            index_by_id: HashMap::new(),
            aggregate_active: 0,
            last_zero_at: None,
            next_event_loop: start,
            next_id: 0,
        }
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.entries.swap(i, j);
        self.index_by_id.insert(self.entries[i].id, i);
        self.index_by_id.insert(self.entries[j].id, j);
    }

    fn sift_down(&mut self, mut i: usize) {
        let n = self.entries.len();
        loop {
            let l = 2 * i + 1;
            let r = 2 * i + 2;
            let mut smallest = i;
            if l < n && less(&self.entries[l], &self.entries[smallest]) {
                smallest = l;
            }
            if r < n && less(&self.entries[r], &self.entries[smallest]) {
                smallest = r;
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if less(&self.entries[i], &self.entries[parent]) {
                self.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn push(&mut self, event_loop_id: usize) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let pos = self.entries.len();
        self.entries.push(Entry {
            event_loop_id,
            id,
            active: 0,
        });
        self.index_by_id.insert(id, pos);
        self.sift_up(pos);
        id
    }
}

/// A handle returned by [`EventLoopScheduler::acquire`]. Must be released
/// exactly once; ownership is consumed by [`AcquiredEntry::release`] so a
/// double release cannot compile.
#[must_use = "an acquired entry must be released exactly once"]
pub struct AcquiredEntry {
    state: Arc<Mutex<AuthorityState>>,
    entry_id: u64,
    pub event_loop_id: usize,
}

impl AcquiredEntry {
    #[cfg(test)]
    fn entry_id(&self) -> u64 {
        self.entry_id
    }

    #[tracing::instrument(level = "trace", skip(self), fields(entry_id = self.entry_id, event_loop_id = self.event_loop_id))]
    pub fn release(self) {
        let mut state = self.state.lock();
        let Some(&pos) = state.index_by_id.get(&self.entry_id) else {
            return;
        };
        state.entries[pos].active -= 1;
        state.aggregate_active -= 1;
        if state.aggregate_active == 0 {
            state.last_zero_at = Some(Instant::now());
        }
        state.sift_up(pos);
    }
}

/// Binds connection-candidate entries to event loops, least-loaded first.
pub struct EventLoopScheduler {
    event_loop_count: usize,
    states: DashMap<String, Arc<Mutex<AuthorityState>>>,
    acquire_counter: AtomicU64,
    last_cleanup: Mutex<Option<Instant>>,
}

impl EventLoopScheduler {
    pub fn new(event_loop_count: usize) -> Self {
        assert!(event_loop_count > 0, "a scheduler needs at least one event loop");
        Self {
            event_loop_count,
            states: DashMap::new(),
            acquire_counter: AtomicU64::new(0),
            last_cleanup: Mutex::new(None),
        }
    }

    /// Acquires a connection-candidate entry for `authority` (§4.1 "Acquire protocol").
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn acquire(&self, authority: &str) -> AcquiredEntry {
        let state_arc = self
            .states
            .entry(authority.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(AuthorityState::new(self.event_loop_count))))
            .clone();

        let (entry_id, event_loop_id) = {
            let mut state = state_arc.lock();

            let should_grow = state
                .entries
                .first()
                .is_some_and(|root| root.active > 0)
                && state.entries.len() < self.event_loop_count;

            if should_grow || state.entries.is_empty() {
                let event_loop_id = state.next_event_loop % self.event_loop_count;
                state.next_event_loop = (state.next_event_loop + 1) % self.event_loop_count;
                state.push(event_loop_id);
            }

            state.entries[0].active += 1;
            state.aggregate_active += 1;
            let id = state.entries[0].id;
            let event_loop_id = state.entries[0].event_loop_id;
            state.sift_down(0);
            (id, event_loop_id)
        };

        let count = self.acquire_counter.fetch_add(1, Ordering::Relaxed) + 1;
        if count % CLEANUP_EVERY_N_ACQUIRES == 0 {
            self.maybe_cleanup();
        }

        AcquiredEntry {
            state: state_arc,
            entry_id,
            event_loop_id,
        }
    }

    /// Sweeps authorities that have been fully idle for at least
    /// [`STATE_IDLE_THRESHOLD`], gated additionally by
    /// [`CLEANUP_MIN_INTERVAL`] between sweeps (both conditions required).
    fn maybe_cleanup(&self) {
        let now = Instant::now();
        {
            let mut last = self.last_cleanup.lock();
            if let Some(last_run) = *last {
                if now.duration_since(last_run) < CLEANUP_MIN_INTERVAL {
                    return;
                }
            }
            *last = Some(now);
        }

        let before = self.states.len();
        self.states.retain(|_, state| {
            let state = state.lock();
            let idle = state.aggregate_active == 0
                && state
                    .last_zero_at
                    .is_some_and(|t| now.duration_since(t) >= STATE_IDLE_THRESHOLD);
            !idle
        });
        let swept = before - self.states.len();
        if swept > 0 {
            tracing::debug!(swept, remaining = self.states.len(), "swept idle authority states");
        }
    }

    /// Number of authorities currently tracked. Exposed for tests.
    pub fn tracked_authority_count(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_up_to_event_loop_count_then_reuses_least_loaded() {
        let scheduler = EventLoopScheduler::new(4);
        let a1 = scheduler.acquire("svc:443");
        let a2 = scheduler.acquire("svc:443");
        let a3 = scheduler.acquire("svc:443");
        let a4 = scheduler.acquire("svc:443");
        let a5 = scheduler.acquire("svc:443");

        // 5 acquires over 4 loops: one loop now hosts 2 active requests.
        let mut loops = vec![
            a1.event_loop_id,
            a2.event_loop_id,
            a3.event_loop_id,
            a4.event_loop_id,
            a5.event_loop_id,
        ];
        loops.sort_unstable();
        let distinct: std::collections::HashSet<_> = loops.iter().copied().collect();
        assert_eq!(distinct.len(), 4, "only 4 event loops should ever be bound");

        a1.release();
        a2.release();
        a3.release();
        a4.release();
        a5.release();
    }

    #[test]
    fn release_is_a_consuming_operation() {
        let scheduler = EventLoopScheduler::new(2);
        let entry = scheduler.acquire("svc:443");
        entry.release();
        // `entry` has been moved; a second `.release()` call would not compile.
    }

    #[test]
    fn next_acquire_prefers_lowest_active_then_lowest_id() {
        let scheduler = EventLoopScheduler::new(4);
        let acquisitions: Vec<_> = (0..5).map(|_| scheduler.acquire("svc:443")).collect();
        let mut by_id: Vec<_> = acquisitions.into_iter().collect();
        // Release the 4th acquisition (index 3) and the 2nd (index 1) as in the spec scenario;
        // both then have active == 0, so the lowest entry id between them must win the next acquire.
        let released_fourth = by_id.remove(3);
        let released_second = by_id.remove(1);
        let expected_winner = released_second.entry_id().min(released_fourth.entry_id());
        released_fourth.release();
        released_second.release();

        let next = scheduler.acquire("svc:443");
        assert_eq!(next.entry_id(), expected_winner, "lowest id among the active==0 entries must be reused first");
        next.release();
        for entry in by_id {
            entry.release();
        }
    }

    #[test]
    fn cleanup_requires_both_the_modulus_and_the_wall_clock_gate() {
        let scheduler = EventLoopScheduler::new(1);
        for _ in 0..300 {
            let entry = scheduler.acquire("svc:443");
            entry.release();
        }
        // `last_zero_at` was just set, so the wall-clock gate blocks the sweep
        // even though the acquire-count modulus has fired.
        assert_eq!(scheduler.tracked_authority_count(), 1);
    }

    proptest::proptest! {
        /// However many outstanding (unreleased) acquires are made for one
        /// authority, at most `event_loop_count` distinct event loops are
        /// ever bound to it (§4.1 "binds one entry per remote authority to
        /// the least-loaded of a fixed set of event loops").
        #[test]
        fn never_binds_more_event_loops_than_configured(
            event_loop_count in 1usize..8,
            acquire_count in 0usize..40,
        ) {
            let scheduler = EventLoopScheduler::new(event_loop_count);
            let acquisitions: Vec<_> = (0..acquire_count).map(|_| scheduler.acquire("svc:443")).collect();
            let distinct: std::collections::HashSet<_> = acquisitions.iter().map(|e| e.event_loop_id).collect();
            proptest::prop_assert!(distinct.len() <= event_loop_count);
            for entry in acquisitions {
                entry.release();
            }
        }
    }
}

/// Loom model of `acquire`'s cleanup-trigger counter (lib.rs:194-197's
/// `acquire_counter.fetch_add` plus modulus check), isolated from the
/// `dashmap`/`parking_lot`-backed heap since neither has a loom-instrumented
/// build. Same `#[cfg(loom)]` gating convention as the teacher's
/// `crates/jmux-proxy/src/sync.rs`.
#[cfg(loom)]
mod loom_tests {
    use loom::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use loom::sync::Arc;
    use loom::thread;

    const CLEANUP_EVERY_N_ACQUIRES: u64 = 2;

    #[test]
    fn concurrent_acquires_trigger_cleanup_exactly_once_per_multiple() {
        loom::model(|| {
            let counter = Arc::new(AtomicU64::new(0));
            let triggers = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let counter = Arc::clone(&counter);
                    let triggers = Arc::clone(&triggers);
                    thread::spawn(move || {
                        let count = counter.fetch_add(1, Ordering::Relaxed) + 1;
                        if count % CLEANUP_EVERY_N_ACQUIRES == 0 {
                            triggers.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            // 2 threads each incrementing once reach the counter value 2
            // exactly once between them, regardless of interleaving.
            assert_eq!(triggers.load(Ordering::SeqCst), 1);
        });
    }
}
