use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

/// An immutable (success, failure) pair (§3 "Event count").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCount {
    pub success: u64,
    pub failure: u64,
}

impl EventCount {
    pub fn total(&self) -> u64 {
        self.success + self.failure
    }

    /// `failure / (success + failure)`, or `0.0` when empty.
    pub fn failure_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.failure as f64 / total as f64
        }
    }
}

struct Bucket {
    timestamp_nanos: i64,
    success: AtomicU64,
    failure: AtomicU64,
}

impl Bucket {
    fn new(timestamp_nanos: i64) -> Self {
        Self {
            timestamp_nanos,
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
        }
    }

    fn counts(&self) -> EventCount {
        EventCount {
            success: self.success.load(Ordering::Relaxed),
            failure: self.failure.load(Ordering::Relaxed),
        }
    }

    fn record(&self, is_success: bool) {
        if is_success {
            self.success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// The sliding-window failure counter (§4.4 "Sliding-window counter").
///
/// One *current* bucket accrues the tail of the window; completed buckets
/// move into a FIFO *reservoir*, trimmed of anything older than `W`. The
/// externally observable [`SlidingWindowCounter::observe`] snapshot is
/// cheap and only changes at a bucket rotation; the breaker's own
/// transition logic instead calls [`SlidingWindowCounter::effective_count`],
/// which additionally folds in the still-live current bucket so that a
/// burst within a single update interval is still visible immediately.
pub struct SlidingWindowCounter {
    window: Duration,
    update_interval: Duration,
    start: Instant,
    current: ArcSwap<Bucket>,
    reservoir: Mutex<VecDeque<Arc<Bucket>>>,
    snapshot: ArcSwap<EventCount>,
}

impl SlidingWindowCounter {
    pub fn new(window: Duration, update_interval: Duration) -> Self {
        assert!(update_interval <= window, "update interval must not exceed the window");
        let start = Instant::now();
        Self {
            window,
            update_interval,
            start,
            current: ArcSwap::from_pointee(Bucket::new(0)),
            reservoir: Mutex::new(VecDeque::new()),
            snapshot: ArcSwap::from_pointee(EventCount::default()),
        }
    }

    fn nanos_since_start(&self, now: Instant) -> i64 {
        now.saturating_duration_since(self.start).as_nanos() as i64
    }

    /// Cheap, rotation-granularity observation of completed buckets.
    pub fn observe(&self) -> EventCount {
        **self.snapshot.load()
    }

    /// Records one event and returns the *effective* count including the
    /// still-accruing current bucket, used by the breaker to decide
    /// transitions without waiting for the next rotation.
    pub fn record(&self, is_success: bool, now: Instant) -> EventCount {
        let now_ns = self.nanos_since_start(now);
        let update_ns = self.update_interval.as_nanos() as i64;

        loop {
            let current = self.current.load_full();

            if now_ns < current.timestamp_nanos {
                // Clock regression (or a paused process): record as an instant
                // bucket appended straight to the reservoir.
                self.push_instant_bucket(is_success, now_ns);
                return self.effective_count(now_ns);
            }

            if now_ns < current.timestamp_nanos + update_ns {
                current.record(is_success);
                return self.effective_count(now_ns);
            }

            // Rotation: the event belongs to a fresh bucket.
            let new_bucket = Arc::new(Bucket::new(now_ns));
            new_bucket.record(is_success);
            let prev = self.current.compare_and_swap(&current, Arc::clone(&new_bucket));
            if Arc::ptr_eq(&prev, &current) {
                self.reservoir.lock().push_back(current);
                self.publish_snapshot(now_ns, Some(&new_bucket));
                return self.effective_count(now_ns);
            }
            // Lost the rotation race: a concurrent writer already rotated.
            // Insert our event as an instant bucket so it isn't lost.
            self.push_instant_bucket(is_success, now_ns);
            return self.effective_count(now_ns);
        }
    }

    fn push_instant_bucket(&self, is_success: bool, now_ns: i64) {
        let bucket = Arc::new(Bucket::new(now_ns));
        bucket.record(is_success);
        self.reservoir.lock().push_back(bucket);
        self.publish_snapshot(now_ns, None);
    }

    fn trimmed_reservoir_sum(&self, now_ns: i64) -> EventCount {
        let window_ns = self.window.as_nanos() as i64;
        let mut reservoir = self.reservoir.lock();
        while let Some(front) = reservoir.front() {
            if now_ns - front.timestamp_nanos > window_ns {
                reservoir.pop_front();
            } else {
                break;
            }
        }
        let mut sum = EventCount::default();
        for bucket in reservoir.iter() {
            let c = bucket.counts();
            sum.success += c.success;
            sum.failure += c.failure;
        }
        sum
    }

    fn publish_snapshot(&self, now_ns: i64, extra: Option<&Bucket>) {
        let mut sum = self.trimmed_reservoir_sum(now_ns);
        if let Some(extra) = extra {
            let c = extra.counts();
            sum.success += c.success;
            sum.failure += c.failure;
        }
        self.snapshot.store(Arc::new(sum));
    }

    fn effective_count(&self, now_ns: i64) -> EventCount {
        let mut sum = self.trimmed_reservoir_sum(now_ns);
        let current = self.current.load();
        let c = current.counts();
        sum.success += c.success;
        sum.failure += c.failure;
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_publishes_reservoir_plus_new_bucket() {
        let counter = SlidingWindowCounter::new(Duration::from_secs(10), Duration::from_secs(1));
        let t0 = Instant::now();
        counter.record(false, t0);
        counter.record(true, t0 + Duration::from_millis(500));
        let effective = counter.record(false, t0 + Duration::from_millis(1100));

        assert_eq!(effective, EventCount { success: 1, failure: 2 });
        assert_eq!(counter.observe(), EventCount { success: 1, failure: 2 });
    }

    #[test]
    fn burst_within_one_interval_is_visible_via_effective_count() {
        let counter = SlidingWindowCounter::new(Duration::from_secs(1), Duration::from_millis(100));
        let t0 = Instant::now();
        counter.record(true, t0);
        counter.record(true, t0);
        let effective = counter.record(false, t0);
        counter.record(false, t0);
        let effective2 = counter.record(false, t0);
        assert_eq!(effective.total(), 3);
        assert_eq!(effective2, EventCount { success: 2, failure: 3 });
    }

    proptest::proptest! {
        /// Recording `n` events at a single instant (no bucket rotation) must
        /// account for every one of them exactly once, regardless of the
        /// success/failure split (§4.4 "Sliding-window counter").
        #[test]
        fn every_recorded_event_at_one_instant_is_counted_exactly_once(outcomes in proptest::collection::vec(proptest::bool::ANY, 0..200)) {
            let counter = SlidingWindowCounter::new(Duration::from_secs(10), Duration::from_secs(1));
            let now = Instant::now();
            let mut last = EventCount::default();
            for &is_success in &outcomes {
                last = counter.record(is_success, now);
            }
            let expected_success = outcomes.iter().filter(|&&o| o).count() as u64;
            let expected_failure = outcomes.len() as u64 - expected_success;
            proptest::prop_assert_eq!(last.success, expected_success);
            proptest::prop_assert_eq!(last.failure, expected_failure);
            proptest::prop_assert!(last.failure_rate() >= 0.0 && last.failure_rate() <= 1.0);
        }
    }
}
